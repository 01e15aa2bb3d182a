//! Launcher icon rendering.
//!
//! Resizes a source image to each Android density with a "contain" fit on a
//! transparent square canvas, written as maximally-compressed PNG.

use std::io::BufWriter;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

use crate::error::{CoreError, CoreResult};

/// One Android launcher density.
#[derive(Debug, Clone, Copy)]
pub struct IconDensity {
    /// Resource qualifier, e.g. `xxhdpi`.
    pub qualifier: &'static str,
    /// Square icon edge in pixels.
    pub size_px: u32,
}

/// Densities for the shell-style pipeline (`res/icon/android`).
pub const SHELL_DENSITIES: &[IconDensity] = &[
    IconDensity { qualifier: "ldpi", size_px: 36 },
    IconDensity { qualifier: "mdpi", size_px: 48 },
    IconDensity { qualifier: "hdpi", size_px: 72 },
    IconDensity { qualifier: "xhdpi", size_px: 96 },
    IconDensity { qualifier: "xxhdpi", size_px: 144 },
    IconDensity { qualifier: "xxxhdpi", size_px: 192 },
];

/// Densities for the wrapper-style pipeline (`mipmap-*` directories).
pub const WRAPPER_DENSITIES: &[IconDensity] = &[
    IconDensity { qualifier: "mdpi", size_px: 48 },
    IconDensity { qualifier: "hdpi", size_px: 72 },
    IconDensity { qualifier: "xhdpi", size_px: 96 },
    IconDensity { qualifier: "xxhdpi", size_px: 144 },
    IconDensity { qualifier: "xxxhdpi", size_px: 192 },
];

/// Render `src` as a `size`×`size` launcher icon at `dst`.
///
/// The source keeps its aspect ratio and is centered on a transparent
/// canvas, so non-square uploads are padded rather than cropped.
pub fn render_launcher_icon(src: &Path, dst: &Path, size: u32) -> CoreResult<()> {
    let source = image::open(src)
        .map_err(|e| CoreError::Validation(format!("Unsupported icon image: {e}")))?;

    let resized = source.resize(size, size, FilterType::Lanczos3).to_rgba8();
    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    let x = (size - resized.width()) / 2;
    let y = (size - resized.height()) / 2;
    image::imageops::overlay(&mut canvas, &resized, i64::from(x), i64::from(y));

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(dst)?;
    let encoder = PngEncoder::new_with_quality(
        BufWriter::new(file),
        CompressionType::Best,
        PngFilterType::Adaptive,
    );
    canvas
        .write_with_encoder(encoder)
        .map_err(|e| CoreError::Internal(format!("Failed to encode icon: {e}")))?;
    Ok(())
}

/// Edge of the generated default icon.
const DEFAULT_ICON_SIZE: u32 = 512;

/// Write the bundled-style default launcher icon: a flat indigo square
/// with a centered lighter disc. Used when the client uploads no icon.
pub fn generate_default_icon(dst: &Path) -> CoreResult<()> {
    let size = DEFAULT_ICON_SIZE;
    let background = Rgba([63, 81, 181, 255]);
    let disc = Rgba([197, 202, 233, 255]);

    let center = (size / 2) as i64;
    let radius = (size as i64) * 3 / 8;
    let img = RgbaImage::from_fn(size, size, |x, y| {
        let dx = x as i64 - center;
        let dy = y as i64 - center;
        if dx * dx + dy * dy <= radius * radius {
            disc
        } else {
            background
        }
    });

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(dst)?;
    let encoder = PngEncoder::new_with_quality(
        BufWriter::new(file),
        CompressionType::Best,
        PngFilterType::Adaptive,
    );
    img.write_with_encoder(encoder)
        .map_err(|e| CoreError::Internal(format!("Failed to encode default icon: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_icon(dir: &Path, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join("icon.png");
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn renders_square_output_at_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let src = sample_icon(dir.path(), 64, 64);
        let dst = dir.path().join("out/ic_launcher.png");

        render_launcher_icon(&src, &dst, 48).unwrap();

        let out = image::open(&dst).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (48, 48));
    }

    #[test]
    fn non_square_sources_are_padded_not_cropped() {
        let dir = tempfile::tempdir().unwrap();
        let src = sample_icon(dir.path(), 100, 50);
        let dst = dir.path().join("wide.png");

        render_launcher_icon(&src, &dst, 96).unwrap();

        let out = image::open(&dst).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (96, 96));
        // Vertical padding stays transparent; the center carries the source.
        assert_eq!(out.get_pixel(48, 1)[3], 0);
        assert_eq!(out.get_pixel(48, 48)[3], 255);
    }

    #[test]
    fn rejects_non_image_input() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("not-an-image.png");
        std::fs::write(&src, b"plain text").unwrap();

        let err = render_launcher_icon(&src, &dir.path().join("out.png"), 48).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn default_icon_is_a_square_png() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("default.png");
        generate_default_icon(&dst).unwrap();
        let img = image::open(&dst).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (512, 512));
        // It can feed the density renderer like any upload.
        render_launcher_icon(&dst, &dir.path().join("ldpi.png"), 36).unwrap();
    }

    #[test]
    fn density_tables_match_android_buckets() {
        assert_eq!(SHELL_DENSITIES.first().unwrap().size_px, 36);
        assert_eq!(SHELL_DENSITIES.last().unwrap().size_px, 192);
        assert_eq!(WRAPPER_DENSITIES.first().unwrap().size_px, 48);
        assert_eq!(WRAPPER_DENSITIES.len(), 5);
    }
}
