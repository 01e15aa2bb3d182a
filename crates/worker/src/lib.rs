//! Build worker for the demo2apk service.
//!
//! Each process runs a fixed number of build slots pulling from the shared
//! queue, plus a periodic sweeper enforcing artifact retention. Pipelines
//! orchestrate the external toolchains (package managers, shell and wrapper
//! CLIs, the Android SDK, Gradle) and stream progress into the job record.

pub mod mock;
pub mod pipeline;
pub mod pool;
pub mod sweeper;
