//! logkeep Runtime - Access to the system running the captured workloads

pub mod docker;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod traits;

pub use docker::DockerRuntime;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockRuntime;
pub use traits::{EventStream, LogChunk, LogStream, LogStreamOptions, WorkloadRuntime};
