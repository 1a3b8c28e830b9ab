pub mod error;
pub mod reader;
pub mod types;

pub use error::{Result, TelemetryError};
pub use reader::DeviceReader;
pub use types::{Device, DeviceMetrics, GpuProcess, Reading, Sample, Snapshot};
