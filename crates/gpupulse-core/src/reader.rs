use async_trait::async_trait;

use crate::{Device, DeviceMetrics, Result};

/// Seam between the sampling loop and the native hardware interface.
///
/// `list_devices` runs once at startup; the returned set is fixed for
/// the process lifetime. `read_sample` failures are per-device and
/// per-tick: the caller substitutes an unreachable marker and keeps
/// polling the rest.
#[async_trait]
pub trait DeviceReader: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>>;

    async fn read_sample(&self, device: &Device) -> Result<DeviceMetrics>;
}
