use async_trait::async_trait;
use tracing::{debug, info, warn};

use gpupulse_core::{Device, DeviceMetrics, DeviceReader, GpuProcess, Result, TelemetryError};

use crate::client::SmiClient;
use crate::parse;

const FORMAT: &str = "--format=csv,noheader,nounits";

const METRIC_FIELDS: &str = "--query-gpu=utilization.gpu,utilization.memory,\
memory.used,memory.free,memory.total,temperature.gpu,power.draw,fan.speed";

/// `DeviceReader` backed by the `nvidia-smi` binary.
pub struct SmiReader {
    client: SmiClient,
}

impl SmiReader {
    pub fn new(client: SmiClient) -> Self {
        Self { client }
    }

    /// Driver version, queried once at startup. Absence is not fatal.
    pub async fn driver_version(&self) -> Option<String> {
        let out = match self
            .client
            .query(&["--query-gpu=driver_version", "--format=csv,noheader"])
            .await
        {
            Ok(out) => out,
            Err(e) => {
                warn!("driver version query failed: {}", e);
                return None;
            }
        };

        // One line per device; they all run the same driver.
        out.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    }

    async fn read_processes(&self, index: u32) -> Vec<GpuProcess> {
        let idx = index.to_string();
        let out = match self
            .client
            .query(&[
                "-i",
                &idx,
                "--query-compute-apps=pid,process_name,used_memory",
                FORMAT,
            ])
            .await
        {
            Ok(out) => out,
            Err(e) => {
                debug!("process query failed for device {}: {}", index, e);
                return Vec::new();
            }
        };

        out.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|line| match parse::parse_process(line) {
                Ok(proc) => Some(proc),
                Err(e) => {
                    debug!("skipping process line for device {}: {}", index, e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl DeviceReader for SmiReader {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let out = self
            .client
            .query(&["--query-gpu=index,name,uuid,memory.total", FORMAT])
            .await
            .map_err(|e| TelemetryError::InitFailure(e.to_string()))?;

        let mut devices = out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(parse::parse_device)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TelemetryError::InitFailure(e.to_string()))?;

        devices.sort_by_key(|d| d.index);

        for device in &devices {
            info!(
                "device {}: {} ({} MiB)",
                device.index, device.name, device.memory_total_mib
            );
        }

        Ok(devices)
    }

    async fn read_sample(&self, device: &Device) -> Result<DeviceMetrics> {
        let idx = device.index.to_string();
        let out = self
            .client
            .query(&["-i", &idx, METRIC_FIELDS, FORMAT])
            .await
            .map_err(|e| TelemetryError::unreachable(device.index, e.to_string()))?;

        let line = out
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| TelemetryError::unreachable(device.index, "empty query output"))?;

        let mut metrics =
            parse::parse_metrics(line).map_err(|e| TelemetryError::Parse(e.to_string()))?;

        metrics.processes = self.read_processes(device.index).await;

        Ok(metrics)
    }
}
