use serde::{Deserialize, Serialize};

/// One monitored accelerator, discovered once at startup.
/// The set of devices is fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub index: u32,
    pub name: String,
    pub uuid: String,
    pub memory_total_mib: u64,
}

/// A process currently running on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuProcess {
    pub pid: u32,
    pub name: String,
    /// Per-process memory; the driver does not report it in all modes.
    pub memory_mib: Option<u64>,
}

/// Normalized metrics for one device at one point in time.
/// This field set is the wire contract consumed by dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    pub utilization_gpu_percent: f64,
    pub utilization_memory_percent: f64,
    pub memory_used_mib: u64,
    pub memory_free_mib: u64,
    pub memory_total_mib: u64,
    pub temperature_c: f64,
    #[serde(default)]
    pub power_draw_watts: Option<f64>,
    #[serde(default)]
    pub fan_speed_percent: Option<f64>,
    #[serde(default)]
    pub processes: Vec<GpuProcess>,
}

/// Outcome of one read attempt against one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reading {
    Ok { metrics: DeviceMetrics },
    Unreachable { reason: String },
}

/// One device's entry in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub index: u32,
    #[serde(flatten)]
    pub reading: Reading,
}

impl Sample {
    pub fn ok(index: u32, metrics: DeviceMetrics) -> Self {
        Self {
            index,
            reading: Reading::Ok { metrics },
        }
    }

    pub fn unreachable(index: u32, reason: impl Into<String>) -> Self {
        Self {
            index,
            reading: Reading::Unreachable {
                reason: reason.into(),
            },
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self.reading, Reading::Unreachable { .. })
    }

    pub fn metrics(&self) -> Option<&DeviceMetrics> {
        match &self.reading {
            Reading::Ok { metrics } => Some(metrics),
            Reading::Unreachable { .. } => None,
        }
    }
}

/// All devices' samples captured together.
///
/// Immutable once published. Samples are in device-index order and
/// cover every device discovered at startup, reachable or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Capture timestamp (unix millis), taken before the batch of reads.
    pub captured_at_ms: u64,
    pub samples: Vec<Sample>,
}

impl Snapshot {
    pub fn device_count(&self) -> usize {
        self.samples.len()
    }

    pub fn unreachable_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_unreachable()).count()
    }
}
