//! CSV parsing for `--format=csv,noheader,nounits` query output.

use gpupulse_core::{Device, DeviceMetrics, GpuProcess};

use crate::client::{Result, SmiError};

/// Values nvidia-smi substitutes when a board does not report a field.
fn is_not_available(field: &str) -> bool {
    matches!(field, "" | "N/A" | "[N/A]" | "[Not Supported]" | "[Unknown Error]")
}

fn fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

fn req_u32(field: &str, what: &str) -> Result<u32> {
    field
        .parse()
        .map_err(|_| SmiError::Parse(format!("bad {what}: {field:?}")))
}

fn req_u64(field: &str, what: &str) -> Result<u64> {
    field
        .parse()
        .map_err(|_| SmiError::Parse(format!("bad {what}: {field:?}")))
}

fn req_f64(field: &str, what: &str) -> Result<f64> {
    field
        .parse()
        .map_err(|_| SmiError::Parse(format!("bad {what}: {field:?}")))
}

fn opt_f64(field: &str, what: &str) -> Result<Option<f64>> {
    if is_not_available(field) {
        return Ok(None);
    }
    req_f64(field, what).map(Some)
}

fn opt_u64(field: &str, what: &str) -> Result<Option<u64>> {
    if is_not_available(field) {
        return Ok(None);
    }
    req_u64(field, what).map(Some)
}

/// One line of `--query-gpu=index,name,uuid,memory.total`.
pub fn parse_device(line: &str) -> Result<Device> {
    let f = fields(line);
    if f.len() != 4 {
        return Err(SmiError::Parse(format!(
            "expected 4 device fields, got {}: {line:?}",
            f.len()
        )));
    }

    Ok(Device {
        index: req_u32(f[0], "device index")?,
        name: f[1].to_string(),
        uuid: f[2].to_string(),
        memory_total_mib: req_u64(f[3], "memory.total")?,
    })
}

/// One line of `--query-gpu=utilization.gpu,utilization.memory,
/// memory.used,memory.free,memory.total,temperature.gpu,power.draw,fan.speed`.
///
/// Power and fan are optional in the model; everything else missing
/// makes the read fail, which the collector turns into an unreachable
/// marker for that device.
pub fn parse_metrics(line: &str) -> Result<DeviceMetrics> {
    let f = fields(line);
    if f.len() != 8 {
        return Err(SmiError::Parse(format!(
            "expected 8 metric fields, got {}: {line:?}",
            f.len()
        )));
    }

    Ok(DeviceMetrics {
        utilization_gpu_percent: req_f64(f[0], "utilization.gpu")?,
        utilization_memory_percent: req_f64(f[1], "utilization.memory")?,
        memory_used_mib: req_u64(f[2], "memory.used")?,
        memory_free_mib: req_u64(f[3], "memory.free")?,
        memory_total_mib: req_u64(f[4], "memory.total")?,
        temperature_c: req_f64(f[5], "temperature.gpu")?,
        power_draw_watts: opt_f64(f[6], "power.draw")?,
        fan_speed_percent: opt_f64(f[7], "fan.speed")?,
        processes: Vec::new(),
    })
}

/// One line of `--query-compute-apps=pid,process_name,used_memory`.
pub fn parse_process(line: &str) -> Result<GpuProcess> {
    let f = fields(line);
    if f.len() != 3 {
        return Err(SmiError::Parse(format!(
            "expected 3 process fields, got {}: {line:?}",
            f.len()
        )));
    }

    Ok(GpuProcess {
        pid: req_u32(f[0], "pid")?,
        name: f[1].to_string(),
        memory_mib: opt_u64(f[2], "used_memory")?,
    })
}
