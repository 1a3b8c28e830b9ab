use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use gpupulse_core::{
    Device, DeviceReader, Reading, Result, Sample, Snapshot, TelemetryError,
};

use crate::SnapshotBroadcaster;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub poll_interval: Duration,
    /// Bound on a single device read; an overdue read is treated as
    /// unreachable rather than force-killed.
    pub read_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            read_timeout: Duration::from_millis(5000),
        }
    }
}

/// Fixed-interval poll loop over the device set discovered at startup.
///
/// Every published snapshot carries exactly one sample per device, in
/// device-index order; a failing device is marked unreachable without
/// disturbing the others.
pub struct SampleCollector {
    reader: Arc<dyn DeviceReader>,
    devices: Vec<Device>,
    broadcaster: Arc<SnapshotBroadcaster>,
    config: CollectorConfig,
    last_captured_ms: u64,
    down: HashSet<u32>,
}

impl SampleCollector {
    /// Enumerate devices once. A query failure or an empty set means
    /// the service cannot provide value; both are fatal at startup.
    pub async fn discover(
        reader: Arc<dyn DeviceReader>,
        broadcaster: Arc<SnapshotBroadcaster>,
        config: CollectorConfig,
    ) -> Result<Self> {
        let devices = reader.list_devices().await?;
        if devices.is_empty() {
            return Err(TelemetryError::InitFailure(
                "no devices enumerated".into(),
            ));
        }

        info!(
            "monitoring {} device(s) every {}ms",
            devices.len(),
            config.poll_interval.as_millis()
        );

        Ok(Self {
            reader,
            devices,
            broadcaster,
            config,
            last_captured_ms: 0,
            down: HashSet::new(),
        })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Drive the poll loop until `shutdown` flips to true. The cycle in
    /// progress completes before the loop exits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval);
        // A cycle that overruns the period skips the next tick instead
        // of stacking concurrent polls.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.poll_once().await;
                    self.broadcaster.publish(snapshot);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("collector stopped");
    }

    /// One tick: read every device concurrently, isolate failures,
    /// assemble a snapshot stamped before the batch of reads began.
    async fn poll_once(&mut self) -> Snapshot {
        let captured_at_ms = self.next_timestamp();

        let reads = self.devices.iter().map(|device| self.read_device(device));
        let samples = join_all(reads).await;

        self.log_transitions(&samples);

        let unreachable = samples.iter().filter(|s| s.is_unreachable()).count();
        debug!(
            "tick: {}/{} device(s) reachable",
            samples.len() - unreachable,
            samples.len()
        );

        Snapshot {
            captured_at_ms,
            samples,
        }
    }

    async fn read_device(&self, device: &Device) -> Sample {
        match timeout(self.config.read_timeout, self.reader.read_sample(device)).await {
            Ok(Ok(metrics)) => Sample::ok(device.index, metrics),
            Ok(Err(TelemetryError::DeviceUnavailable { reason, .. })) => {
                Sample::unreachable(device.index, reason)
            }
            Ok(Err(e)) => Sample::unreachable(device.index, e.to_string()),
            Err(_) => Sample::unreachable(
                device.index,
                format!(
                    "read timed out after {}ms",
                    self.config.read_timeout.as_millis()
                ),
            ),
        }
    }

    /// Log reachability transitions once per edge, not once per tick.
    fn log_transitions(&mut self, samples: &[Sample]) {
        for sample in samples {
            match &sample.reading {
                Reading::Unreachable { reason } => {
                    if self.down.insert(sample.index) {
                        warn!("device {} unreachable: {}", sample.index, reason);
                    }
                }
                Reading::Ok { .. } => {
                    if self.down.remove(&sample.index) {
                        info!("device {} recovered", sample.index);
                    }
                }
            }
        }
    }

    /// Wall-clock millis, clamped so published capture times never go
    /// backward if the system clock steps.
    fn next_timestamp(&mut self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let ts = now_ms.max(self.last_captured_ms);
        self.last_captured_ms = ts;
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use gpupulse_core::DeviceMetrics;

    fn test_device(index: u32) -> Device {
        Device {
            index,
            name: format!("Test GPU {index}"),
            uuid: format!("GPU-00000000-0000-0000-0000-{index:012}"),
            memory_total_mib: 24576,
        }
    }

    fn test_metrics() -> DeviceMetrics {
        DeviceMetrics {
            utilization_gpu_percent: 45.0,
            utilization_memory_percent: 20.0,
            memory_used_mib: 2048,
            memory_free_mib: 22528,
            memory_total_mib: 24576,
            temperature_c: 61.0,
            power_draw_watts: Some(215.3),
            fan_speed_percent: None,
            processes: Vec::new(),
        }
    }

    /// In-memory reader with a per-device failure script. Ticks are
    /// counted per device, starting at 1.
    struct ScriptedReader {
        devices: Vec<Device>,
        fail_plan: HashMap<u32, HashSet<u64>>,
        calls: Mutex<HashMap<u32, u64>>,
    }

    impl ScriptedReader {
        fn new(count: u32) -> Self {
            Self {
                devices: (0..count).map(test_device).collect(),
                fail_plan: HashMap::new(),
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn failing_on(mut self, index: u32, ticks: &[u64]) -> Self {
            self.fail_plan
                .insert(index, ticks.iter().copied().collect());
            self
        }
    }

    #[async_trait]
    impl DeviceReader for ScriptedReader {
        async fn list_devices(&self) -> Result<Vec<Device>> {
            Ok(self.devices.clone())
        }

        async fn read_sample(&self, device: &Device) -> Result<DeviceMetrics> {
            let tick = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(device.index).or_insert(0);
                *count += 1;
                *count
            };

            if self
                .fail_plan
                .get(&device.index)
                .is_some_and(|ticks| ticks.contains(&tick))
            {
                return Err(TelemetryError::unreachable(device.index, "injected fault"));
            }

            Ok(test_metrics())
        }
    }

    /// Reader whose reads never complete; exercises the read timeout.
    struct HangingReader {
        devices: Vec<Device>,
    }

    #[async_trait]
    impl DeviceReader for HangingReader {
        async fn list_devices(&self) -> Result<Vec<Device>> {
            Ok(self.devices.clone())
        }

        async fn read_sample(&self, _device: &Device) -> Result<DeviceMetrics> {
            std::future::pending().await
        }
    }

    async fn collector_with(reader: Arc<dyn DeviceReader>) -> SampleCollector {
        SampleCollector::discover(
            reader,
            Arc::new(SnapshotBroadcaster::new(8)),
            CollectorConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_covers_all_devices_in_index_order() {
        let mut collector = collector_with(Arc::new(ScriptedReader::new(3))).await;

        let snapshot = collector.poll_once().await;
        assert_eq!(snapshot.samples.len(), 3);
        let indices: Vec<u32> = snapshot.samples.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(snapshot.unreachable_count(), 0);
    }

    #[tokio::test]
    async fn test_device_failure_is_isolated() {
        let reader = ScriptedReader::new(3).failing_on(1, &[1]);
        let mut collector = collector_with(Arc::new(reader)).await;

        let snapshot = collector.poll_once().await;
        assert_eq!(snapshot.samples.len(), 3);
        assert!(!snapshot.samples[0].is_unreachable());
        assert!(snapshot.samples[1].is_unreachable());
        assert!(!snapshot.samples[2].is_unreachable());
    }

    #[tokio::test]
    async fn test_unreachable_device_recovers_next_tick() {
        // Two devices; device 0 fails on tick 3 only.
        let reader = ScriptedReader::new(2).failing_on(0, &[3]);
        let mut collector = collector_with(Arc::new(reader)).await;

        for _ in 0..2 {
            let snapshot = collector.poll_once().await;
            assert_eq!(snapshot.unreachable_count(), 0);
        }

        let tick3 = collector.poll_once().await;
        assert!(tick3.samples[0].is_unreachable());
        let healthy = tick3.samples[1].metrics().unwrap();
        assert_eq!(healthy.utilization_gpu_percent, 45.0);

        let tick4 = collector.poll_once().await;
        assert_eq!(tick4.unreachable_count(), 0);
    }

    #[tokio::test]
    async fn test_timestamps_are_non_decreasing() {
        let mut collector = collector_with(Arc::new(ScriptedReader::new(1))).await;

        let mut previous = 0;
        for _ in 0..5 {
            let snapshot = collector.poll_once().await;
            assert!(snapshot.captured_at_ms >= previous);
            previous = snapshot.captured_at_ms;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_read_becomes_unreachable() {
        let reader = HangingReader {
            devices: vec![test_device(0)],
        };
        let mut collector = SampleCollector::discover(
            Arc::new(reader),
            Arc::new(SnapshotBroadcaster::new(8)),
            CollectorConfig {
                poll_interval: Duration::from_millis(1000),
                read_timeout: Duration::from_millis(100),
            },
        )
        .await
        .unwrap();

        let snapshot = collector.poll_once().await;
        assert_eq!(snapshot.samples.len(), 1);
        match &snapshot.samples[0].reading {
            Reading::Unreachable { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_device_set_is_fatal() {
        let result = SampleCollector::discover(
            Arc::new(ScriptedReader::new(0)),
            Arc::new(SnapshotBroadcaster::new(8)),
            CollectorConfig::default(),
        )
        .await;

        match result {
            Err(TelemetryError::InitFailure(_)) => {}
            other => panic!("expected InitFailure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_until_shutdown() {
        let broadcaster = Arc::new(SnapshotBroadcaster::new(8));
        let collector = SampleCollector::discover(
            Arc::new(ScriptedReader::new(2)),
            Arc::clone(&broadcaster),
            CollectorConfig::default(),
        )
        .await
        .unwrap();

        let mut updates = broadcaster.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(collector.run(shutdown_rx));

        let first = updates.recv().await.unwrap();
        let second = updates.recv().await.unwrap();
        assert_eq!(first.samples.len(), 2);
        assert!(second.captured_at_ms >= first.captured_at_ms);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
