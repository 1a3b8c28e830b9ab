mod broadcaster;
mod collector;

pub use broadcaster::SnapshotBroadcaster;
pub use collector::{CollectorConfig, SampleCollector};
