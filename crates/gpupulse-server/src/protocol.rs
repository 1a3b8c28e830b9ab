use serde::{Deserialize, Serialize};

use gpupulse_core::{Device, Snapshot};

/// Device inventory served to dashboards; the same shape backs the
/// WebSocket hello event and `GET /api/devices`.
#[derive(Debug, Serialize)]
pub struct Inventory<'a> {
    pub devices: &'a [Device],
    pub driver_version: Option<&'a str>,
    pub poll_interval_ms: u64,
}

/// Optional payload a dashboard may send after connecting. Nothing is
/// required of the client; snapshots flow regardless.
#[derive(Debug, Deserialize)]
pub struct WsPayload {
    pub uuid: Option<String>,
    #[serde(default)]
    pub init: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WsEvent<'a> {
    Hello {
        #[serde(flatten)]
        inventory: Inventory<'a>,
    },
    Snapshot {
        snapshot: &'a Snapshot,
    },
}

impl<'a> WsEvent<'a> {
    pub fn hello(inventory: Inventory<'a>) -> Self {
        Self::Hello { inventory }
    }

    pub fn snapshot(snapshot: &'a Snapshot) -> Self {
        Self::Snapshot { snapshot }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpupulse_core::Sample;

    fn device() -> Device {
        Device {
            index: 0,
            name: "NVIDIA GeForce RTX 3090".into(),
            uuid: "GPU-8f6e0c3a-1c2d-4b5e-9f00-aa11bb22cc33".into(),
            memory_total_mib: 24576,
        }
    }

    #[test]
    fn test_hello_event_shape() {
        let devices = vec![device()];
        let event = WsEvent::hello(Inventory {
            devices: &devices,
            driver_version: Some("550.54.14"),
            poll_interval_ms: 1000,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "hello");
        assert_eq!(json["driver_version"], "550.54.14");
        assert_eq!(json["poll_interval_ms"], 1000);
        assert_eq!(json["devices"][0]["index"], 0);
        assert_eq!(json["devices"][0]["name"], "NVIDIA GeForce RTX 3090");
    }

    #[test]
    fn test_snapshot_event_shape() {
        let snapshot = Snapshot {
            captured_at_ms: 1_700_000_000_000,
            samples: vec![Sample::unreachable(0, "driver error")],
        };
        let event = WsEvent::snapshot(&snapshot);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "snapshot");
        assert_eq!(json["snapshot"]["captured_at_ms"], 1_700_000_000_000u64);
        assert_eq!(json["snapshot"]["samples"][0]["status"], "unreachable");
    }

    #[test]
    fn test_ws_payload_parses() {
        let payload: WsPayload =
            serde_json::from_str(r#"{"uuid":"dash-1","init":true}"#).unwrap();
        assert_eq!(payload.uuid.as_deref(), Some("dash-1"));
        assert!(payload.init);

        let payload: WsPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.uuid.is_none());
        assert!(!payload.init);
    }
}
