//! JS に渡す JSON の組み立て
//!
//! wasm-bindgen に依存しないので native テストから直接呼べる。

use serde::Serialize;

use wearlink_device::{Device, DeviceConfig, DeviceEvent, Transport};
use wearlink_file::FileTransferStatus;
use wearlink_smp::FirmwareStatus;
use wearlink_transport::{ConnectionStats, ConnectionStatus};

/// `getStats()` の中身
#[derive(Debug, Serialize)]
pub struct ClientStats<'a> {
    pub status: ConnectionStatus,
    pub mtu: Option<usize>,
    #[serde(flatten)]
    pub connection: &'a ConnectionStats,
    pub file_status: FileTransferStatus,
    pub file_bytes_transferred: usize,
    pub firmware_status: FirmwareStatus,
}

impl<'a> ClientStats<'a> {
    pub fn from_device<T: Transport>(device: &'a Device<T>) -> Self {
        ClientStats {
            status: device.status(),
            mtu: device.mtu(),
            connection: device.stats(),
            file_status: device.file_state().status,
            file_bytes_transferred: device.file_state().bytes_transferred,
            firmware_status: device.firmware_status(),
        }
    }
}

/// JSON の設定を読む（`None` または空文字列なら既定値）
pub fn parse_config(json: Option<&str>) -> Result<DeviceConfig, serde_json::Error> {
    match json.map(str::trim) {
        None | Some("") => Ok(DeviceConfig::default()),
        Some(json) => serde_json::from_str(json),
    }
}

/// イベント列を JSON 配列にする
pub fn events_json(events: &[DeviceEvent]) -> Result<String, serde_json::Error> {
    serde_json::to_string(events)
}

/// デバイスの統計を JSON オブジェクトにする
///
/// ```json
/// {
///   "status": "Connected",
///   "mtu": 247,
///   "packets_sent": 42,
///   "frames_sent": 57,
///   "bytes_sent": 9120,
///   "bytes_received": 2048,
///   "rejected_frames": 0,
///   "file_status": "Idle",
///   "file_bytes_transferred": 0,
///   "firmware_status": "Uploading"
/// }
/// ```
pub fn stats_json<T: Transport>(device: &Device<T>) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ClientStats::from_device(device))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_defaults() {
        assert_eq!(parse_config(None).unwrap(), DeviceConfig::default());
        assert_eq!(parse_config(Some("  ")).unwrap(), DeviceConfig::default());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = parse_config(Some(
            r#"{"connection": {"default_mtu": null}, "firmware": {"max_chunk_size": 128}}"#,
        ))
        .unwrap();
        assert_eq!(config.connection.default_mtu, None);
        assert_eq!(config.connection.header_overhead, 3);
        assert_eq!(config.firmware.max_chunk_size, 128);
        assert!(config.firmware.read_state_after_upload);
        assert!(!config.file.relay);
    }

    #[test]
    fn test_parse_invalid_config() {
        assert!(parse_config(Some(r#"{"file": {"relay": "yes"}}"#)).is_err());
    }

    #[test]
    fn test_events_json_shape() {
        let json = events_json(&[DeviceEvent::Connection {
            status: ConnectionStatus::Connected,
        }])
        .unwrap();
        assert_eq!(
            json,
            r#"[{"source":"connection","event":{"status":"Connected"}}]"#
        );
    }
}
