//! デバイスイベント

use alloc::string::String;
use alloc::vec::Vec;

use wearlink_file::FileTransferEvent;
use wearlink_proto::{MessageType, SensorType};
use wearlink_smp::FirmwareEvent;
use wearlink_transport::ConnectionStatus;

/// センサー 1 種類分の生データ
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SensorReading {
    pub sensor_type: SensorType,
    pub data: Vec<u8>,
}

/// ホストに通知するイベント
///
/// JSON では `{"source": "...", "event": {...}}` の形になる。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "source", content = "event", rename_all = "camelCase")
)]
pub enum DeviceEvent {
    /// 接続状態が変わった
    Connection { status: ConnectionStatus },
    /// エンジンが扱わないメッセージ（デバイス情報、センサー設定、振動など）
    Message {
        message_type: MessageType,
        payload: Vec<u8>,
    },
    SensorData {
        /// ピアの 16 ビットタイムスタンプ（ミリ秒の下位 16 ビット）
        timestamp: u16,
        readings: Vec<SensorReading>,
    },
    File(FileTransferEvent),
    Firmware(FirmwareEvent),
    /// パケットに収まらず送られなかったフレーム
    FrameRejected {
        message_type: MessageType,
        frame_len: usize,
        budget: usize,
    },
    /// 受信メッセージを処理できなかった
    ProtocolError {
        /// 種別が分からないエラー（フレームのエンコード失敗など）では `None`
        message_type: Option<MessageType>,
        message: String,
    },
}
