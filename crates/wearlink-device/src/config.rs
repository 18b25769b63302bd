//! デバイス全体の設定

use wearlink_file::FileTransferConfig;
use wearlink_smp::SmpConfig;
use wearlink_transport::ConnectionConfig;

/// 各レイヤーの設定をまとめたもの（JSON では欠けた項目は既定値）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct DeviceConfig {
    pub connection: ConnectionConfig,
    pub file: FileTransferConfig,
    pub firmware: SmpConfig,
}
