//! wearlink-device エラー型

use alloc::string::String;

use wearlink_file::FileTransferError;
use wearlink_proto::ProtoError;
use wearlink_smp::SmpError;
use wearlink_transport::ConnectionError;

/// デバイス操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    File(#[from] FileTransferError),
    #[error(transparent)]
    Firmware(#[from] SmpError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    /// トランスポートの操作に失敗した
    #[error("transport error: {0}")]
    Transport(String),
}
