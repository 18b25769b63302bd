//! wearlink-file エラー型

use wearlink_proto::ProtoError;

use crate::state::FileTransferStatus;

/// ファイル転送のエラー（すべて送信前の検証エラー）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileTransferError {
    /// 転送中に新しい転送を始めようとした
    #[error("file transfer already in progress ({status:?})")]
    Busy { status: FileTransferStatus },
    /// 転送中でないのにキャンセルしようとした
    #[error("no file transfer in progress")]
    NotInProgress,
    #[error("file is empty")]
    EmptyFile,
    /// ピアが受け付ける最大長を超えている
    #[error("file of {len} bytes exceeds peer maximum {max}")]
    FileTooLarge { len: usize, max: u32 },
    /// 受信ペイロードが不正
    #[error(transparent)]
    Proto(#[from] ProtoError),
}
