//! wearlink-transport エラー型

use wearlink_proto::{MessageType, ProtoError};

use crate::status::ConnectionStatus;

/// 接続マネージャーのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// 未接続または切断中の送信
    #[error("cannot send while {status:?}")]
    NotConnected { status: ConnectionStatus },
    /// 許可されていない状態遷移
    #[error("illegal connection transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
    /// フレームが 1 パケットに収まらない
    #[error("{message_type:?} frame of {frame_len} bytes exceeds packet budget {budget}")]
    FrameTooLarge {
        message_type: MessageType,
        frame_len: usize,
        budget: usize,
    },
    /// フレームのエンコード/デコードエラー
    #[error(transparent)]
    Proto(#[from] ProtoError),
}
