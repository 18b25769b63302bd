//! ファイル転送イベント

use alloc::vec::Vec;

use wearlink_proto::{MessageType, RequestId};

use crate::state::FileTransferStatus;

/// エンジンからホストへの通知
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "camelCase"))]
pub enum FileTransferEvent {
    /// ピアがすでに同じファイルを持っているので送信しなかった
    AlreadyTransferred { file_type: u8 },
    /// 要求に対応する応答が届いた
    RequestResolved {
        id: RequestId,
        message_type: MessageType,
    },
    /// 応答の値が要求と一致しなかった（転送は中止）
    RequestMismatch {
        id: RequestId,
        message_type: MessageType,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
    /// ピアの転送状態が変わった
    StatusChanged { status: FileTransferStatus },
    /// 進捗（送信は ACK 済みバイト数、受信は受信済みバイト数）
    Progress { transferred: usize, total: usize },
    /// 送信完了
    Sent { file_type: u8, length: usize },
    /// 受信完了（長さと CRC-32 が一致したときだけ）
    Completed { file_type: u8, data: Vec<u8> },
    /// 中継役で受け取ったブロック
    BlockRelayed { data: Vec<u8> },
    /// キャンセル完了
    Cancelled,
}

impl FileTransferEvent {
    /// 進捗率（0.0〜1.0）。進捗イベント以外は `None`
    pub fn progress(&self) -> Option<f64> {
        match *self {
            FileTransferEvent::Progress { transferred, total } if total > 0 => {
                Some(transferred as f64 / total as f64)
            }
            _ => None,
        }
    }
}
