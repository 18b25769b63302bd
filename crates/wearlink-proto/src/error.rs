//! wearlink-proto エラー型

/// フレーミング層のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    /// カタログに存在しない型インデックス（プロトコル違反）
    #[error("unknown message type index {index}")]
    UnknownMessageType { index: u8 },
    /// ヘッダーまたはペイロードがバッファ終端を越えている
    #[error("frame truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// 長さフィールドで表現できないペイロード長
    #[error("payload of {len} bytes exceeds length field maximum {max}")]
    PayloadTooLong { len: usize, max: usize },
    /// ペイロードの値が不正（enum 値の範囲外など）
    #[error("invalid {field} value: {value}")]
    InvalidValue { field: &'static str, value: u32 },
}
