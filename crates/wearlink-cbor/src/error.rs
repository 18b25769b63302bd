//! wearlink-cbor エラー型

/// CBOR エンコード/デコードのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CborError {
    /// データが途中で終わっている
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },
    /// 予約済みの additional info（28..=30）または major type と組み合わせ不可
    #[error("invalid additional info {info} at offset {offset}")]
    InvalidAdditionalInfo { offset: usize, info: u8 },
    /// 不定長コンテナの外で break (0xFF) が現れた
    #[error("unexpected break at offset {offset}")]
    UnexpectedBreak { offset: usize },
    /// 不定長文字列のチャンクが外側と異なる major type、または不定長
    #[error("invalid indefinite-length chunk at offset {offset}")]
    InvalidIndefiniteChunk { offset: usize },
    /// テキスト文字列が UTF-8 として不正
    #[error("invalid UTF-8 in text string at offset {offset}")]
    InvalidUtf8 { offset: usize },
    /// 値の後ろに未消費のバイトが残っている
    #[error("{remaining} trailing bytes after value at offset {offset}")]
    TrailingBytes { offset: usize, remaining: usize },
    /// 2 バイト形式の simple value に 32 未満の番号、または
    /// 予約済み番号（20..=31）の `Value::Simple` をエンコードしようとした
    #[error("simple value {0} is not well-formed")]
    InvalidSimpleValue(u8),
    /// ネストが深すぎる
    #[error("nesting deeper than {max} levels")]
    DepthExceeded { max: usize },
}
