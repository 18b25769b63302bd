//! wearlink-smp エラー型

use wearlink_cbor::CborError;

/// SMP エンジンのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmpError {
    /// ファームウェアイメージの形式が不正（送信前に検出）
    #[error("invalid image: {0}")]
    InvalidImage(&'static str),
    /// SMP ヘッダーより短いメッセージ
    #[error("SMP message of {len} bytes is shorter than its header")]
    Truncated { len: usize },
    /// 応答の CBOR が不正
    #[error("invalid CBOR payload: {0}")]
    Cbor(#[from] CborError),
    /// 応答に必要なフィールドがない
    #[error("response is missing field `{0}`")]
    MissingField(&'static str),
    /// アップロード/ダウンロードの応答オフセットが不正
    #[error("unexpected offset {off} (acknowledged {acked}, length {len})")]
    UnexpectedOffset { off: u64, acked: usize, len: usize },
    /// MTU が小さすぎてデータを 1 バイトも載せられない
    #[error("MTU {mtu} leaves no room for data (overhead {overhead})")]
    MtuTooSmall { mtu: usize, overhead: usize },
    /// 別の転送が進行中
    #[error("another transfer is in progress")]
    TransferInProgress,
    #[error("no transfer in progress")]
    NotInProgress,
    /// 指定スロットのイメージ情報がない（先にイメージ状態を読むこと）
    #[error("no image known in slot {slot}")]
    NoImageInSlot { slot: u32 },
    #[error("nothing to upload")]
    EmptyData,
    /// CBOR 本体が 16 ビットの長さフィールドを超える
    #[error("SMP body of {len} bytes exceeds the 16-bit length field")]
    BodyTooLong { len: usize },
}
