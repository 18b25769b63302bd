//! SMP エンジンの設定

/// SMP エンジンの設定
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct SmpConfig {
    /// チャンクサイズ計算で MTU から差し引く固定分
    /// （外側 TLV ヘッダー 3 + トランスポートヘッダー 3 + data の長さプレフィックス増分 2）
    pub fixed_overhead: usize,
    /// MTU が分からないときのチャンクサイズ
    pub max_chunk_size: usize,
    /// アップロード完了後にイメージ状態を読み直す
    pub read_state_after_upload: bool,
}

impl Default for SmpConfig {
    fn default() -> Self {
        SmpConfig {
            fixed_overhead: 8,
            max_chunk_size: 512,
            read_state_after_upload: true,
        }
    }
}
