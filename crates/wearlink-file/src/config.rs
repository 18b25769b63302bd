//! ファイル転送エンジンの設定

use crate::{DEFAULT_BLOCK_OVERHEAD, DEFAULT_MAX_BLOCK_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct FileTransferConfig {
    /// MTU からブロックサイズを決めるときに差し引くバイト数
    pub block_overhead: usize,
    /// MTU 不明時のブロックサイズ
    pub max_block_size: usize,
    /// 中継役。受信ブロックに ACK を返さず、そのまま `BlockRelayed` で流す
    pub relay: bool,
}

impl Default for FileTransferConfig {
    fn default() -> Self {
        FileTransferConfig {
            block_overhead: DEFAULT_BLOCK_OVERHEAD,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            relay: false,
        }
    }
}

impl FileTransferConfig {
    /// MTU に対するブロックサイズ（最低 1 バイト）
    pub fn block_size(&self, mtu: Option<usize>) -> usize {
        mtu.map_or(self.max_block_size, |mtu| mtu.saturating_sub(self.block_overhead))
            .max(1)
    }
}
