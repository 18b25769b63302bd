//! 分割された SMP 通知の再組み立て
//!
//! ピアは 1 つの SMP メッセージを複数の通知に分けて送ることがあり、
//! 逆に 1 つの通知に複数のメッセージを詰めることもある。

use alloc::vec::Vec;

use crate::header::SmpHeader;

/// 受信バイトを溜め、完全なメッセージを先頭から切り出す
#[derive(Debug, Default)]
pub struct Accumulator {
    buffer: Vec<u8>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 断片を追加し、揃ったメッセージ（ヘッダー込み）をすべて返す
    pub fn push(&mut self, fragment: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(fragment);

        let mut complete = Vec::new();
        while self.buffer.len() >= SmpHeader::LEN {
            let Some(total) = SmpHeader::total_len(&self.buffer) else {
                break;
            };
            if self.buffer.len() < total {
                break;
            }
            complete.push(self.buffer.drain(..total).collect());
        }
        complete
    }

    /// 溜まっている未完成のバイト数
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
