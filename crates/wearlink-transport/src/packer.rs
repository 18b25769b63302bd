//! エンコード済みフレームをパケットに詰める
//!
//! ## パケットの構造
//! ```text
//! [frame 0][frame 1]...[frame n]
//!   - 合計長は budget（= MTU - ヘッダーオーバーヘッド）以下
//!   - フレームは分割しない。順序も入れ替えない
//! ```

use alloc::vec::Vec;

use log::warn;
use wearlink_proto::MessageType;

use crate::error::ConnectionError;

/// フレームを MTU 単位のパケットにまとめる
///
/// 先頭から順に、次のフレームを足しても budget を超えない限り同じパケットに
/// 追加する（greedy）。budget が `None` のときはすべて 1 パケットにまとめる。
pub struct Packer {
    /// 1 パケットに載せられる最大バイト数
    budget: Option<usize>,
}

/// 詰め込みの結果
#[derive(Debug, Default)]
pub struct Packed {
    pub packets: Vec<Vec<u8>>,
    /// 単独でも budget を超えるため送らなかったフレーム
    pub rejected: Vec<ConnectionError>,
    /// パケットに載ったフレーム数
    pub frame_count: usize,
}

impl Packer {
    /// 新しい Packer を生成する
    ///
    /// # 引数
    /// - `budget`: 1 パケットの最大バイト数（`None` なら無制限）
    pub fn new(budget: Option<usize>) -> Self {
        Packer { budget }
    }

    /// MTU とヘッダーオーバーヘッドから Packer を生成する
    pub fn for_mtu(mtu: Option<usize>, header_overhead: usize) -> Self {
        Packer::new(mtu.map(|mtu| mtu.saturating_sub(header_overhead)))
    }

    pub fn budget(&self) -> Option<usize> {
        self.budget
    }

    /// フレームが単独で 1 パケットに収まるか
    pub fn fits(&self, frame_len: usize) -> bool {
        self.budget.map_or(true, |budget| frame_len <= budget)
    }

    /// フレーム列をパケット列に詰める
    ///
    /// # 引数
    /// - `frames`: `(種別, エンコード済みフレーム)` を送信順に並べたもの
    pub fn pack(&self, frames: Vec<(MessageType, Vec<u8>)>) -> Packed {
        let mut packed = Packed::default();
        let mut current: Vec<u8> = Vec::new();

        for (message_type, frame) in frames {
            let budget = match self.budget {
                Some(budget) => budget,
                None => {
                    current.extend_from_slice(&frame);
                    packed.frame_count += 1;
                    continue;
                }
            };

            if frame.len() > budget {
                warn!(
                    "dropping {:?} frame of {} bytes: exceeds packet budget {}",
                    message_type,
                    frame.len(),
                    budget
                );
                packed.rejected.push(ConnectionError::FrameTooLarge {
                    message_type,
                    frame_len: frame.len(),
                    budget,
                });
                continue;
            }

            // 次のフレームが入らなければ現在のパケットを確定する
            if !current.is_empty() && current.len() + frame.len() > budget {
                packed.packets.push(core::mem::take(&mut current));
            }
            current.extend_from_slice(&frame);
            packed.frame_count += 1;
        }

        if !current.is_empty() {
            packed.packets.push(current);
        }

        packed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(message_type: MessageType, payload_len: usize) -> (MessageType, Vec<u8>) {
        let msg = wearlink_proto::TxMessage::with_data(message_type, alloc::vec![0xAB; payload_len]);
        (message_type, msg.encode().unwrap())
    }

    #[test]
    fn test_three_frames_need_three_packets_at_mtu_23() {
        // ペイロード 7, 12, 5 → フレーム 10, 15, 8 バイト。budget = 23 - 3 = 20
        let packer = Packer::for_mtu(Some(23), 3);
        let frames = alloc::vec![
            frame(MessageType::SetName, 7),
            frame(MessageType::SetFileBlock, 12),
            frame(MessageType::TriggerVibration, 5),
        ];
        let packed = packer.pack(frames);

        assert_eq!(packed.packets.len(), 3);
        assert_eq!(packed.packets[0].len(), 10);
        assert_eq!(packed.packets[1].len(), 15);
        assert_eq!(packed.packets[2].len(), 8);
        assert!(packed.rejected.is_empty());
        assert_eq!(packed.frame_count, 3);
    }

    #[test]
    fn test_small_frames_share_a_packet() {
        let packer = Packer::for_mtu(Some(23), 3);
        let frames = alloc::vec![
            frame(MessageType::GetName, 0),
            frame(MessageType::GetMtu, 0),
            frame(MessageType::SetName, 4),
            frame(MessageType::GetId, 0),
        ];
        let packed = packer.pack(frames);

        // 3 + 3 + 7 + 3 = 16 ≤ 20
        assert_eq!(packed.packets.len(), 1);
        assert_eq!(packed.packets[0].len(), 16);
    }

    #[test]
    fn test_frame_exactly_at_budget() {
        let packer = Packer::new(Some(20));
        let packed = packer.pack(alloc::vec![frame(MessageType::SetName, 17)]);
        assert_eq!(packed.packets.len(), 1);
        assert_eq!(packed.packets[0].len(), 20);
    }

    #[test]
    fn test_unbounded_packs_everything_together() {
        let packer = Packer::new(None);
        let frames = alloc::vec![
            frame(MessageType::SetFileBlock, 500),
            frame(MessageType::SetFileBlock, 500),
        ];
        let packed = packer.pack(frames);
        assert_eq!(packed.packets.len(), 1);
        assert_eq!(packed.packets[0].len(), 1006);
    }

    #[test]
    fn test_oversize_frame_is_rejected_not_dropped_silently() {
        let packer = Packer::new(Some(20));
        let frames = alloc::vec![
            frame(MessageType::GetName, 0),
            frame(MessageType::SetFileBlock, 40),
            frame(MessageType::GetMtu, 0),
        ];
        let packed = packer.pack(frames);

        assert_eq!(packed.packets.len(), 1);
        assert_eq!(packed.packets[0].len(), 6);
        assert_eq!(
            packed.rejected,
            alloc::vec![ConnectionError::FrameTooLarge {
                message_type: MessageType::SetFileBlock,
                frame_len: 43,
                budget: 20,
            }]
        );
    }

    #[test]
    fn test_order_is_preserved_across_packets() {
        let packer = Packer::new(Some(10));
        let frames: Vec<_> = (0..5u8)
            .map(|i| {
                let msg = wearlink_proto::TxMessage::with_data(MessageType::SetName, alloc::vec![i; 4]);
                (MessageType::SetName, msg.encode().unwrap())
            })
            .collect();
        let packed = packer.pack(frames);

        let joined: Vec<u8> = packed.packets.concat();
        let payload_markers: Vec<u8> = joined.chunks(7).map(|f| f[3]).collect();
        assert_eq!(payload_markers, alloc::vec![0, 1, 2, 3, 4]);
        assert!(packed.packets.iter().all(|p| p.len() <= 10));
    }
}
