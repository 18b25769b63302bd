//! 接続マネージャー本体
//!
//! デバイス 1 台分の接続状態、MTU、送信待ちキューを持つ状態機械。

use alloc::vec::Vec;

use log::{debug, info};
use wearlink_proto::{decode_frames, LengthWidth, MessageType, TxMessage};

use crate::dispatch::Dispatcher;
use crate::error::ConnectionError;
use crate::packer::Packer;
use crate::status::ConnectionStatus;
use crate::{DEFAULT_HEADER_OVERHEAD, DEFAULT_MTU, LIVENESS_INTERVAL_MS};

/// 接続マネージャーの設定
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct ConnectionConfig {
    /// MTU 未報告時（および切断後）の MTU。`None` は無制限
    pub default_mtu: Option<usize>,
    /// パケットごとのトランスポートヘッダー長
    pub header_overhead: usize,
    /// 生存確認の間隔（ミリ秒）
    pub liveness_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            default_mtu: Some(DEFAULT_MTU),
            header_overhead: DEFAULT_HEADER_OVERHEAD,
            liveness_interval_ms: LIVENESS_INTERVAL_MS,
        }
    }
}

/// 1 回の flush の結果
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Flush {
    /// トランスポートに書き込むパケット（順番通りに書くこと）
    pub packets: Vec<Vec<u8>>,
    /// 1 パケットに収まらず送られなかったフレーム
    pub rejected: Vec<ConnectionError>,
}

impl Flush {
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty() && self.rejected.is_empty()
    }
}

/// 接続統計情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConnectionStats {
    /// 送信したパケット数
    pub packets_sent: u64,
    /// 送信したフレーム数
    pub frames_sent: u64,
    /// 送信したバイト数
    pub bytes_sent: u64,
    /// 受信したバイト数
    pub bytes_received: u64,
    /// 大きすぎて送れなかったフレーム数
    pub rejected_frames: u64,
}

/// 接続マネージャー
pub struct ConnectionManager {
    config: ConnectionConfig,
    status: ConnectionStatus,
    mtu: Option<usize>,
    /// 送信待ちキュー（flush で一括して取り出される）
    pending: Vec<TxMessage>,
    /// flush 済みパケットの書き込み完了待ち
    busy: bool,
    /// 最後に生存確認をした時刻（ミリ秒）
    last_liveness_ms: u64,
    stats: ConnectionStats,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let mtu = config.default_mtu;
        ConnectionManager {
            config,
            status: ConnectionStatus::NotConnected,
            mtu,
            pending: Vec::new(),
            busy: false,
            last_liveness_ms: 0,
            stats: ConnectionStats::default(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn mtu(&self) -> Option<usize> {
        self.mtu
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// 接続状態を変更する
    ///
    /// 同じ状態への変更は何もしない。`NotConnected` に入ると MTU を既定値に戻し、
    /// 送信待ちキューと busy フラグを破棄する。
    ///
    /// # エラー
    /// - `ConnectionError::IllegalTransition`: 許可されていない遷移
    pub fn set_status(&mut self, next: ConnectionStatus) -> Result<(), ConnectionError> {
        if next == self.status {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(ConnectionError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }

        info!("connection status {:?} -> {:?}", self.status, next);
        self.status = next;

        if next == ConnectionStatus::NotConnected {
            self.mtu = self.config.default_mtu;
            if !self.pending.is_empty() {
                debug!("discarding {} queued messages", self.pending.len());
            }
            self.pending.clear();
            self.busy = false;
        }
        Ok(())
    }

    /// トランスポートから報告された MTU を設定する
    pub fn set_mtu(&mut self, mtu: Option<usize>) {
        debug!("mtu {:?} -> {:?}", self.mtu, mtu);
        self.mtu = mtu;
    }

    /// 1 パケットに載せられる最大バイト数
    pub fn packet_budget(&self) -> Option<usize> {
        self.packer().budget()
    }

    /// メッセージを送信キューに積む
    ///
    /// `flush_now` が true ならそのまま `flush()` した結果を返す。
    ///
    /// # エラー
    /// - `ConnectionError::NotConnected`: 未接続または切断中
    /// - `ConnectionError::FrameTooLarge`: MTU が分かっていて、1 パケットに収まらない
    /// - `ConnectionError::Proto`: ペイロードが長さフィールドに収まらない
    ///
    /// エラー時はキューを変更しない。
    pub fn enqueue(
        &mut self,
        messages: Vec<TxMessage>,
        flush_now: bool,
    ) -> Result<Flush, ConnectionError> {
        if !self.status.accepts_sends() {
            return Err(ConnectionError::NotConnected {
                status: self.status,
            });
        }

        let packer = self.packer();
        for message in &messages {
            let frame = message.encode()?;
            if !packer.fits(frame.len()) {
                return Err(ConnectionError::FrameTooLarge {
                    message_type: message.message_type,
                    frame_len: frame.len(),
                    budget: packer.budget().unwrap_or(usize::MAX),
                });
            }
        }

        self.pending.extend(messages);

        if flush_now {
            Ok(self.flush())
        } else {
            Ok(Flush::default())
        }
    }

    /// キューの中身をすべてパケットにする
    ///
    /// 前回の flush の書き込み完了（`sent()`）を待っている間、またはキューが
    /// 空のときは何もしない。パケットを返したら、ホストが書き終えるまで busy。
    pub fn flush(&mut self) -> Flush {
        if self.busy || self.pending.is_empty() {
            return Flush::default();
        }

        let queued = core::mem::take(&mut self.pending);
        let mut frames: Vec<(MessageType, Vec<u8>)> = Vec::with_capacity(queued.len());
        let mut rejected = Vec::new();
        for message in queued {
            match message.encode() {
                Ok(frame) => frames.push((message.message_type, frame)),
                Err(e) => rejected.push(ConnectionError::from(e)),
            }
        }

        let packed = self.packer().pack(frames);
        rejected.extend(packed.rejected);

        self.stats.packets_sent += packed.packets.len() as u64;
        self.stats.frames_sent += packed.frame_count as u64;
        self.stats.bytes_sent += packed.packets.iter().map(|p| p.len() as u64).sum::<u64>();
        self.stats.rejected_frames += rejected.len() as u64;

        if !packed.packets.is_empty() {
            self.busy = true;
            debug!(
                "flush: {} frames in {} packets",
                packed.frame_count,
                packed.packets.len()
            );
        }

        Flush {
            packets: packed.packets,
            rejected,
        }
    }

    /// 前回 flush したパケットの書き込みが終わった
    ///
    /// busy を解除し、その間に積まれたメッセージを flush する。
    pub fn sent(&mut self) -> Flush {
        self.busy = false;
        self.flush()
    }

    /// 受信したトランスポートメッセージをフレームに分けて振り分ける
    ///
    /// # エラー
    /// - `ConnectionError::Proto`: 未知の型インデックス、または途中で切れたフレーム
    ///
    /// エラーの前までのフレームはすでに振り分け済み。
    pub fn receive<D: Dispatcher>(
        &mut self,
        buffer: &[u8],
        dispatcher: &mut D,
    ) -> Result<(), ConnectionError> {
        self.stats.bytes_received += buffer.len() as u64;
        decode_frames::<MessageType, _>(buffer, LengthWidth::Two, |message_type, payload| {
            dispatcher.dispatch(message_type, payload)
        })?;
        dispatcher.batch_received();
        Ok(())
    }

    /// 定期処理（生存確認）
    ///
    /// 前回の確認から `liveness_interval_ms` 経過していれば、トランスポートが
    /// 切れていないか確かめる。切れていれば合法な遷移をたどって `NotConnected`
    /// まで落とし、たどった状態を順に返す。
    pub fn tick(&mut self, now_ms: u64, transport_connected: bool) -> Vec<ConnectionStatus> {
        let mut transitions = Vec::new();
        if now_ms.saturating_sub(self.last_liveness_ms) < self.config.liveness_interval_ms {
            return transitions;
        }
        self.last_liveness_ms = now_ms;

        if transport_connected || self.status == ConnectionStatus::NotConnected {
            return transitions;
        }

        info!("transport lost while {:?}", self.status);
        for next in self.status.path_to_disconnected() {
            if self.set_status(*next).is_ok() {
                transitions.push(*next);
            }
        }
        transitions
    }

    fn packer(&self) -> Packer {
        Packer::for_mtu(self.mtu, self.config.header_overhead)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HandlerMap;
    use wearlink_proto::{ProtoError, SubProtocol};

    fn connected() -> ConnectionManager {
        let mut manager = ConnectionManager::default();
        manager.set_status(ConnectionStatus::Connecting).unwrap();
        manager.set_status(ConnectionStatus::Connected).unwrap();
        manager
    }

    fn message(payload_len: usize) -> TxMessage {
        TxMessage::with_data(MessageType::SetFileBlock, alloc::vec![0x55; payload_len])
    }

    struct Recorder {
        frames: Vec<(MessageType, Vec<u8>)>,
        batches: usize,
    }

    impl Dispatcher for Recorder {
        fn dispatch(&mut self, message_type: MessageType, payload: &[u8]) {
            self.frames.push((message_type, payload.to_vec()));
        }

        fn batch_received(&mut self) {
            self.batches += 1;
        }
    }

    #[test]
    fn test_new_manager_defaults() {
        let manager = ConnectionManager::default();
        assert_eq!(manager.status(), ConnectionStatus::NotConnected);
        assert_eq!(manager.mtu(), Some(23));
        assert_eq!(manager.packet_budget(), Some(20));
        assert!(!manager.is_busy());
    }

    #[test]
    fn test_enqueue_rejected_when_not_connected() {
        let mut manager = ConnectionManager::default();
        let result = manager.enqueue(alloc::vec![message(1)], true);
        assert_eq!(
            result,
            Err(ConnectionError::NotConnected {
                status: ConnectionStatus::NotConnected
            })
        );
        assert_eq!(manager.pending_len(), 0);
    }

    #[test]
    fn test_enqueue_rejected_while_disconnecting() {
        let mut manager = connected();
        manager.set_status(ConnectionStatus::Disconnecting).unwrap();
        assert!(matches!(
            manager.enqueue(alloc::vec![message(1)], false),
            Err(ConnectionError::NotConnected { .. })
        ));
    }

    #[test]
    fn test_enqueue_allowed_while_connecting() {
        let mut manager = ConnectionManager::default();
        manager.set_status(ConnectionStatus::Connecting).unwrap();
        let flush = manager
            .enqueue(alloc::vec![TxMessage::new(MessageType::GetMtu)], true)
            .unwrap();
        assert_eq!(flush.packets.len(), 1);
    }

    #[test]
    fn test_flush_packs_three_packets_at_default_mtu() {
        let mut manager = connected();
        let flush = manager
            .enqueue(alloc::vec![message(7), message(12), message(5)], true)
            .unwrap();
        assert_eq!(flush.packets.len(), 3);
        assert!(flush.rejected.is_empty());
        assert_eq!(manager.pending_len(), 0);
        assert_eq!(manager.stats().packets_sent, 3);
        assert_eq!(manager.stats().frames_sent, 3);
        assert_eq!(manager.stats().bytes_sent, 33);
    }

    #[test]
    fn test_enqueue_oversize_frame_fails_without_mutation() {
        let mut manager = connected();
        let result = manager.enqueue(alloc::vec![message(1), message(18)], false);
        assert_eq!(
            result,
            Err(ConnectionError::FrameTooLarge {
                message_type: MessageType::SetFileBlock,
                frame_len: 21,
                budget: 20,
            })
        );
        assert_eq!(manager.pending_len(), 0);
    }

    #[test]
    fn test_payload_too_long_for_length_field() {
        let mut manager = connected();
        manager.set_mtu(None);
        let result = manager.enqueue(alloc::vec![message(70_000)], false);
        assert!(matches!(
            result,
            Err(ConnectionError::Proto(ProtoError::PayloadTooLong { .. }))
        ));
    }

    #[test]
    fn test_flush_while_busy_is_noop_until_sent() {
        let mut manager = connected();
        let first = manager.enqueue(alloc::vec![message(4)], true).unwrap();
        assert_eq!(first.packets.len(), 1);
        assert!(manager.is_busy());

        // busy 中の flush は何も返さず、キューに残る
        let second = manager.enqueue(alloc::vec![message(5)], true).unwrap();
        assert!(second.is_empty());
        assert_eq!(manager.pending_len(), 1);

        // 書き込み完了で残りが flush される
        let third = manager.sent();
        assert_eq!(third.packets.len(), 1);
        assert_eq!(third.packets[0].len(), 8);
        assert_eq!(manager.pending_len(), 0);

        let idle = manager.sent();
        assert!(idle.is_empty());
        assert!(!manager.is_busy());
    }

    #[test]
    fn test_unbounded_mtu_single_packet() {
        let mut manager = connected();
        manager.set_mtu(None);
        let flush = manager
            .enqueue(alloc::vec![message(100), message(200)], true)
            .unwrap();
        assert_eq!(flush.packets.len(), 1);
        assert_eq!(flush.packets[0].len(), 306);
    }

    #[test]
    fn test_frames_queued_before_mtu_shrinks_are_rejected_at_flush() {
        let mut manager = connected();
        manager.set_mtu(None);
        manager
            .enqueue(alloc::vec![message(2), message(40)], false)
            .unwrap();
        manager.set_mtu(Some(23));

        let flush = manager.flush();
        assert_eq!(flush.packets.len(), 1);
        assert_eq!(flush.rejected.len(), 1);
        assert_eq!(manager.stats().rejected_frames, 1);
    }

    #[test]
    fn test_disconnect_resets_mtu_queue_and_busy() {
        let mut manager = connected();
        manager.set_mtu(Some(247));
        manager.enqueue(alloc::vec![message(4)], true).unwrap();
        manager.enqueue(alloc::vec![message(4)], false).unwrap();
        assert!(manager.is_busy());

        manager.set_status(ConnectionStatus::Disconnecting).unwrap();
        manager.set_status(ConnectionStatus::NotConnected).unwrap();

        assert_eq!(manager.mtu(), Some(23));
        assert_eq!(manager.pending_len(), 0);
        assert!(!manager.is_busy());
    }

    #[test]
    fn test_illegal_transition() {
        let mut manager = ConnectionManager::default();
        assert_eq!(
            manager.set_status(ConnectionStatus::Connected),
            Err(ConnectionError::IllegalTransition {
                from: ConnectionStatus::NotConnected,
                to: ConnectionStatus::Connected,
            })
        );
        assert_eq!(manager.status(), ConnectionStatus::NotConnected);

        let mut manager = connected();
        assert!(manager.set_status(ConnectionStatus::Connecting).is_err());
        assert!(manager.set_status(ConnectionStatus::NotConnected).is_err());
    }

    #[test]
    fn test_receive_dispatches_in_order_then_batch() {
        let mut manager = connected();
        let mut buffer = TxMessage::with_data(MessageType::GetName, b"left".to_vec())
            .encode()
            .unwrap();
        buffer.extend(TxMessage::with_data(MessageType::IsCharging, alloc::vec![1]).encode().unwrap());

        let mut recorder = Recorder {
            frames: Vec::new(),
            batches: 0,
        };
        manager.receive(&buffer, &mut recorder).unwrap();

        assert_eq!(
            recorder.frames,
            alloc::vec![
                (MessageType::GetName, b"left".to_vec()),
                (MessageType::IsCharging, alloc::vec![1]),
            ]
        );
        assert_eq!(recorder.batches, 1);
        assert_eq!(manager.stats().bytes_received, buffer.len() as u64);
    }

    #[test]
    fn test_receive_protocol_violation() {
        let mut manager = connected();
        let mut recorder = Recorder {
            frames: Vec::new(),
            batches: 0,
        };
        let result = manager.receive(&[0xFE, 0x00, 0x00], &mut recorder);
        assert_eq!(
            result,
            Err(ConnectionError::Proto(ProtoError::UnknownMessageType { index: 0xFE }))
        );
        assert_eq!(recorder.batches, 0);
    }

    #[test]
    fn test_receive_through_handler_map() {
        use alloc::rc::Rc;
        use core::cell::RefCell;

        let mut manager = connected();
        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = names.clone();
        let mut handlers = HandlerMap::new();
        handlers.register(SubProtocol::Information, move |_, payload| {
            sink.borrow_mut().push(payload.to_vec())
        });

        let buffer = TxMessage::with_data(MessageType::GetName, b"right".to_vec())
            .encode()
            .unwrap();
        manager.receive(&buffer, &mut handlers).unwrap();
        assert_eq!(*names.borrow(), alloc::vec![b"right".to_vec()]);
    }

    #[test]
    fn test_liveness_walks_legal_edges() {
        let mut manager = connected();

        // 間隔内は確認しない
        assert!(manager.tick(4_999, false).is_empty());
        assert_eq!(manager.status(), ConnectionStatus::Connected);

        let transitions = manager.tick(5_000, false);
        assert_eq!(
            transitions,
            alloc::vec![ConnectionStatus::Disconnecting, ConnectionStatus::NotConnected]
        );
        assert_eq!(manager.status(), ConnectionStatus::NotConnected);
    }

    #[test]
    fn test_liveness_while_connecting() {
        let mut manager = ConnectionManager::default();
        manager.set_status(ConnectionStatus::Connecting).unwrap();
        assert_eq!(
            manager.tick(5_000, false),
            alloc::vec![ConnectionStatus::NotConnected]
        );
    }

    #[test]
    fn test_liveness_connected_transport_keeps_status() {
        let mut manager = connected();
        assert!(manager.tick(5_000, true).is_empty());
        assert!(manager.tick(10_000, true).is_empty());
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }
}
