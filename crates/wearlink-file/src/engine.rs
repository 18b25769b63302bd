//! ファイル転送エンジン本体

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use log::{debug, info, warn};
use wearlink_proto::{crc32, Crc32, MessageType, RequestId, TxMessage};

use crate::config::FileTransferConfig;
use crate::error::FileTransferError;
use crate::event::FileTransferEvent;
use crate::state::{
    read_u32_le, read_u8, FileTransferCommand, FileTransferState, FileTransferStatus, PeerFileInfo,
};

/// 応答待ちの要求
///
/// ワイヤ上に ID はないので、応答は同じ種別の最も古い要求に対応させ、
/// 値が要求どおりかを確かめる。
#[derive(Debug)]
struct PendingRequest {
    id: RequestId,
    response_type: MessageType,
    expected: Vec<u8>,
}

/// 発行待ちの要求
struct Step {
    message: TxMessage,
    response_type: MessageType,
    expected: Vec<u8>,
}

impl Step {
    /// 値の設定要求。ピアは `Get*` 種別で同じ値をエコーする
    fn set(message_type: MessageType, response_type: MessageType, value: Vec<u8>) -> Self {
        Step {
            message: TxMessage::with_data(message_type, value.clone()),
            response_type,
            expected: value,
        }
    }

    fn command(command: FileTransferCommand) -> Self {
        Step {
            message: TxMessage::with_data(
                MessageType::SetFileTransferCommand,
                alloc::vec![command.to_byte()],
            ),
            response_type: MessageType::GetFileTransferStatus,
            expected: alloc::vec![command.expected_status().to_byte()],
        }
    }
}

/// 送信中のファイル
struct Outbound {
    data: Vec<u8>,
    block_size: usize,
    /// ピアが ACK したオフセット
    acked: usize,
    /// 送信済みで ACK 待ちのブロックの終端オフセット
    in_flight: Option<usize>,
}

/// ファイル転送エンジン（接続 1 つにつき 1 つ）
pub struct FileTransferEngine {
    config: FileTransferConfig,
    state: FileTransferState,
    peer: PeerFileInfo,
    outbound: Option<Outbound>,
    /// まだ発行していない設定要求（1 つずつ順に発行する）
    setup: VecDeque<Step>,
    pending: VecDeque<PendingRequest>,
    next_id: RequestId,
    cancelling: bool,
    /// 受信が宣言長に達し、検証を終えた
    receive_done: bool,
    /// 受信中にピアが長さ / CRC-32 を報告した
    declared_length: bool,
    declared_checksum: bool,
    /// 受信ブロックを届いた順に畳み込む
    receive_crc: Crc32,
    events: Vec<FileTransferEvent>,
}

impl FileTransferEngine {
    pub fn new(config: FileTransferConfig) -> Self {
        FileTransferEngine {
            config,
            state: FileTransferState::default(),
            peer: PeerFileInfo::default(),
            outbound: None,
            setup: VecDeque::new(),
            pending: VecDeque::new(),
            next_id: RequestId::default(),
            cancelling: false,
            receive_done: false,
            declared_length: false,
            declared_checksum: false,
            receive_crc: Crc32::new(),
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &FileTransferState {
        &self.state
    }

    pub fn peer(&self) -> &PeerFileInfo {
        &self.peer
    }

    pub fn is_cancelling(&self) -> bool {
        self.cancelling
    }

    /// 溜まったイベントを取り出す
    pub fn take_events(&mut self) -> Vec<FileTransferEvent> {
        core::mem::take(&mut self.events)
    }

    /// ファイルを送信する
    ///
    /// ピアが同じ `(種別, 長さ, CRC-32)` をすでに持っていれば何も送らず
    /// `AlreadyTransferred` を通知する。
    ///
    /// # 引数
    /// - `mtu`: 現在の MTU（ブロックサイズの決定に使う）
    ///
    /// # エラー
    /// - `FileTransferError::Busy`: 転送中
    /// - `FileTransferError::EmptyFile` / `FileTooLarge`
    pub fn send(
        &mut self,
        file_type: u8,
        data: Vec<u8>,
        mtu: Option<usize>,
    ) -> Result<Vec<TxMessage>, FileTransferError> {
        self.ensure_idle()?;
        if data.is_empty() {
            return Err(FileTransferError::EmptyFile);
        }
        let length = u32::try_from(data.len()).map_err(|_| FileTransferError::FileTooLarge {
            len: data.len(),
            max: u32::MAX,
        })?;
        if let Some(max) = self.peer.max_file_length {
            if length > max {
                return Err(FileTransferError::FileTooLarge {
                    len: data.len(),
                    max,
                });
            }
        }

        let checksum = crc32(&data);
        if self.peer.has_file(file_type, length, checksum) {
            info!("file type {} already on peer ({} bytes)", file_type, length);
            self.events
                .push(FileTransferEvent::AlreadyTransferred { file_type });
            return Ok(Vec::new());
        }

        let block_size = self.config.block_size(mtu);
        info!(
            "sending file type {}: {} bytes, crc32 {:08x}, block size {}",
            file_type, length, checksum, block_size
        );

        self.begin(FileTransferState {
            status: FileTransferStatus::Sending,
            file_type,
            length,
            checksum,
            ..FileTransferState::default()
        });
        self.outbound = Some(Outbound {
            data,
            block_size,
            acked: 0,
            in_flight: None,
        });
        self.setup.extend([
            Step::set(
                MessageType::SetFileType,
                MessageType::GetFileType,
                alloc::vec![file_type],
            ),
            Step::set(
                MessageType::SetFileLength,
                MessageType::GetFileLength,
                length.to_le_bytes().to_vec(),
            ),
            Step::set(
                MessageType::SetFileChecksum,
                MessageType::GetFileChecksum,
                checksum.to_le_bytes().to_vec(),
            ),
            Step::command(FileTransferCommand::Send),
        ]);

        Ok(self.issue_next().into_iter().collect())
    }

    /// ピアにファイルの送信を依頼する
    ///
    /// # エラー
    /// - `FileTransferError::Busy`: 転送中
    pub fn receive(&mut self, file_type: u8) -> Result<Vec<TxMessage>, FileTransferError> {
        self.ensure_idle()?;
        info!("receiving file type {}", file_type);

        self.begin(FileTransferState {
            status: FileTransferStatus::Receiving,
            file_type,
            ..FileTransferState::default()
        });
        self.setup.extend([
            Step::set(
                MessageType::SetFileType,
                MessageType::GetFileType,
                alloc::vec![file_type],
            ),
            Step::command(FileTransferCommand::Receive),
        ]);

        Ok(self.issue_next().into_iter().collect())
    }

    /// 転送をキャンセルする
    ///
    /// 次のブロックは送らない。ピアが `Idle` を報告した時点で `Cancelled` を通知する。
    ///
    /// # エラー
    /// - `FileTransferError::NotInProgress`: 転送中でない
    pub fn cancel(&mut self) -> Result<Vec<TxMessage>, FileTransferError> {
        if self.state.is_idle() {
            return Err(FileTransferError::NotInProgress);
        }
        info!("cancelling file transfer ({:?})", self.state.status);
        self.cancelling = true;
        self.setup.clear();
        self.pending.clear();
        Ok(alloc::vec![self.issue(Step::command(FileTransferCommand::Cancel))])
    }

    /// ピアからのファイル転送メッセージを処理する
    ///
    /// # 戻り値
    /// 続けて送るメッセージ（次の設定要求、次のブロック、受信 ACK）
    ///
    /// # エラー
    /// - `FileTransferError::Proto`: ペイロードが短い、または値が範囲外
    pub fn handle(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<Vec<TxMessage>, FileTransferError> {
        match message_type {
            MessageType::GetMaxFileLength => {
                self.peer.max_file_length = Some(read_u32_le(payload)?);
                Ok(Vec::new())
            }
            MessageType::GetFileType => {
                self.peer.file_type = Some(read_u8(payload)?);
                Ok(self.resolve(message_type, &payload[..1]))
            }
            MessageType::GetFileLength => {
                let length = read_u32_le(payload)?;
                self.peer.length = Some(length);
                if self.state.status == FileTransferStatus::Receiving {
                    self.state.length = length;
                    self.declared_length = true;
                }
                let out = self.resolve(message_type, &payload[..4]);
                self.check_receive_complete();
                Ok(out)
            }
            MessageType::GetFileChecksum => {
                let checksum = read_u32_le(payload)?;
                self.peer.checksum = Some(checksum);
                if self.state.status == FileTransferStatus::Receiving {
                    self.state.checksum = checksum;
                    self.declared_checksum = true;
                }
                let out = self.resolve(message_type, &payload[..4]);
                self.check_receive_complete();
                Ok(out)
            }
            MessageType::GetFileTransferStatus => {
                let status = FileTransferStatus::from_byte(read_u8(payload)?)?;
                let mut out = self.resolve(message_type, &[status.to_byte()]);
                out.extend(self.apply_status(status));
                Ok(out)
            }
            MessageType::GetFileBlock => Ok(self.on_block(payload)),
            MessageType::FileBytesTransferred => Ok(self.on_ack(read_u32_le(payload)?)),
            _ => {
                debug!("file transfer ignoring {:?}", message_type);
                Ok(Vec::new())
            }
        }
    }

    /// 状態をすべて破棄して Idle に戻す（ピアの情報は残す）
    pub fn reset(&mut self) {
        self.state = FileTransferState::default();
        self.outbound = None;
        self.setup.clear();
        self.pending.clear();
        self.cancelling = false;
        self.receive_done = false;
        self.declared_length = false;
        self.declared_checksum = false;
        self.receive_crc = Crc32::new();
    }

    // ===== Private メソッド =====

    fn ensure_idle(&self) -> Result<(), FileTransferError> {
        if self.state.is_idle() {
            Ok(())
        } else {
            Err(FileTransferError::Busy {
                status: self.state.status,
            })
        }
    }

    fn begin(&mut self, state: FileTransferState) {
        self.reset();
        self.state = state;
    }

    fn issue_next(&mut self) -> Option<TxMessage> {
        let step = self.setup.pop_front()?;
        Some(self.issue(step))
    }

    fn issue(&mut self, step: Step) -> TxMessage {
        let id = RequestId::next(&mut self.next_id);
        debug!("request {:?}: {:?}", id, step.message.message_type);
        self.pending.push_back(PendingRequest {
            id,
            response_type: step.response_type,
            expected: step.expected,
        });
        step.message
    }

    /// 応答を最も古い同種の要求に対応させる
    fn resolve(&mut self, response_type: MessageType, actual: &[u8]) -> Vec<TxMessage> {
        let Some(position) = self
            .pending
            .iter()
            .position(|r| r.response_type == response_type)
        else {
            return Vec::new();
        };
        let Some(request) = self.pending.remove(position) else {
            return Vec::new();
        };

        if request.expected.as_slice() != actual {
            warn!(
                "request {:?} answered by {:?} {:02X?}, expected {:02X?}; abandoning transfer",
                request.id, response_type, actual, request.expected
            );
            self.events.push(FileTransferEvent::RequestMismatch {
                id: request.id,
                message_type: response_type,
                expected: request.expected,
                actual: actual.to_vec(),
            });
            self.reset();
            return Vec::new();
        }

        self.events.push(FileTransferEvent::RequestResolved {
            id: request.id,
            message_type: response_type,
        });
        self.issue_next().into_iter().collect()
    }

    fn apply_status(&mut self, status: FileTransferStatus) -> Vec<TxMessage> {
        if status != self.state.status {
            info!("file transfer status {:?} -> {:?}", self.state.status, status);
        }
        self.events.push(FileTransferEvent::StatusChanged { status });

        match status {
            FileTransferStatus::Idle => {
                if self.cancelling {
                    self.events.push(FileTransferEvent::Cancelled);
                } else if let Some(outbound) = &self.outbound {
                    if outbound.acked == outbound.data.len() {
                        self.events.push(FileTransferEvent::Sent {
                            file_type: self.state.file_type,
                            length: outbound.data.len(),
                        });
                    } else if outbound.acked > 0 || outbound.in_flight.is_some() {
                        warn!(
                            "peer went idle after {} of {} bytes",
                            outbound.acked,
                            outbound.data.len()
                        );
                    }
                }
                self.reset();
                Vec::new()
            }
            FileTransferStatus::Sending => {
                self.state.status = status;
                if self.setup.is_empty() && self.pending.is_empty() {
                    self.next_block().into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            FileTransferStatus::Receiving => {
                self.state.status = status;
                Vec::new()
            }
        }
    }

    /// 次のブロックを切り出す（ACK 待ちのブロックがあれば出さない）
    fn next_block(&mut self) -> Option<TxMessage> {
        if self.cancelling {
            debug!("transfer cancelled; not sending next block");
            return None;
        }
        let outbound = self.outbound.as_mut()?;
        if outbound.in_flight.is_some() || outbound.acked >= outbound.data.len() {
            return None;
        }
        let end = (outbound.acked + outbound.block_size).min(outbound.data.len());
        outbound.in_flight = Some(end);
        debug!("block {}..{}", outbound.acked, end);
        Some(TxMessage::with_data(
            MessageType::SetFileBlock,
            outbound.data[outbound.acked..end].to_vec(),
        ))
    }

    fn on_ack(&mut self, offset: u32) -> Vec<TxMessage> {
        let Some(outbound) = self.outbound.as_mut() else {
            warn!("ack {} without an outbound transfer", offset);
            return Vec::new();
        };
        if outbound.in_flight != Some(offset as usize) {
            warn!(
                "ignoring ack {} (expected {:?})",
                offset, outbound.in_flight
            );
            return Vec::new();
        }

        outbound.acked = offset as usize;
        outbound.in_flight = None;
        let total = outbound.data.len();
        self.state.bytes_transferred = offset as usize;
        self.events.push(FileTransferEvent::Progress {
            transferred: offset as usize,
            total,
        });
        self.next_block().into_iter().collect()
    }

    fn on_block(&mut self, payload: &[u8]) -> Vec<TxMessage> {
        if self.state.status != FileTransferStatus::Receiving {
            warn!(
                "dropping {}-byte block while {:?}",
                payload.len(),
                self.state.status
            );
            return Vec::new();
        }
        if self.receive_done {
            warn!("dropping {}-byte block after end of file", payload.len());
            return Vec::new();
        }

        self.state.received_blocks.push(payload.to_vec());
        self.receive_crc.update(payload);
        self.state.bytes_transferred += payload.len();
        let received = self.state.bytes_transferred;

        let mut out = Vec::new();
        if self.config.relay {
            self.events.push(FileTransferEvent::BlockRelayed {
                data: payload.to_vec(),
            });
        } else {
            out.push(TxMessage::with_data(
                MessageType::FileBytesTransferred,
                (received as u32).to_le_bytes().to_vec(),
            ));
        }

        self.events.push(FileTransferEvent::Progress {
            transferred: received,
            total: self.state.length as usize,
        });
        self.check_receive_complete();
        out
    }

    /// 長さと CRC-32 の報告がそろい、宣言長まで受け取ったら検証する
    ///
    /// 長さ 0 のファイルはブロックを待たずにここで完了する。
    fn check_receive_complete(&mut self) {
        if self.state.status != FileTransferStatus::Receiving
            || self.receive_done
            || !self.declared_length
            || !self.declared_checksum
        {
            return;
        }
        if self.state.bytes_transferred >= self.state.length as usize {
            self.finish_receive();
        }
    }

    /// 受信ブロックを連結して長さと CRC-32 を確かめる
    ///
    /// 一致しなければ警告だけ出し、完了イベントは出さない。
    fn finish_receive(&mut self) {
        self.receive_done = true;
        let data = self.state.reassemble();

        if data.len() != self.state.length as usize {
            warn!(
                "received {} bytes, peer declared {}",
                data.len(),
                self.state.length
            );
            return;
        }
        let checksum = self.receive_crc.finalize();
        if checksum != self.state.checksum {
            warn!(
                "checksum mismatch: computed {:08x}, peer declared {:08x}",
                checksum, self.state.checksum
            );
            return;
        }

        info!(
            "received file type {} ({} bytes)",
            self.state.file_type,
            data.len()
        );
        self.events.push(FileTransferEvent::Completed {
            file_type: self.state.file_type,
            data,
        });
    }
}

impl Default for FileTransferEngine {
    fn default() -> Self {
        Self::new(FileTransferConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le32(value: u32) -> Vec<u8> {
        value.to_le_bytes().to_vec()
    }

    fn status(engine: &mut FileTransferEngine, status: FileTransferStatus) -> Vec<TxMessage> {
        engine
            .handle(MessageType::GetFileTransferStatus, &[status.to_byte()])
            .unwrap()
    }

    /// ピアのエコーを返しながら送信の設定を終え、最初のブロックを返す
    fn start_send(engine: &mut FileTransferEngine, file_type: u8, data: &[u8]) -> TxMessage {
        let msgs = engine.send(file_type, data.to_vec(), Some(23)).unwrap();
        assert_eq!(msgs.len(), 1);
        let mut msg = msgs.into_iter().next().unwrap();

        // Set* をそのまま Get* でエコーする
        loop {
            let echo = match msg.message_type {
                MessageType::SetFileType => MessageType::GetFileType,
                MessageType::SetFileLength => MessageType::GetFileLength,
                MessageType::SetFileChecksum => MessageType::GetFileChecksum,
                MessageType::SetFileTransferCommand => break,
                other => panic!("unexpected {:?}", other),
            };
            let next = engine.handle(echo, msg.payload()).unwrap();
            assert_eq!(next.len(), 1);
            msg = next.into_iter().next().unwrap();
        }
        assert_eq!(msg.payload(), &[FileTransferCommand::Send.to_byte()]);

        let blocks = status(engine, FileTransferStatus::Sending);
        assert_eq!(blocks.len(), 1);
        blocks.into_iter().next().unwrap()
    }

    fn start_receive(engine: &mut FileTransferEngine, file_type: u8, data: &[u8]) {
        let msgs = engine.receive(file_type).unwrap();
        assert_eq!(msgs[0].message_type, MessageType::SetFileType);
        let cmd = engine.handle(MessageType::GetFileType, &[file_type]).unwrap();
        assert_eq!(cmd[0].message_type, MessageType::SetFileTransferCommand);
        assert_eq!(cmd[0].payload(), &[FileTransferCommand::Receive.to_byte()]);
        status(engine, FileTransferStatus::Receiving);
        engine
            .handle(MessageType::GetFileLength, &le32(data.len() as u32))
            .unwrap();
        engine
            .handle(MessageType::GetFileChecksum, &le32(crc32(data)))
            .unwrap();
    }

    #[test]
    fn test_send_streams_one_block_per_ack() {
        let mut engine = FileTransferEngine::default();
        let data: Vec<u8> = (0..40u8).collect();

        let first = start_send(&mut engine, 2, &data);
        assert_eq!(first.message_type, MessageType::SetFileBlock);
        assert_eq!(first.payload(), &data[..17]);

        let second = engine.handle(MessageType::FileBytesTransferred, &le32(17)).unwrap();
        assert_eq!(second[0].payload(), &data[17..34]);
        let third = engine.handle(MessageType::FileBytesTransferred, &le32(34)).unwrap();
        assert_eq!(third[0].payload(), &data[34..]);
        let done = engine.handle(MessageType::FileBytesTransferred, &le32(40)).unwrap();
        assert!(done.is_empty());

        status(&mut engine, FileTransferStatus::Idle);
        let events = engine.take_events();

        let progress: Vec<_> = events.iter().filter_map(|e| e.progress()).collect();
        assert_eq!(progress, alloc::vec![17.0 / 40.0, 34.0 / 40.0, 1.0]);
        assert!(events.contains(&FileTransferEvent::Sent {
            file_type: 2,
            length: 40
        }));
        assert!(engine.state().is_idle());
    }

    #[test]
    fn test_send_requests_are_resolved_in_order() {
        let mut engine = FileTransferEngine::default();
        start_send(&mut engine, 1, b"hello");
        let resolved: Vec<_> = engine
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                FileTransferEvent::RequestResolved { id, message_type } => Some((id, message_type)),
                _ => None,
            })
            .collect();
        assert_eq!(
            resolved,
            alloc::vec![
                (RequestId(0), MessageType::GetFileType),
                (RequestId(1), MessageType::GetFileLength),
                (RequestId(2), MessageType::GetFileChecksum),
                (RequestId(3), MessageType::GetFileTransferStatus),
            ]
        );
    }

    #[test]
    fn test_unexpected_ack_is_ignored() {
        let mut engine = FileTransferEngine::default();
        let data = alloc::vec![7u8; 30];
        start_send(&mut engine, 0, &data);

        // 期待は 17
        assert!(engine
            .handle(MessageType::FileBytesTransferred, &le32(5))
            .unwrap()
            .is_empty());
        assert!(engine
            .handle(MessageType::FileBytesTransferred, &le32(30))
            .unwrap()
            .is_empty());
        let next = engine.handle(MessageType::FileBytesTransferred, &le32(17)).unwrap();
        assert_eq!(next[0].payload().len(), 13);
    }

    #[test]
    fn test_already_transferred_is_noop() {
        let mut engine = FileTransferEngine::default();
        let data = b"same firmware config".to_vec();
        engine.handle(MessageType::GetFileType, &[4]).unwrap();
        engine
            .handle(MessageType::GetFileLength, &le32(data.len() as u32))
            .unwrap();
        engine
            .handle(MessageType::GetFileChecksum, &le32(crc32(&data)))
            .unwrap();

        let msgs = engine.send(4, data, Some(23)).unwrap();
        assert!(msgs.is_empty());
        assert!(engine.state().is_idle());
        assert_eq!(
            engine.take_events(),
            alloc::vec![FileTransferEvent::AlreadyTransferred { file_type: 4 }]
        );
    }

    #[test]
    fn test_mismatched_echo_abandons_transfer() {
        let mut engine = FileTransferEngine::default();
        engine.send(1, alloc::vec![1, 2, 3], None).unwrap();

        let next = engine.handle(MessageType::GetFileType, &[9]).unwrap();
        assert!(next.is_empty());
        assert!(engine.state().is_idle());
        assert_eq!(
            engine.take_events(),
            alloc::vec![FileTransferEvent::RequestMismatch {
                id: RequestId(0),
                message_type: MessageType::GetFileType,
                expected: alloc::vec![1],
                actual: alloc::vec![9],
            }]
        );
    }

    #[test]
    fn test_unsolicited_echo_only_updates_peer() {
        let mut engine = FileTransferEngine::default();
        let msgs = engine.handle(MessageType::GetFileType, &[3]).unwrap();
        assert!(msgs.is_empty());
        assert_eq!(engine.peer().file_type, Some(3));
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_receive_completes_when_length_and_crc_match() {
        let mut engine = FileTransferEngine::default();
        let data = b"0123456789".to_vec();
        start_receive(&mut engine, 5, &data);

        let ack = engine.handle(MessageType::GetFileBlock, &data[..6]).unwrap();
        assert_eq!(
            ack,
            alloc::vec![TxMessage::with_data(MessageType::FileBytesTransferred, le32(6))]
        );
        let ack = engine.handle(MessageType::GetFileBlock, &data[6..]).unwrap();
        assert_eq!(ack[0].payload(), &le32(10)[..]);

        let events = engine.take_events();
        assert!(events.contains(&FileTransferEvent::Completed {
            file_type: 5,
            data: data.clone()
        }));
        let progress: Vec<_> = events.iter().filter_map(|e| e.progress()).collect();
        assert_eq!(progress, alloc::vec![0.6, 1.0]);
    }

    #[test]
    fn test_receive_checksum_mismatch_never_completes() {
        let mut engine = FileTransferEngine::default();
        let data = b"0123456789".to_vec();
        start_receive(&mut engine, 5, &data);

        let mut corrupted = data.clone();
        corrupted[3] ^= 0xFF;
        engine.handle(MessageType::GetFileBlock, &corrupted).unwrap();

        let events = engine.take_events();
        assert!(!events
            .iter()
            .any(|e| matches!(e, FileTransferEvent::Completed { .. })));
        assert_eq!(engine.state().status, FileTransferStatus::Receiving);
    }

    #[test]
    fn test_receive_length_mismatch_never_completes() {
        let mut engine = FileTransferEngine::default();
        let data = b"0123456789".to_vec();
        start_receive(&mut engine, 5, &data);

        // 宣言長より長いブロック（CRC は宣言と一致しない長さ）
        let mut longer = data.clone();
        longer.push(0);
        engine.handle(MessageType::GetFileBlock, &longer).unwrap();

        assert!(!engine
            .take_events()
            .iter()
            .any(|e| matches!(e, FileTransferEvent::Completed { .. })));
    }

    #[test]
    fn test_empty_file_receive_completes_without_blocks() {
        let mut engine = FileTransferEngine::default();
        start_receive(&mut engine, 3, b"");

        let events = engine.take_events();
        assert!(events.contains(&FileTransferEvent::Completed {
            file_type: 3,
            data: Vec::new()
        }));

        // 完了後のブロックは捨てる
        engine.handle(MessageType::GetFileBlock, b"late").unwrap();
        assert!(engine.state().received_blocks.is_empty());
    }

    #[test]
    fn test_receive_waits_for_declared_checksum() {
        let mut engine = FileTransferEngine::default();
        let data = b"abcd".to_vec();
        engine.receive(2).unwrap();
        engine.handle(MessageType::GetFileType, &[2]).unwrap();
        status(&mut engine, FileTransferStatus::Receiving);
        engine
            .handle(MessageType::GetFileLength, &le32(data.len() as u32))
            .unwrap();
        engine.handle(MessageType::GetFileBlock, &data).unwrap();
        assert!(!engine
            .take_events()
            .iter()
            .any(|e| matches!(e, FileTransferEvent::Completed { .. })));

        engine
            .handle(MessageType::GetFileChecksum, &le32(crc32(&data)))
            .unwrap();
        assert!(engine.take_events().contains(&FileTransferEvent::Completed {
            file_type: 2,
            data
        }));
    }

    #[test]
    fn test_many_small_blocks_checksum_accumulates() {
        let mut engine = FileTransferEngine::default();
        let data: Vec<u8> = (0u8..=255).cycle().take(700).collect();
        start_receive(&mut engine, 6, &data);

        for chunk in data.chunks(13) {
            engine.handle(MessageType::GetFileBlock, chunk).unwrap();
        }
        let completed: Vec<_> = engine
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, FileTransferEvent::Completed { .. }))
            .collect();
        assert_eq!(
            completed,
            alloc::vec![FileTransferEvent::Completed { file_type: 6, data }]
        );
    }

    #[test]
    fn test_relay_suppresses_acks_and_forwards_blocks() {
        let mut engine = FileTransferEngine::new(FileTransferConfig {
            relay: true,
            ..FileTransferConfig::default()
        });
        let data = b"relay".to_vec();
        start_receive(&mut engine, 0, &data);

        let out = engine.handle(MessageType::GetFileBlock, &data[..2]).unwrap();
        assert!(out.is_empty());
        let out = engine.handle(MessageType::GetFileBlock, &data[2..]).unwrap();
        assert!(out.is_empty());

        let relayed: Vec<_> = engine
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                FileTransferEvent::BlockRelayed { data } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(relayed, alloc::vec![b"re".to_vec(), b"lay".to_vec()]);
    }

    #[test]
    fn test_send_while_busy_rejected_without_mutation() {
        let mut engine = FileTransferEngine::default();
        start_send(&mut engine, 1, b"first file");
        let before = engine.state().clone();

        assert_eq!(
            engine.send(2, b"second".to_vec(), Some(23)),
            Err(FileTransferError::Busy {
                status: FileTransferStatus::Sending
            })
        );
        assert_eq!(
            engine.receive(2),
            Err(FileTransferError::Busy {
                status: FileTransferStatus::Sending
            })
        );
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_receive_while_receiving_rejected() {
        let mut engine = FileTransferEngine::default();
        start_receive(&mut engine, 1, b"abc");
        let before = engine.state().clone();
        assert!(matches!(
            engine.receive(1),
            Err(FileTransferError::Busy { .. })
        ));
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_cancel_stops_block_pump() {
        let mut engine = FileTransferEngine::default();
        let data = alloc::vec![1u8; 50];
        start_send(&mut engine, 0, &data);

        let cancel = engine.cancel().unwrap();
        assert_eq!(cancel[0].message_type, MessageType::SetFileTransferCommand);
        assert_eq!(cancel[0].payload(), &[FileTransferCommand::Cancel.to_byte()]);

        // 飛行中ブロックの ACK が来ても次のブロックは出さない
        let next = engine.handle(MessageType::FileBytesTransferred, &le32(17)).unwrap();
        assert!(next.is_empty());

        status(&mut engine, FileTransferStatus::Idle);
        let events = engine.take_events();
        assert!(events.contains(&FileTransferEvent::Cancelled));
        assert!(!events
            .iter()
            .any(|e| matches!(e, FileTransferEvent::Sent { .. })));
        assert!(engine.state().is_idle());
        assert!(!engine.is_cancelling());
    }

    #[test]
    fn test_cancel_when_idle() {
        let mut engine = FileTransferEngine::default();
        assert_eq!(engine.cancel(), Err(FileTransferError::NotInProgress));
    }

    #[test]
    fn test_empty_and_oversized_files() {
        let mut engine = FileTransferEngine::default();
        assert_eq!(
            engine.send(0, Vec::new(), None),
            Err(FileTransferError::EmptyFile)
        );

        engine.handle(MessageType::GetMaxFileLength, &le32(8)).unwrap();
        assert_eq!(
            engine.send(0, alloc::vec![0; 9], None),
            Err(FileTransferError::FileTooLarge { len: 9, max: 8 })
        );
        assert!(engine.state().is_idle());
    }

    #[test]
    fn test_idle_status_clears_received_blocks() {
        let mut engine = FileTransferEngine::default();
        start_receive(&mut engine, 1, b"abcdef");
        engine.handle(MessageType::GetFileBlock, b"abc").unwrap();
        assert_eq!(engine.state().received_blocks.len(), 1);

        status(&mut engine, FileTransferStatus::Idle);
        assert!(engine.state().received_blocks.is_empty());
        assert!(engine.state().is_idle());
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let mut engine = FileTransferEngine::default();
        assert!(matches!(
            engine.handle(MessageType::FileBytesTransferred, &[1, 2]),
            Err(FileTransferError::Proto(_))
        ));
        assert!(matches!(
            engine.handle(MessageType::GetFileTransferStatus, &[7]),
            Err(FileTransferError::Proto(_))
        ));
    }

    #[test]
    fn test_block_size_without_mtu() {
        let mut engine = FileTransferEngine::default();
        let data = alloc::vec![0u8; 600];
        let mut msg = engine.send(0, data, None).unwrap().remove(0);
        loop {
            let echo = match msg.message_type {
                MessageType::SetFileType => MessageType::GetFileType,
                MessageType::SetFileLength => MessageType::GetFileLength,
                MessageType::SetFileChecksum => MessageType::GetFileChecksum,
                _ => break,
            };
            msg = engine.handle(echo, msg.payload()).unwrap().remove(0);
        }
        let block = status(&mut engine, FileTransferStatus::Sending);
        assert_eq!(block[0].payload().len(), 512);
    }
}
