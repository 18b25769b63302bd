//! SMP エンジン本体
//!
//! コマンドを SMP バイト列にし、応答を `seq` で要求に対応させて処理する。
//! 外側フレーム（`MessageType::SmpMessage`）への包み込みと送信はホストが行う。

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{debug, info, warn};
use wearlink_cbor::{cbor_map, to_vec, Value};
use wearlink_proto::RequestId;

use crate::accumulator::Accumulator;
use crate::config::SmpConfig;
use crate::error::SmpError;
use crate::event::{FirmwareEvent, TaskInfo};
use crate::header::{self, SmpGroup, SmpHeader, SmpMessage, SmpOp};
use crate::image::{file_sha256, inspect_image};
use crate::slots::{derive_status, FirmwareImage, FirmwareStatus};

/// 送信する SMP メッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmpRequest {
    pub id: RequestId,
    /// SMP ヘッダー + CBOR
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    ImageState,
    ImageUpload,
    ImageErase,
    Reset,
    Echo,
    TaskStats,
    FileUpload,
    FileDownload,
}

/// 応答待ちのコマンド（`seq` をキーに保持）
#[derive(Debug)]
struct PendingCommand {
    id: RequestId,
    group: SmpGroup,
    command_id: u8,
    kind: CommandKind,
}

enum UploadTarget {
    /// `sha` はファイル全体の SHA-256
    Image { sha: [u8; 32] },
    File { name: String },
}

struct Upload {
    target: UploadTarget,
    data: Vec<u8>,
    /// ピアが返した最新の `off`
    acked: usize,
    mtu: Option<usize>,
}

struct Download {
    name: String,
    data: Vec<u8>,
    /// 初回応答の `len`
    total: Option<usize>,
}

/// 進行中のデータ転送（同時に 1 つだけ）
enum Transfer {
    Upload(Upload),
    Download(Download),
}

/// SMP ファームウェア更新エンジン（接続 1 つにつき 1 つ）
pub struct SmpEngine {
    config: SmpConfig,
    seq: u8,
    next_id: RequestId,
    pending: BTreeMap<u8, PendingCommand>,
    accumulator: Accumulator,
    transfer: Option<Transfer>,
    /// アップロードしたイメージのハッシュ（次のスロット表で照合する）
    expected_hash: Option<[u8; 32]>,
    images: Vec<FirmwareImage>,
    status: FirmwareStatus,
    events: Vec<FirmwareEvent>,
}

impl SmpEngine {
    pub fn new(config: SmpConfig) -> Self {
        SmpEngine {
            config,
            seq: 0,
            next_id: RequestId::default(),
            pending: BTreeMap::new(),
            accumulator: Accumulator::new(),
            transfer: None,
            expected_hash: None,
            images: Vec::new(),
            status: FirmwareStatus::Idle,
            events: Vec::new(),
        }
    }

    pub fn status(&self) -> FirmwareStatus {
        self.status
    }

    /// 最後に受け取ったスロット表
    pub fn images(&self) -> &[FirmwareImage] {
        &self.images
    }

    /// 応答待ちのコマンド数
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_transferring(&self) -> bool {
        self.transfer.is_some()
    }

    pub fn take_events(&mut self) -> Vec<FirmwareEvent> {
        core::mem::take(&mut self.events)
    }

    // ===== コマンド =====

    /// イメージ状態（スロット表）を読む
    pub fn read_image_state(&mut self) -> Result<SmpRequest, SmpError> {
        self.command(
            SmpOp::Read,
            SmpGroup::Image,
            header::image::STATE,
            CommandKind::ImageState,
            cbor_map! {},
        )
    }

    /// ファームウェアイメージをアップロードする
    ///
    /// 送信前にイメージヘッダーを検査する。返すのは最初のチャンクで、
    /// 以降のチャンクはピアの応答を `handle` したときに返る。
    ///
    /// # エラー
    /// - `SmpError::InvalidImage`: ヘッダーが不正
    /// - `SmpError::TransferInProgress`: 別の転送が進行中
    /// - `SmpError::MtuTooSmall`: チャンクを載せる余地がない
    /// - `SmpError::BodyTooLong`: チャンクが SMP の長さフィールドに収まらない
    pub fn upload_image(
        &mut self,
        image: Vec<u8>,
        mtu: Option<usize>,
    ) -> Result<SmpRequest, SmpError> {
        self.ensure_no_transfer()?;
        let info = inspect_image(&image)?;
        info!(
            "uploading image {} ({} bytes)",
            info.version,
            image.len()
        );

        let sha = file_sha256(&image);
        self.start_upload(Upload {
            target: UploadTarget::Image { sha },
            data: image,
            acked: 0,
            mtu,
        })?;
        self.expected_hash = Some(info.hash);
        self.set_status(FirmwareStatus::Uploading);
        self.next_upload_request()
            .inspect_err(|_| self.abort_transfer())
    }

    /// スロット 1 のイメージを次回起動でテストするよう指示する
    ///
    /// # エラー
    /// - `SmpError::NoImageInSlot`: スロット 1 のハッシュが分からない
    pub fn test_image(&mut self) -> Result<SmpRequest, SmpError> {
        let hash = self.slot_hash(1)?;
        self.command(
            SmpOp::Write,
            SmpGroup::Image,
            header::image::STATE,
            CommandKind::ImageState,
            cbor_map! { "hash" => hash, "confirm" => false },
        )
    }

    /// スロット 0 で動作中のイメージを確定する
    pub fn confirm_image(&mut self) -> Result<SmpRequest, SmpError> {
        let hash = self.slot_hash(0)?;
        self.command(
            SmpOp::Write,
            SmpGroup::Image,
            header::image::STATE,
            CommandKind::ImageState,
            cbor_map! { "hash" => hash, "confirm" => true },
        )
    }

    /// スロット 1 を消去する
    pub fn erase_image(&mut self) -> Result<SmpRequest, SmpError> {
        self.ensure_no_transfer()?;
        let request = self.command(
            SmpOp::Write,
            SmpGroup::Image,
            header::image::ERASE,
            CommandKind::ImageErase,
            cbor_map! {},
        )?;
        self.set_status(FirmwareStatus::Erasing);
        Ok(request)
    }

    /// デバイスを再起動する
    pub fn reset(&mut self) -> Result<SmpRequest, SmpError> {
        self.command(
            SmpOp::Write,
            SmpGroup::Os,
            header::os::RESET,
            CommandKind::Reset,
            cbor_map! {},
        )
    }

    pub fn echo(&mut self, text: &str) -> Result<SmpRequest, SmpError> {
        self.command(
            SmpOp::Write,
            SmpGroup::Os,
            header::os::ECHO,
            CommandKind::Echo,
            cbor_map! { "d" => text },
        )
    }

    pub fn task_stats(&mut self) -> Result<SmpRequest, SmpError> {
        self.command(
            SmpOp::Read,
            SmpGroup::Os,
            header::os::TASK_STATS,
            CommandKind::TaskStats,
            cbor_map! {},
        )
    }

    /// デバイスのファイルシステムにファイルを書き込む
    pub fn upload_file(
        &mut self,
        name: &str,
        data: Vec<u8>,
        mtu: Option<usize>,
    ) -> Result<SmpRequest, SmpError> {
        self.ensure_no_transfer()?;
        if data.is_empty() {
            return Err(SmpError::EmptyData);
        }
        info!("uploading file {} ({} bytes)", name, data.len());
        self.start_upload(Upload {
            target: UploadTarget::File {
                name: String::from(name),
            },
            data,
            acked: 0,
            mtu,
        })?;
        self.next_upload_request()
            .inspect_err(|_| self.abort_transfer())
    }

    /// デバイスのファイルシステムからファイルを読み出す
    pub fn download_file(&mut self, name: &str) -> Result<SmpRequest, SmpError> {
        self.ensure_no_transfer()?;
        info!("downloading file {}", name);
        self.transfer = Some(Transfer::Download(Download {
            name: String::from(name),
            data: Vec::new(),
            total: None,
        }));
        self.download_request()
            .inspect_err(|_| self.abort_transfer())
    }

    /// 進行中の転送を打ち切る（応答待ちのチャンクの応答は捨てられる）
    pub fn cancel_transfer(&mut self) -> Result<(), SmpError> {
        if self.transfer.is_none() {
            return Err(SmpError::NotInProgress);
        }
        info!("SMP transfer cancelled");
        self.abort_transfer();
        Ok(())
    }

    /// 切断時に接続依存の状態を破棄する
    pub fn reset_connection(&mut self) {
        self.accumulator.clear();
        self.pending.clear();
        self.abort_transfer();
        self.expected_hash = None;
        // 完了後の状態読み出しを待っていたアップロードは未検証のまま終わる
        if matches!(
            self.status,
            FirmwareStatus::Erasing | FirmwareStatus::Uploading
        ) {
            self.set_status(FirmwareStatus::Idle);
        }
    }

    // ===== 受信 =====

    /// ピアからの SMP 通知（断片）を処理する
    ///
    /// 1 つの通知に含まれる完全なメッセージはすべて処理する。処理できなかった
    /// 応答は `FirmwareEvent::ResponseRejected` になり、対応する要求は解決済みになる。
    /// 不正なオフセットを返した転送は中止する。
    ///
    /// # 戻り値
    /// 続けて送るべき要求（次のチャンク、完了後の状態読み出しなど）
    pub fn handle(&mut self, fragment: &[u8]) -> Vec<SmpRequest> {
        let mut out = Vec::new();
        for bytes in self.accumulator.push(fragment) {
            match SmpMessage::decode(&bytes) {
                Ok(Some(message)) => out.extend(self.process(message)),
                Ok(None) => warn!("dropping SMP message with unknown op {}", bytes[0]),
                Err(error) => self.reject(None, error),
            }
        }
        out
    }

    fn process(&mut self, message: SmpMessage) -> Vec<SmpRequest> {
        let SmpHeader {
            op,
            group,
            seq,
            command_id,
            ..
        } = message.header;
        if !op.is_response() {
            debug!("ignoring SMP {:?} from peer", op);
            return Vec::new();
        }

        let Some(command) = self.pending.remove(&seq) else {
            warn!("dropping SMP response with unknown seq {}", seq);
            return Vec::new();
        };
        if command.group != group || command.command_id != command_id {
            warn!(
                "SMP response seq {} is {:?}/{}, request was {:?}/{}; dropping",
                seq, group, command_id, command.group, command.command_id
            );
            self.pending.insert(seq, command);
            return Vec::new();
        }

        let id = command.id;
        self.resolve(command, &message.payload).unwrap_or_else(|error| {
            self.reject(Some(id), error);
            Vec::new()
        })
    }

    /// 対応付いた応答を処理する
    fn resolve(
        &mut self,
        command: PendingCommand,
        payload: &Value,
    ) -> Result<Vec<SmpRequest>, SmpError> {
        let group = command.group;
        let command_id = command.command_id;
        let rc = payload.get("rc").and_then(Value::as_i64).unwrap_or(0);
        if rc != 0 {
            warn!("device returned rc {} for {:?}/{}", rc, group, command_id);
            self.events.push(FirmwareEvent::DeviceError {
                id: command.id,
                group,
                command_id,
                rc,
            });
            match command.kind {
                CommandKind::ImageUpload | CommandKind::FileUpload | CommandKind::FileDownload => {
                    self.abort_transfer()
                }
                CommandKind::ImageErase => self.set_status(derive_status(&self.images)),
                _ => {}
            }
            return Ok(Vec::new());
        }

        match command.kind {
            CommandKind::ImageState => {
                self.on_image_state(payload)?;
                Ok(Vec::new())
            }
            CommandKind::ImageUpload | CommandKind::FileUpload => {
                self.on_upload_ack(payload).inspect_err(|_| self.abort_transfer())
            }
            CommandKind::FileDownload => {
                self.on_download_chunk(payload).inspect_err(|_| self.abort_transfer())
            }
            CommandKind::ImageErase => {
                info!("slot 1 erased");
                self.images.retain(|image| image.slot != 1);
                self.events.push(FirmwareEvent::ImageErased);
                self.set_status(FirmwareStatus::Idle);
                Ok(Vec::new())
            }
            CommandKind::Reset => {
                self.events.push(FirmwareEvent::ResetAccepted);
                Ok(Vec::new())
            }
            CommandKind::Echo => {
                let text = payload
                    .get("r")
                    .and_then(Value::as_text)
                    .ok_or(SmpError::MissingField("r"))?;
                self.events.push(FirmwareEvent::Echo {
                    text: String::from(text),
                });
                Ok(Vec::new())
            }
            CommandKind::TaskStats => {
                let tasks = payload
                    .get("tasks")
                    .and_then(Value::as_map)
                    .ok_or(SmpError::MissingField("tasks"))?
                    .iter()
                    .filter_map(|(name, entry)| {
                        name.as_text().map(|name| TaskInfo::from_entry(name, entry))
                    })
                    .collect();
                self.events.push(FirmwareEvent::TaskStats { tasks });
                Ok(Vec::new())
            }
        }
    }

    fn reject(&mut self, id: Option<RequestId>, error: SmpError) {
        warn!("rejected SMP response: {}", error);
        self.events.push(FirmwareEvent::ResponseRejected {
            id,
            reason: error.to_string(),
        });
    }

    fn on_image_state(&mut self, payload: &Value) -> Result<(), SmpError> {
        let images = FirmwareImage::list_from_response(payload)?;
        debug!("image state: {} slots", images.len());
        self.images = images.clone();
        self.events.push(FirmwareEvent::ImagesUpdated { images });
        if self.transfer.is_some() || self.status == FirmwareStatus::Erasing {
            return Ok(());
        }

        if let Some(expected) = self.expected_hash.take() {
            let reported = self
                .images
                .iter()
                .find(|image| image.slot == 1)
                .map(|image| image.hash.as_slice());
            if reported != Some(&expected[..]) {
                warn!("slot 1 hash does not match the uploaded image; upload not verified");
                self.set_status(FirmwareStatus::Idle);
                return Ok(());
            }
            info!("slot 1 hash matches the uploaded image");
        }
        self.set_status(derive_status(&self.images));
        Ok(())
    }

    fn on_upload_ack(&mut self, payload: &Value) -> Result<Vec<SmpRequest>, SmpError> {
        let off = payload
            .get("off")
            .and_then(Value::as_u64)
            .ok_or(SmpError::MissingField("off"))?;
        let Some(Transfer::Upload(upload)) = self.transfer.as_mut() else {
            warn!("upload response without an upload in progress");
            return Ok(Vec::new());
        };

        let total = upload.data.len();
        if off <= upload.acked as u64 || off > total as u64 {
            return Err(SmpError::UnexpectedOffset {
                off,
                acked: upload.acked,
                len: total,
            });
        }
        let offset = off as usize;
        upload.acked = offset;

        let finished = offset == total;
        let file_name = match &upload.target {
            UploadTarget::Image { .. } => None,
            UploadTarget::File { name } => Some(name.clone()),
        };

        match file_name {
            None => {
                self.events
                    .push(FirmwareEvent::UploadProgress { offset, total });
                if finished {
                    info!("image upload finished ({} bytes)", total);
                    self.transfer = None;
                    self.events.push(FirmwareEvent::UploadFinished);
                    if self.config.read_state_after_upload {
                        return Ok(alloc::vec![self.read_image_state()?]);
                    }
                    self.set_status(FirmwareStatus::Idle);
                    return Ok(Vec::new());
                }
            }
            Some(name) => {
                self.events.push(FirmwareEvent::FileProgress {
                    name: name.clone(),
                    offset,
                    total,
                });
                if finished {
                    info!("file {} uploaded", name);
                    self.transfer = None;
                    self.events.push(FirmwareEvent::FileUploaded { name });
                    return Ok(Vec::new());
                }
            }
        }

        Ok(alloc::vec![self.next_upload_request()?])
    }

    fn on_download_chunk(&mut self, payload: &Value) -> Result<Vec<SmpRequest>, SmpError> {
        let off = payload
            .get("off")
            .and_then(Value::as_u64)
            .ok_or(SmpError::MissingField("off"))?;
        let data = payload
            .get("data")
            .and_then(Value::as_bytes)
            .ok_or(SmpError::MissingField("data"))?;
        let Some(Transfer::Download(download)) = self.transfer.as_mut() else {
            warn!("download response without a download in progress");
            return Ok(Vec::new());
        };

        if let Some(len) = payload.get("len").and_then(Value::as_u64) {
            download.total = Some(len as usize);
        }
        let total = download.total.ok_or(SmpError::MissingField("len"))?;
        let received = download.data.len();
        let end = received + data.len();
        if off != received as u64 || end > total || (data.is_empty() && end < total) {
            return Err(SmpError::UnexpectedOffset {
                off,
                acked: received,
                len: total,
            });
        }

        download.data.extend_from_slice(data);
        let name = download.name.clone();
        self.events.push(FirmwareEvent::FileProgress {
            name: name.clone(),
            offset: end,
            total,
        });

        if end == total {
            info!("file {} downloaded ({} bytes)", name, total);
            if let Some(Transfer::Download(download)) = self.transfer.take() {
                self.events.push(FirmwareEvent::FileDownloaded {
                    name,
                    data: download.data,
                });
            }
            return Ok(Vec::new());
        }
        Ok(alloc::vec![self.download_request()?])
    }

    // ===== Private メソッド =====

    fn command(
        &mut self,
        op: SmpOp,
        group: SmpGroup,
        command_id: u8,
        kind: CommandKind,
        payload: Value,
    ) -> Result<SmpRequest, SmpError> {
        let seq = self.seq;
        let bytes = SmpMessage::new(op, group, command_id, seq, payload).encode()?;
        self.seq = self.seq.wrapping_add(1);
        let id = RequestId::next(&mut self.next_id);

        let previous = self.pending.insert(
            seq,
            PendingCommand {
                id,
                group,
                command_id,
                kind,
            },
        );
        if let Some(previous) = previous {
            warn!("seq {} reused; request {:?} will never resolve", seq, previous.id);
        }

        debug!("SMP {:?} {:?}/{} seq {}", op, group, command_id, seq);
        Ok(SmpRequest { id, bytes })
    }

    fn ensure_no_transfer(&self) -> Result<(), SmpError> {
        if self.transfer.is_some() {
            Err(SmpError::TransferInProgress)
        } else {
            Ok(())
        }
    }

    /// 最初のチャンクが作れることを確かめてから転送を始める
    fn start_upload(&mut self, upload: Upload) -> Result<(), SmpError> {
        let envelope = to_vec(&chunk_payload(&upload, 0, &[]))?.len();
        chunk_capacity(&self.config, upload.mtu, envelope)?;
        self.transfer = Some(Transfer::Upload(upload));
        Ok(())
    }

    /// ACK 済みオフセットから次のチャンクを作る
    ///
    /// チャンク長 = MTU - CBOR 外枠 - SMP ヘッダー - 固定オーバーヘッド
    fn next_upload_request(&mut self) -> Result<SmpRequest, SmpError> {
        let Some(Transfer::Upload(upload)) = self.transfer.as_ref() else {
            return Err(SmpError::NotInProgress);
        };

        let offset = upload.acked;
        let remaining = upload.data.len() - offset;
        let envelope = to_vec(&chunk_payload(upload, offset, &[]))?.len();
        let chunk_len = chunk_capacity(&self.config, upload.mtu, envelope)?.min(remaining);
        let payload = chunk_payload(upload, offset, &upload.data[offset..offset + chunk_len]);

        let (group, command_id, kind) = match upload.target {
            UploadTarget::Image { .. } => {
                (SmpGroup::Image, header::image::UPLOAD, CommandKind::ImageUpload)
            }
            UploadTarget::File { .. } => (SmpGroup::Fs, header::fs::FILE, CommandKind::FileUpload),
        };
        debug!("chunk {}..{}", offset, offset + chunk_len);
        self.command(SmpOp::Write, group, command_id, kind, payload)
    }

    fn download_request(&mut self) -> Result<SmpRequest, SmpError> {
        let Some(Transfer::Download(download)) = self.transfer.as_ref() else {
            return Err(SmpError::NotInProgress);
        };
        let payload = cbor_map! {
            "off" => download.data.len(),
            "name" => download.name.as_str(),
        };
        self.command(
            SmpOp::Read,
            SmpGroup::Fs,
            header::fs::FILE,
            CommandKind::FileDownload,
            payload,
        )
    }

    fn abort_transfer(&mut self) {
        let Some(transfer) = self.transfer.take() else {
            return;
        };
        if let Transfer::Upload(Upload {
            target: UploadTarget::Image { .. },
            ..
        }) = transfer
        {
            self.expected_hash = None;
        }
        if self.status == FirmwareStatus::Uploading {
            self.set_status(derive_status(&self.images));
        }
    }

    fn slot_hash(&self, slot: u32) -> Result<Vec<u8>, SmpError> {
        self.images
            .iter()
            .find(|image| image.slot == slot && !image.hash.is_empty())
            .map(|image| image.hash.clone())
            .ok_or(SmpError::NoImageInSlot { slot })
    }

    fn set_status(&mut self, status: FirmwareStatus) {
        if status != self.status {
            info!("firmware status {:?} -> {:?}", self.status, status);
            self.status = status;
            self.events.push(FirmwareEvent::StatusChanged { status });
        }
    }
}

impl Default for SmpEngine {
    fn default() -> Self {
        Self::new(SmpConfig::default())
    }
}

/// アップロード 1 チャンク分の CBOR マップ
///
/// 初回（`offset == 0`）だけ `len` を載せる。イメージは初回に `sha`、
/// ファイルは毎回 `name` を載せる。
fn chunk_payload(upload: &Upload, offset: usize, data: &[u8]) -> Value {
    let mut map = cbor_map! { "off" => offset, "data" => data };
    match &upload.target {
        UploadTarget::Image { sha } => {
            if offset == 0 {
                map.insert("len", upload.data.len());
                map.insert("sha", &sha[..]);
            }
        }
        UploadTarget::File { name } => {
            map.insert("name", name.as_str());
            if offset == 0 {
                map.insert("len", upload.data.len());
            }
        }
    }
    map
}

/// 1 チャンクに載せられるデータ長
fn chunk_capacity(
    config: &SmpConfig,
    mtu: Option<usize>,
    envelope_len: usize,
) -> Result<usize, SmpError> {
    let Some(mtu) = mtu else {
        return Ok(config.max_chunk_size);
    };
    let overhead = envelope_len + SmpHeader::LEN + config.fixed_overhead;
    if mtu <= overhead {
        return Err(SmpError::MtuTooSmall { mtu, overhead });
    }
    Ok(mtu - overhead)
}
