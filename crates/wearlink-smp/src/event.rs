//! ファームウェア更新イベント

use alloc::string::String;
use alloc::vec::Vec;

use wearlink_cbor::Value;
use wearlink_proto::RequestId;

use crate::header::SmpGroup;
use crate::slots::{FirmwareImage, FirmwareStatus};

/// OS タスク統計の 1 タスク分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TaskInfo {
    pub name: String,
    pub priority: u64,
    pub task_id: u64,
    pub state: u64,
    pub stack_used: u64,
    pub stack_size: u64,
    pub context_switches: u64,
    pub runtime: u64,
}

impl TaskInfo {
    /// `tasks` マップの 1 エントリから読み取る（欠けた数値は 0）
    pub fn from_entry(name: &str, value: &Value) -> Self {
        let field = |key: &str| value.get(key).and_then(Value::as_u64).unwrap_or(0);
        TaskInfo {
            name: String::from(name),
            priority: field("prio"),
            task_id: field("tid"),
            state: field("state"),
            stack_used: field("stkuse"),
            stack_size: field("stksiz"),
            context_switches: field("cswcnt"),
            runtime: field("runtime"),
        }
    }
}

/// エンジンからホストへの通知
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "camelCase"))]
pub enum FirmwareEvent {
    /// 派生状態が変わった
    StatusChanged { status: FirmwareStatus },
    /// イメージ状態（スロット表）を受け取った
    ImagesUpdated { images: Vec<FirmwareImage> },
    UploadProgress { offset: usize, total: usize },
    /// イメージアップロード完了（1 回のアップロードにつき 1 度だけ）
    UploadFinished,
    ImageErased,
    ResetAccepted,
    Echo { text: String },
    TaskStats { tasks: Vec<TaskInfo> },
    FileProgress {
        name: String,
        offset: usize,
        total: usize,
    },
    FileUploaded { name: String },
    FileDownloaded { name: String, data: Vec<u8> },
    /// デバイスが非 0 の `rc` を返した
    DeviceError {
        id: RequestId,
        group: SmpGroup,
        command_id: u8,
        rc: i64,
    },
    /// 応答を処理できなかった（壊れた CBOR、欠けたフィールド、不正なオフセット）
    ///
    /// `id` はヘッダーすら読めなかった場合 `None`。
    ResponseRejected {
        id: Option<RequestId>,
        reason: String,
    },
}
