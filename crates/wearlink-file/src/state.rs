//! ファイル転送の状態とワイヤ上の値

use alloc::vec::Vec;

use wearlink_proto::ProtoError;

/// 転送状態（ピアが `GetFileTransferStatus` で報告する値と同じ）
///
/// 向きはホストから見たもの。`Sending` はホスト → ピア。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileTransferStatus {
    #[default]
    Idle,
    Sending,
    Receiving,
}

impl FileTransferStatus {
    pub fn from_byte(byte: u8) -> Result<Self, ProtoError> {
        match byte {
            0 => Ok(FileTransferStatus::Idle),
            1 => Ok(FileTransferStatus::Sending),
            2 => Ok(FileTransferStatus::Receiving),
            _ => Err(ProtoError::InvalidValue {
                field: "file transfer status",
                value: byte as u32,
            }),
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// `SetFileTransferCommand` のペイロード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTransferCommand {
    Send,
    Receive,
    Cancel,
}

impl FileTransferCommand {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// このコマンドを受けたピアが報告するはずの状態
    pub fn expected_status(self) -> FileTransferStatus {
        match self {
            FileTransferCommand::Send => FileTransferStatus::Sending,
            FileTransferCommand::Receive => FileTransferStatus::Receiving,
            FileTransferCommand::Cancel => FileTransferStatus::Idle,
        }
    }
}

/// 接続ごとの転送状態
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTransferState {
    pub status: FileTransferStatus,
    pub file_type: u8,
    /// 送信時は送るファイルの長さ、受信時はピアが宣言した長さ
    pub length: u32,
    pub checksum: u32,
    /// 送信は ACK 済み、受信は受信済みのバイト数
    pub bytes_transferred: usize,
    pub received_blocks: Vec<Vec<u8>>,
}

impl FileTransferState {
    pub fn is_idle(&self) -> bool {
        self.status == FileTransferStatus::Idle
    }

    /// 受信済みブロックを連結する
    pub fn reassemble(&self) -> Vec<u8> {
        self.received_blocks.concat()
    }
}

/// ピアが最後に報告したファイル情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerFileInfo {
    pub max_file_length: Option<u32>,
    pub file_type: Option<u8>,
    pub length: Option<u32>,
    pub checksum: Option<u32>,
}

impl PeerFileInfo {
    /// ピアがすでに同じファイルを持っているか
    pub fn has_file(&self, file_type: u8, length: u32, checksum: u32) -> bool {
        self.file_type == Some(file_type)
            && self.length == Some(length)
            && self.checksum == Some(checksum)
    }
}

pub(crate) fn read_u8(payload: &[u8]) -> Result<u8, ProtoError> {
    payload.first().copied().ok_or(ProtoError::Truncated {
        offset: 0,
        needed: 1,
        available: 0,
    })
}

pub(crate) fn read_u32_le(payload: &[u8]) -> Result<u32, ProtoError> {
    match payload.get(..4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(ProtoError::Truncated {
            offset: 0,
            needed: 4,
            available: payload.len(),
        }),
    }
}
