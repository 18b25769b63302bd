//! SMP ヘッダーとメッセージ
//!
//! ## Wire Format
//! ```text
//! [op: u8][flags: u8][length: u16 BE][group: u16 BE][seq: u8][command_id: u8]
//! ```

use alloc::vec::Vec;

use wearlink_cbor::{from_slice, Encoder, Value};

use crate::error::SmpError;

/// SMP オペレーション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SmpOp {
    Read,
    ReadRsp,
    Write,
    WriteRsp,
}

impl SmpOp {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SmpOp::Read),
            1 => Some(SmpOp::ReadRsp),
            2 => Some(SmpOp::Write),
            3 => Some(SmpOp::WriteRsp),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// 要求に対する応答のオペレーション
    pub fn response(self) -> Self {
        match self {
            SmpOp::Read | SmpOp::ReadRsp => SmpOp::ReadRsp,
            SmpOp::Write | SmpOp::WriteRsp => SmpOp::WriteRsp,
        }
    }

    pub fn is_response(self) -> bool {
        matches!(self, SmpOp::ReadRsp | SmpOp::WriteRsp)
    }
}

/// SMP 管理グループ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SmpGroup {
    Os,
    Image,
    Stat,
    Config,
    Log,
    Crash,
    Split,
    Run,
    Fs,
    Shell,
    /// 未知のグループ ID（受信メッセージで保持する）
    Other(u16),
}

impl SmpGroup {
    pub fn from_id(id: u16) -> Self {
        match id {
            0 => SmpGroup::Os,
            1 => SmpGroup::Image,
            2 => SmpGroup::Stat,
            3 => SmpGroup::Config,
            4 => SmpGroup::Log,
            5 => SmpGroup::Crash,
            6 => SmpGroup::Split,
            7 => SmpGroup::Run,
            8 => SmpGroup::Fs,
            9 => SmpGroup::Shell,
            other => SmpGroup::Other(other),
        }
    }

    pub fn id(self) -> u16 {
        match self {
            SmpGroup::Os => 0,
            SmpGroup::Image => 1,
            SmpGroup::Stat => 2,
            SmpGroup::Config => 3,
            SmpGroup::Log => 4,
            SmpGroup::Crash => 5,
            SmpGroup::Split => 6,
            SmpGroup::Run => 7,
            SmpGroup::Fs => 8,
            SmpGroup::Shell => 9,
            SmpGroup::Other(id) => id,
        }
    }
}

/// OS グループのコマンド ID
pub mod os {
    pub const ECHO: u8 = 0;
    pub const TASK_STATS: u8 = 2;
    pub const RESET: u8 = 5;
}

/// Image グループのコマンド ID
pub mod image {
    pub const STATE: u8 = 0;
    pub const UPLOAD: u8 = 1;
    pub const ERASE: u8 = 5;
}

/// FS グループのコマンド ID
pub mod fs {
    pub const FILE: u8 = 0;
}

/// SMP ヘッダー（8 バイト）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmpHeader {
    pub op: SmpOp,
    pub flags: u8,
    /// 続く CBOR ペイロードのバイト数
    pub length: u16,
    pub group: SmpGroup,
    pub seq: u8,
    pub command_id: u8,
}

impl SmpHeader {
    pub const LEN: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let length = self.length.to_be_bytes();
        let group = self.group.id().to_be_bytes();
        [
            self.op.to_byte(),
            self.flags,
            length[0],
            length[1],
            group[0],
            group[1],
            self.seq,
            self.command_id,
        ]
    }

    /// 先頭 8 バイトからヘッダーを復元する
    ///
    /// 未知の op は `None`。
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<Self>, SmpError> {
        if bytes.len() < Self::LEN {
            return Err(SmpError::Truncated { len: bytes.len() });
        }
        let Some(op) = SmpOp::from_byte(bytes[0]) else {
            return Ok(None);
        };
        Ok(Some(SmpHeader {
            op,
            flags: bytes[1],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
            group: SmpGroup::from_id(u16::from_be_bytes([bytes[4], bytes[5]])),
            seq: bytes[6],
            command_id: bytes[7],
        }))
    }

    /// ヘッダーが宣言するメッセージ全体の長さ（バイト列の先頭から読む）
    pub fn total_len(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < 4 {
            return None;
        }
        Some(u16::from_be_bytes([bytes[2], bytes[3]]) as usize + Self::LEN)
    }
}

/// ヘッダー + CBOR ペイロード
#[derive(Debug, Clone, PartialEq)]
pub struct SmpMessage {
    pub header: SmpHeader,
    pub payload: Value,
}

impl SmpMessage {
    /// 送信用メッセージを作る（length はエンコード時に決まる）
    pub fn new(op: SmpOp, group: SmpGroup, command_id: u8, seq: u8, payload: Value) -> Self {
        SmpMessage {
            header: SmpHeader {
                op,
                flags: 0,
                length: 0,
                group,
                seq,
                command_id,
            },
            payload,
        }
    }

    /// ヘッダーと CBOR ペイロードをエンコードする
    ///
    /// # エラー
    /// - `SmpError::BodyTooLong`: CBOR 本体が 65535 バイトを超える
    pub fn encode(&self) -> Result<Vec<u8>, SmpError> {
        let mut encoder = Encoder::new();
        encoder.encode(&self.payload)?;
        let body = encoder.into_bytes();

        let length = u16::try_from(body.len())
            .map_err(|_| SmpError::BodyTooLong { len: body.len() })?;
        let header = SmpHeader {
            length,
            ..self.header
        };
        let mut bytes = Vec::with_capacity(SmpHeader::LEN + body.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// 完全な 1 メッセージをデコードする
    ///
    /// 未知の op は `Ok(None)`。空のペイロードは空マップとして扱う。
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>, SmpError> {
        let Some(header) = SmpHeader::from_bytes(bytes)? else {
            return Ok(None);
        };
        let end = SmpHeader::LEN + header.length as usize;
        if bytes.len() < end {
            return Err(SmpError::Truncated { len: bytes.len() });
        }
        let body = &bytes[SmpHeader::LEN..end];
        let payload = if body.is_empty() {
            Value::Map(Vec::new())
        } else {
            from_slice(body)?
        };
        Ok(Some(SmpMessage { header, payload }))
    }
}
