//! 外側プロトコルのメッセージ種別カタログと送信メッセージ

use alloc::vec::Vec;

use crate::catalog::Catalog;
use crate::error::ProtoError;
use crate::tlv::{encode_frame, LengthWidth};

/// メッセージを処理するサブプロトコル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubProtocol {
    /// デバイス情報（バッテリー、名前、種別、時刻、MTU）
    Information,
    /// センサー設定
    SensorConfiguration,
    /// センサーデータ
    SensorData,
    /// 振動モーター
    Vibration,
    /// ファイル転送
    FileTransfer,
    /// SMP（mcumgr）ファームウェア管理
    Smp,
}

catalog! {
    /// 外側プロトコルのメッセージ種別（宣言順 = 型インデックス）
    ///
    /// `Get*` はピアからの現在値の報告にも使われる。`Set*` 要求への応答も
    /// 対応する `Get*` 種別で返ってくる。
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub enum MessageType {
        IsCharging,
        GetBatteryCurrent,
        GetMtu,
        GetId,
        GetName,
        SetName,
        GetType,
        SetType,
        GetCurrentTime,
        SetCurrentTime,
        GetSensorConfiguration,
        SetSensorConfiguration,
        GetPressurePositions,
        GetSensorScalars,
        SensorData,
        TriggerVibration,
        GetVibrationLocations,
        GetMaxFileLength,
        GetFileType,
        SetFileType,
        GetFileLength,
        SetFileLength,
        GetFileChecksum,
        SetFileChecksum,
        SetFileTransferCommand,
        GetFileTransferStatus,
        GetFileBlock,
        SetFileBlock,
        FileBytesTransferred,
        SmpMessage,
    }
}

impl MessageType {
    /// このメッセージを処理するサブプロトコル
    pub fn sub_protocol(self) -> SubProtocol {
        use MessageType::*;
        match self {
            IsCharging | GetBatteryCurrent | GetMtu | GetId | GetName | SetName | GetType
            | SetType | GetCurrentTime | SetCurrentTime => SubProtocol::Information,
            GetSensorConfiguration | SetSensorConfiguration => SubProtocol::SensorConfiguration,
            GetPressurePositions | GetSensorScalars | SensorData => SubProtocol::SensorData,
            TriggerVibration | GetVibrationLocations => SubProtocol::Vibration,
            GetMaxFileLength | GetFileType | SetFileType | GetFileLength | SetFileLength
            | GetFileChecksum | SetFileChecksum | SetFileTransferCommand
            | GetFileTransferStatus | GetFileBlock | SetFileBlock | FileBytesTransferred => {
                SubProtocol::FileTransfer
            }
            SmpMessage => SubProtocol::Smp,
        }
    }
}

/// 送信待ちメッセージ
///
/// 各サブプロトコルが生成し、接続マネージャーのキューに積まれ、
/// flush 時に一度だけ消費される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMessage {
    pub message_type: MessageType,
    pub data: Option<Vec<u8>>,
}

impl TxMessage {
    /// ペイロードなしのメッセージ（Get 要求など）
    pub fn new(message_type: MessageType) -> Self {
        TxMessage {
            message_type,
            data: None,
        }
    }

    /// ペイロード付きのメッセージ
    pub fn with_data(message_type: MessageType, data: Vec<u8>) -> Self {
        TxMessage {
            message_type,
            data: Some(data),
        }
    }

    /// ペイロード（なければ空スライス）
    pub fn payload(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// 外側フレーム（2 バイト長）にエンコードしたときのバイト数
    pub fn frame_len(&self) -> usize {
        LengthWidth::Two.header_len() + self.payload().len()
    }

    /// 外側フレーム（2 バイト長）にエンコードする
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        encode_frame(self.message_type.index(), self.payload(), LengthWidth::Two)
    }
}
