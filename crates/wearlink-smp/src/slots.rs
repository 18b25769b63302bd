//! デバイスのイメージスロット表とファームウェア状態

use alloc::string::String;
use alloc::vec::Vec;

use wearlink_cbor::Value;

use crate::error::SmpError;

/// イメージ状態応答の 1 スロット分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FirmwareImage {
    pub image: u32,
    pub slot: u32,
    pub active: bool,
    pub confirmed: bool,
    pub pending: bool,
    pub permanent: bool,
    pub bootable: bool,
    pub version: String,
    pub hash: Vec<u8>,
    pub empty: bool,
}

impl FirmwareImage {
    /// `images` 配列の要素から読み取る（真偽値フィールドは省略時 false）
    pub fn from_value(value: &Value) -> Result<Self, SmpError> {
        let flag = |key: &str| value.get(key).and_then(Value::as_bool).unwrap_or(false);
        let slot = value
            .get("slot")
            .and_then(Value::as_u64)
            .ok_or(SmpError::MissingField("slot"))?;

        Ok(FirmwareImage {
            image: value.get("image").and_then(Value::as_u64).unwrap_or(0) as u32,
            slot: slot as u32,
            active: flag("active"),
            confirmed: flag("confirmed"),
            pending: flag("pending"),
            permanent: flag("permanent"),
            bootable: flag("bootable"),
            version: value
                .get("version")
                .and_then(Value::as_text)
                .map(String::from)
                .unwrap_or_default(),
            hash: value
                .get("hash")
                .and_then(Value::as_bytes)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
            empty: flag("empty"),
        })
    }

    /// イメージ状態応答からスロット表を読み取る
    pub fn list_from_response(payload: &Value) -> Result<Vec<Self>, SmpError> {
        payload
            .get("images")
            .and_then(Value::as_array)
            .ok_or(SmpError::MissingField("images"))?
            .iter()
            .map(FirmwareImage::from_value)
            .collect()
    }
}

/// ファームウェア更新の状態（デバイスには送られない、ホスト側の派生状態）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FirmwareStatus {
    #[default]
    Idle,
    Uploading,
    /// スロット 1 に起動可能な未確定イメージがある
    Uploaded,
    /// スロット 0 のイメージがテスト起動中（未確定）
    Testing,
    /// スロット 1 が次回起動予定
    Pending,
    Erasing,
}

/// 2 スロット表から状態を決める
pub fn derive_status(images: &[FirmwareImage]) -> FirmwareStatus {
    let slot = |n: u32| images.iter().find(|image| image.slot == n);

    if slot(0).is_some_and(|primary| !primary.confirmed) {
        return FirmwareStatus::Testing;
    }
    match slot(1) {
        Some(secondary) if secondary.pending => FirmwareStatus::Pending,
        Some(secondary) if secondary.bootable && !secondary.confirmed && !secondary.empty => {
            FirmwareStatus::Uploaded
        }
        _ => FirmwareStatus::Idle,
    }
}
