//! センサーデータペイロードの分割
//!
//! ## Wire Format（`MessageType::SensorData` のペイロード）
//! ```text
//! [timestamp: u16 LE]
//! [sensor_type: u8][length: u8][readings...]   ← センサー種別ごとに繰り返し
//! ```
//!
//! 単位変換や圧力中心の計算はここでは扱わない。生のバイト列を種別ごとに切り出すだけ。

use alloc::vec::Vec;

use crate::error::ProtoError;
use crate::tlv::{decode_frames, LengthWidth};

catalog! {
    /// センサー種別（内側フレームの型インデックス）
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub enum SensorType {
        Pressure,
        Acceleration,
        Gravity,
        LinearAcceleration,
        Gyroscope,
        Magnetometer,
        GameRotation,
        Rotation,
        Orientation,
        Activity,
        StepCounter,
        StepDetector,
        DeviceOrientation,
        Barometer,
    }
}

/// センサーデータのタイムスタンプ（16ビット、ミリ秒の下位16ビット）
///
/// ピアはミリ秒時計の下位 16 ビットだけを送ってくる。
/// オーバーフローは mod 2^16 として扱う（約 65 秒で一周）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SensorTimestamp(pub u16);

impl SensorTimestamp {
    /// ミリ秒の時刻から SensorTimestamp を生成する
    pub fn from_ms(ms: u64) -> Self {
        SensorTimestamp((ms & 0xFFFF) as u16)
    }

    /// 2 つのタイムスタンプの差を計算する（newer - older）
    ///
    /// ラップアラウンドを考慮した差分。結果は 0〜65535 ms。
    pub fn diff(newer: Self, older: Self) -> u16 {
        newer.0.wrapping_sub(older.0)
    }

    /// 生の u16 値を返す
    pub fn raw(&self) -> u16 {
        self.0
    }

    /// 直前の完全な時刻を基準に、このタイムスタンプを完全なミリ秒時刻に展開する
    ///
    /// `reference_ms` 以降で下位 16 ビットが一致する最初の時刻を返す。
    pub fn unwrap_after(&self, reference_ms: u64) -> u64 {
        let delta = SensorTimestamp::diff(*self, SensorTimestamp::from_ms(reference_ms));
        reference_ms + delta as u64
    }
}

impl From<u16> for SensorTimestamp {
    fn from(val: u16) -> Self {
        SensorTimestamp(val)
    }
}

/// 分割済みのセンサーデータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorData<'a> {
    pub timestamp: SensorTimestamp,
    /// センサー種別ごとの生データ（受信順）
    pub readings: Vec<(SensorType, &'a [u8])>,
}

/// `SensorData` メッセージのペイロードを分割する
///
/// # エラー
/// - `ProtoError::Truncated`: タイムスタンプがない、または内側フレームが途中で切れている
/// - `ProtoError::UnknownMessageType`: 未知のセンサー種別
pub fn parse_sensor_data(payload: &[u8]) -> Result<SensorData<'_>, ProtoError> {
    if payload.len() < 2 {
        return Err(ProtoError::Truncated {
            offset: 0,
            needed: 2,
            available: payload.len(),
        });
    }

    let timestamp = SensorTimestamp(u16::from_le_bytes([payload[0], payload[1]]));
    let mut readings = Vec::new();
    decode_frames::<SensorType, _>(&payload[2..], LengthWidth::One, |sensor_type, data| {
        readings.push((sensor_type, data))
    })?;

    Ok(SensorData {
        timestamp,
        readings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::tlv::encode_frame_into;

    #[test]
    fn test_timestamp_from_ms() {
        assert_eq!(SensorTimestamp::from_ms(1000).raw(), 1000u16);
    }

    #[test]
    fn test_timestamp_wraps() {
        assert_eq!(SensorTimestamp::from_ms(65536).raw(), 0u16);
        assert_eq!(SensorTimestamp::from_ms(65537).raw(), 1u16);
    }

    #[test]
    fn test_timestamp_diff_wraparound() {
        let older = SensorTimestamp(65000);
        let newer = SensorTimestamp(100); // 65536 - 65000 + 100 = 636 ms 経過
        assert_eq!(SensorTimestamp::diff(newer, older), 636);
    }

    #[test]
    fn test_unwrap_after_crosses_boundary() {
        let reference_ms = 3 * 65536 + 65000;
        let ts = SensorTimestamp(100);
        assert_eq!(ts.unwrap_after(reference_ms), reference_ms + 636);
    }

    #[test]
    fn test_parse_sensor_data() {
        let mut payload = alloc::vec![0x10, 0x27]; // 10000 ms
        encode_frame_into(&mut payload, SensorType::Pressure.index(), &[1, 2, 3, 4], LengthWidth::One)
            .unwrap();
        encode_frame_into(&mut payload, SensorType::Acceleration.index(), &[5, 6], LengthWidth::One)
            .unwrap();

        let data = parse_sensor_data(&payload).unwrap();
        assert_eq!(data.timestamp.raw(), 10000);
        assert_eq!(
            data.readings,
            alloc::vec![
                (SensorType::Pressure, &[1u8, 2, 3, 4][..]),
                (SensorType::Acceleration, &[5u8, 6][..]),
            ]
        );
    }

    #[test]
    fn test_parse_sensor_data_without_timestamp() {
        assert!(matches!(
            parse_sensor_data(&[0x01]),
            Err(ProtoError::Truncated { .. })
        ));
    }

    #[test]
    fn test_parse_sensor_data_unknown_sensor() {
        let payload = [0x00, 0x00, 0xEE, 0x00];
        assert_eq!(
            parse_sensor_data(&payload),
            Err(ProtoError::UnknownMessageType { index: 0xEE })
        );
    }
}
