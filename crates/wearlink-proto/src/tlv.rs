//! TLV（type-length-value）フレームのエンコード/デコード
//!
//! ## Wire Format
//! ```text
//! [type_index: u8][length: 1 or 2 bytes LE][payload: length bytes]
//! ```
//!
//! 外側のリクエスト/レスポンスは 2 バイト長、センサー種別ごとの内側ペイロードは
//! 1 バイト長を使う。幅は常に引数で渡す。

use alloc::vec::Vec;

use crate::catalog::Catalog;
use crate::error::ProtoError;

/// 長さフィールドの幅
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    /// 1 バイト（最大 255）
    One,
    /// 2 バイト little-endian（最大 65535）
    Two,
}

impl LengthWidth {
    /// 長さフィールドのバイト数
    pub const fn bytes(self) -> usize {
        match self {
            LengthWidth::One => 1,
            LengthWidth::Two => 2,
        }
    }

    /// 表現できる最大ペイロード長
    pub const fn max_len(self) -> usize {
        match self {
            LengthWidth::One => u8::MAX as usize,
            LengthWidth::Two => u16::MAX as usize,
        }
    }

    /// フレームヘッダー長（型インデックス 1 バイト + 長さフィールド）
    pub const fn header_len(self) -> usize {
        1 + self.bytes()
    }
}

/// 1 フレームをエンコードする
///
/// # エラー
/// - `ProtoError::PayloadTooLong`: ペイロードが長さフィールドで表現できない
pub fn encode_frame(
    type_index: u8,
    payload: &[u8],
    width: LengthWidth,
) -> Result<Vec<u8>, ProtoError> {
    let mut frame = Vec::with_capacity(width.header_len() + payload.len());
    encode_frame_into(&mut frame, type_index, payload, width)?;
    Ok(frame)
}

/// 既存のバッファ末尾に 1 フレームを書き込む
pub fn encode_frame_into(
    out: &mut Vec<u8>,
    type_index: u8,
    payload: &[u8],
    width: LengthWidth,
) -> Result<(), ProtoError> {
    if payload.len() > width.max_len() {
        return Err(ProtoError::PayloadTooLong {
            len: payload.len(),
            max: width.max_len(),
        });
    }

    out.push(type_index);
    match width {
        LengthWidth::One => out.push(payload.len() as u8),
        LengthWidth::Two => out.extend_from_slice(&(payload.len() as u16).to_le_bytes()),
    }
    out.extend_from_slice(payload);
    Ok(())
}

/// バッファ先頭から末尾までフレームを順に読み出し、`on_frame` に渡す
///
/// 型インデックスはカタログ `C` で解決する。
///
/// # エラー
/// - `ProtoError::UnknownMessageType`: カタログ範囲外のインデックス
/// - `ProtoError::Truncated`: ヘッダーまたはペイロードがバッファ終端を越える
///
/// エラーの時点までに読んだフレームはすでに `on_frame` に渡されている。
pub fn decode_frames<'a, C, F>(
    buffer: &'a [u8],
    width: LengthWidth,
    mut on_frame: F,
) -> Result<(), ProtoError>
where
    C: Catalog,
    F: FnMut(C, &'a [u8]),
{
    let mut offset = 0;
    while offset < buffer.len() {
        let header_len = width.header_len();
        if buffer.len() - offset < header_len {
            return Err(ProtoError::Truncated {
                offset,
                needed: header_len,
                available: buffer.len() - offset,
            });
        }

        let index = buffer[offset];
        let message_type =
            C::from_index(index).ok_or(ProtoError::UnknownMessageType { index })?;

        let len = match width {
            LengthWidth::One => buffer[offset + 1] as usize,
            LengthWidth::Two => {
                u16::from_le_bytes([buffer[offset + 1], buffer[offset + 2]]) as usize
            }
        };
        offset += header_len;

        if buffer.len() - offset < len {
            return Err(ProtoError::Truncated {
                offset,
                needed: len,
                available: buffer.len() - offset,
            });
        }

        on_frame(message_type, &buffer[offset..offset + len]);
        offset += len;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::sensor::SensorType;

    #[test]
    fn test_encode_two_byte_length() {
        let frame = encode_frame(3, &[0xAA, 0xBB], LengthWidth::Two).unwrap();
        assert_eq!(frame, alloc::vec![3, 2, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn test_encode_one_byte_length() {
        let frame = encode_frame(1, &[7, 8, 9], LengthWidth::One).unwrap();
        assert_eq!(frame, alloc::vec![1, 3, 7, 8, 9]);
    }

    #[test]
    fn test_encode_length_is_little_endian() {
        let payload = alloc::vec![0u8; 0x0102];
        let frame = encode_frame(0, &payload, LengthWidth::Two).unwrap();
        assert_eq!(&frame[..3], &[0, 0x02, 0x01]);
        assert_eq!(frame.len(), 3 + 0x0102);
    }

    #[test]
    fn test_encode_payload_too_long() {
        let payload = alloc::vec![0u8; 256];
        let result = encode_frame(0, &payload, LengthWidth::One);
        assert_eq!(
            result,
            Err(ProtoError::PayloadTooLong { len: 256, max: 255 })
        );
    }

    #[test]
    fn test_decode_preserves_order_and_payloads() {
        let mut buffer = Vec::new();
        encode_frame_into(&mut buffer, MessageType::GetName.index(), b"sole", LengthWidth::Two)
            .unwrap();
        encode_frame_into(&mut buffer, MessageType::IsCharging.index(), &[1], LengthWidth::Two)
            .unwrap();
        encode_frame_into(&mut buffer, MessageType::GetMtu.index(), &[], LengthWidth::Two)
            .unwrap();

        let mut frames = Vec::new();
        decode_frames::<MessageType, _>(&buffer, LengthWidth::Two, |t, p| {
            frames.push((t, p.to_vec()))
        })
        .unwrap();

        assert_eq!(
            frames,
            alloc::vec![
                (MessageType::GetName, b"sole".to_vec()),
                (MessageType::IsCharging, alloc::vec![1]),
                (MessageType::GetMtu, alloc::vec![]),
            ]
        );
    }

    #[test]
    fn test_decode_one_byte_width_with_sensor_catalog() {
        let mut buffer = Vec::new();
        encode_frame_into(&mut buffer, SensorType::Pressure.index(), &[1, 2], LengthWidth::One)
            .unwrap();
        encode_frame_into(&mut buffer, SensorType::Gyroscope.index(), &[3], LengthWidth::One)
            .unwrap();

        let mut types = Vec::new();
        decode_frames::<SensorType, _>(&buffer, LengthWidth::One, |t, _| types.push(t)).unwrap();
        assert_eq!(types, alloc::vec![SensorType::Pressure, SensorType::Gyroscope]);
    }

    #[test]
    fn test_decode_unknown_type_index() {
        let buffer = [0xF0, 0x00, 0x00];
        let result = decode_frames::<MessageType, _>(&buffer, LengthWidth::Two, |_, _| {});
        assert_eq!(result, Err(ProtoError::UnknownMessageType { index: 0xF0 }));
    }

    #[test]
    fn test_decode_truncated_payload() {
        // 長さ 5 と宣言しているが 2 バイトしかない
        let buffer = [0x00, 0x05, 0x00, 0xAA, 0xBB];
        let result = decode_frames::<MessageType, _>(&buffer, LengthWidth::Two, |_, _| {});
        assert_eq!(
            result,
            Err(ProtoError::Truncated { offset: 3, needed: 5, available: 2 })
        );
    }

    #[test]
    fn test_decode_truncated_header() {
        let buffer = [0x00, 0x01];
        let result = decode_frames::<MessageType, _>(&buffer, LengthWidth::Two, |_, _| {});
        assert!(matches!(result, Err(ProtoError::Truncated { offset: 0, .. })));
    }

    #[test]
    fn test_decode_empty_buffer_yields_nothing() {
        let mut count = 0;
        decode_frames::<MessageType, _>(&[], LengthWidth::Two, |_, _| count += 1).unwrap();
        assert_eq!(count, 0);
    }
}
