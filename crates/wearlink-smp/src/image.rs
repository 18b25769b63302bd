//! MCUboot イメージヘッダーの検査
//!
//! ## ヘッダー（little-endian）
//! ```text
//! 0..4    magic            0x96f3b83d
//! 4..8    load_addr        0 であること
//! 8..10   hdr_size
//! 10..12  protect_tlv_size 0 であること
//! 12..16  img_size
//! 16..20  flags            0 であること
//! 20      version.major
//! 21      version.minor
//! 22..24  version.revision
//! 24..28  version.build
//! ```

use core::fmt;

use alloc::string::String;
use sha2::{Digest, Sha256};

use crate::error::SmpError;

/// MCUboot イメージのマジック
pub const IMAGE_MAGIC: u32 = 0x96f3_b83d;

/// 検査に必要な最小長
pub const MIN_IMAGE_LEN: usize = 32;

/// イメージのバージョン
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u16,
    pub build: u32,
}

impl fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)?;
        if self.build != 0 {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

/// 検査済みイメージの情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub version: ImageVersion,
    pub header_size: usize,
    pub image_size: usize,
    /// ヘッダー + イメージ本体の SHA-256（デバイスが報告するハッシュと同じもの）
    pub hash: [u8; 32],
}

impl ImageInfo {
    pub fn version_string(&self) -> String {
        alloc::format!("{}", self.version)
    }
}

/// イメージを検査する
///
/// # エラー
/// - `SmpError::InvalidImage`: 短すぎる、マジック不一致、ヘッダーサイズが 32 未満、
///   ロードアドレス・保護 TLV・フラグが 0 でない、宣言サイズがバッファを超える
pub fn inspect_image(image: &[u8]) -> Result<ImageInfo, SmpError> {
    if image.len() < MIN_IMAGE_LEN {
        return Err(SmpError::InvalidImage("too short"));
    }
    if le_u32(image, 0) != IMAGE_MAGIC {
        return Err(SmpError::InvalidImage("wrong magic"));
    }
    if le_u32(image, 4) != 0 {
        return Err(SmpError::InvalidImage("non-zero load address"));
    }
    let header_size = le_u16(image, 8) as usize;
    if header_size < MIN_IMAGE_LEN {
        return Err(SmpError::InvalidImage("header size too small"));
    }
    if le_u16(image, 10) != 0 {
        return Err(SmpError::InvalidImage("non-zero protected TLV area size"));
    }
    let image_size = le_u32(image, 12) as usize;
    if header_size
        .checked_add(image_size)
        .map_or(true, |end| end > image.len())
    {
        return Err(SmpError::InvalidImage("declared size exceeds file length"));
    }
    if le_u32(image, 16) != 0 {
        return Err(SmpError::InvalidImage("non-zero flags"));
    }

    let version = ImageVersion {
        major: image[20],
        minor: image[21],
        revision: le_u16(image, 22),
        build: le_u32(image, 24),
    };
    let hash: [u8; 32] = Sha256::digest(&image[..header_size + image_size]).into();

    Ok(ImageInfo {
        version,
        header_size,
        image_size,
        hash,
    })
}

/// イメージファイル全体の SHA-256（アップロード初回チャンクの `sha`）
pub fn file_sha256(image: &[u8]) -> [u8; 32] {
    Sha256::digest(image).into()
}

fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// テスト用のイメージを組み立てる
#[cfg(test)]
pub(crate) fn build_test_image(body_len: usize, trailer_len: usize) -> alloc::vec::Vec<u8> {
    let mut image = alloc::vec![0u8; 32];
    image[0..4].copy_from_slice(&IMAGE_MAGIC.to_le_bytes());
    image[8..10].copy_from_slice(&32u16.to_le_bytes());
    image[12..16].copy_from_slice(&(body_len as u32).to_le_bytes());
    image[20] = 1;
    image[21] = 2;
    image[22..24].copy_from_slice(&3u16.to_le_bytes());
    image[24..28].copy_from_slice(&4u32.to_le_bytes());
    image.extend((0..body_len).map(|i| i as u8));
    image.extend(core::iter::repeat(0xEE).take(trailer_len));
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_image() {
        let image = build_test_image(100, 20);
        let info = inspect_image(&image).unwrap();
        assert_eq!(info.header_size, 32);
        assert_eq!(info.image_size, 100);
        assert_eq!(info.version_string(), "1.2.3+4");

        // トレーラー（TLV）はハッシュに含まれない
        let expected: [u8; 32] = Sha256::digest(&image[..132]).into();
        assert_eq!(info.hash, expected);
        assert_ne!(info.hash, file_sha256(&image));
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            inspect_image(&[0u8; 31]),
            Err(SmpError::InvalidImage("too short"))
        );
    }

    #[test]
    fn test_wrong_magic() {
        let mut image = build_test_image(10, 0);
        image[0] = 0;
        assert_eq!(
            inspect_image(&image),
            Err(SmpError::InvalidImage("wrong magic"))
        );
    }

    #[test]
    fn test_non_zero_load_address() {
        let mut image = build_test_image(10, 0);
        image[5] = 1;
        assert_eq!(
            inspect_image(&image),
            Err(SmpError::InvalidImage("non-zero load address"))
        );
    }

    #[test]
    fn test_header_size_below_minimum() {
        for header_size in [0u16, 31] {
            let mut image = build_test_image(10, 0);
            image[8..10].copy_from_slice(&header_size.to_le_bytes());
            assert_eq!(
                inspect_image(&image),
                Err(SmpError::InvalidImage("header size too small"))
            );
        }
    }

    #[test]
    fn test_larger_header_is_hashed_with_padding() {
        // ヘッダー 64 バイト（パディング込み）+ 本体 10 バイト
        let mut image = build_test_image(42, 0);
        image[8..10].copy_from_slice(&64u16.to_le_bytes());
        image[12..16].copy_from_slice(&10u32.to_le_bytes());
        let info = inspect_image(&image).unwrap();
        assert_eq!(info.header_size, 64);
        let expected: [u8; 32] = Sha256::digest(&image[..74]).into();
        assert_eq!(info.hash, expected);
    }

    #[test]
    fn test_protected_tlv() {
        let mut image = build_test_image(10, 0);
        image[10] = 4;
        assert!(matches!(inspect_image(&image), Err(SmpError::InvalidImage(_))));
    }

    #[test]
    fn test_declared_size_exceeds_buffer() {
        let mut image = build_test_image(10, 0);
        image[12..16].copy_from_slice(&11u32.to_le_bytes());
        assert_eq!(
            inspect_image(&image),
            Err(SmpError::InvalidImage("declared size exceeds file length"))
        );
    }

    #[test]
    fn test_non_zero_flags() {
        let mut image = build_test_image(10, 0);
        image[16] = 0x10;
        assert_eq!(
            inspect_image(&image),
            Err(SmpError::InvalidImage("non-zero flags"))
        );
    }

    #[test]
    fn test_version_without_build() {
        let version = ImageVersion {
            major: 2,
            minor: 0,
            revision: 11,
            build: 0,
        };
        assert_eq!(alloc::format!("{}", version), "2.0.11");
    }
}
