//! # wearlink-cbor
//!
//! CBOR（RFC 7049）のうち mcumgr/SMP で実用される範囲のエンコーダ/デコーダ。
//!
//! ## 対応範囲
//!
//! | Major type | 内容 | エンコード | デコード |
//! |---|---|---|---|
//! | 0 / 1 | 正/負の整数 | 最短長 | ○ |
//! | 2 / 3 | バイト列 / UTF-8 文字列 | 最短長 | 不定長チャンクも再構成 |
//! | 4 / 5 | 配列 / マップ（挿入順） | 最短長 | 不定長（0xFF 終端）も可 |
//! | 6 | タグ | ○ | tagger に委譲 |
//! | 7 | bool / null / undefined / simple / float | float64 | half/single/double |
//!
//! ## 初期バイト
//!
//! ```text
//! [major: 3 bits][additional info: 5 bits]
//!   additional info < 24 : 値そのもの
//!   24 / 25 / 26 / 27    : 後続 1 / 2 / 4 / 8 バイト（big-endian）
//!   31                   : 不定長（major 2..=5）または break（major 7）
//! ```

#![no_std]
extern crate alloc;

pub mod decode;
pub mod encode;
pub mod error;
pub mod value;

pub use decode::{from_slice, Decoder};
pub use encode::{to_vec, Encoder};
pub use error::CborError;
pub use value::Value;

#[doc(hidden)]
pub mod __private {
    pub use alloc::vec;
    pub use alloc::vec::Vec;
}

/// テキストキーの CBOR マップを組み立てる
///
/// ```
/// use wearlink_cbor::{cbor_map, Value};
/// let map = cbor_map! { "off" => 0u32, "data" => &b"\x01\x02"[..] };
/// assert_eq!(map.get("off").and_then(Value::as_u64), Some(0));
/// ```
#[macro_export]
macro_rules! cbor_map {
    () => {
        $crate::Value::Map($crate::__private::Vec::new())
    };
    ( $( $key:expr => $value:expr ),+ $(,)? ) => {
        $crate::Value::Map($crate::__private::vec![
            $( ($crate::Value::from($key), $crate::Value::from($value)) ),+
        ])
    };
}
