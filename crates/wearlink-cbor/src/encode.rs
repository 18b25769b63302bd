//! CBOR エンコーダ

use alloc::vec::Vec;

use crate::error::CborError;
use crate::value::Value;

/// スクラッチバッファの初期容量
const INITIAL_CAPACITY: usize = 256;

/// 値を CBOR バイト列にエンコードする
///
/// # エラー
/// - `CborError::InvalidSimpleValue`: 20..=31 の `Value::Simple`
///
/// # 例
/// ```
/// use wearlink_cbor::{to_vec, Value};
/// assert_eq!(to_vec(&Value::Unsigned(0)).unwrap(), vec![0x00]);
/// assert_eq!(to_vec(&Value::Unsigned(500)).unwrap(), vec![0x19, 0x01, 0xF4]);
/// ```
pub fn to_vec(value: &Value) -> Result<Vec<u8>, CborError> {
    let mut encoder = Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// CBOR エンコーダ
///
/// 内部のスクラッチバッファは不足するたびに容量を倍にして確保し直す。
/// 同じエンコーダで複数の値を続けて書くと、連結した CBOR シーケンスになる。
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder {
            buf: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// 値を 1 つ書き込む
    ///
    /// simple value 20..=23 は bool / null / undefined が使う番号、24..=31 は
    /// 1 バイト形式で表せない番号なので `Value::Simple` としては書けない。
    /// エラーのときは途中まで書き込んだバイトが残る。
    pub fn encode(&mut self, value: &Value) -> Result<(), CborError> {
        match value {
            Value::Unsigned(n) => self.write_head(0, *n),
            Value::Negative(n) => self.write_head(1, *n),
            Value::Bytes(bytes) => {
                self.write_head(2, bytes.len() as u64);
                self.write_bytes(bytes);
            }
            Value::Text(text) => {
                self.write_head(3, text.len() as u64);
                self.write_bytes(text.as_bytes());
            }
            Value::Array(items) => {
                self.write_head(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(entries) => {
                self.write_head(5, entries.len() as u64);
                for (key, val) in entries {
                    self.encode(key)?;
                    self.encode(val)?;
                }
            }
            Value::Tag(tag, inner) => {
                self.write_head(6, *tag);
                self.encode(inner)?;
            }
            Value::Bool(false) => self.write_bytes(&[0xF4]),
            Value::Bool(true) => self.write_bytes(&[0xF5]),
            Value::Null => self.write_bytes(&[0xF6]),
            Value::Undefined => self.write_bytes(&[0xF7]),
            Value::Simple(n @ 0..=19) => self.write_bytes(&[0xE0 | *n]),
            Value::Simple(n @ 20..=31) => return Err(CborError::InvalidSimpleValue(*n)),
            Value::Simple(n) => self.write_bytes(&[0xF8, *n]),
            Value::Float(f) => {
                self.reserve(9);
                self.buf.push(0xFB);
                self.buf.extend_from_slice(&f.to_bits().to_be_bytes());
            }
        }
        Ok(())
    }

    /// 書き込み済みのバイト列
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// 初期バイト + 最短長の引数を書き込む
    fn write_head(&mut self, major: u8, value: u64) {
        let major = major << 5;
        self.reserve(9);
        if value < 24 {
            self.buf.push(major | value as u8);
        } else if value <= u8::MAX as u64 {
            self.buf.push(major | 24);
            self.buf.push(value as u8);
        } else if value <= u16::MAX as u64 {
            self.buf.push(major | 25);
            self.buf.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u32::MAX as u64 {
            self.buf.push(major | 26);
            self.buf.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buf.push(major | 27);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    /// 容量が足りなければ倍々で確保し直す
    fn reserve(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        let capacity = self.buf.capacity();
        if needed <= capacity {
            return;
        }
        let mut new_capacity = capacity.max(INITIAL_CAPACITY);
        while new_capacity < needed {
            new_capacity *= 2;
        }
        self.buf.reserve_exact(new_capacity - self.buf.len());
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
