//! CBOR デコーダ

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::CborError;
use crate::value::Value;

/// ネストの上限（配列・マップ・タグ）
pub const MAX_DEPTH: usize = 64;

/// break コード（不定長コンテナの終端）
const BREAK: u8 = 0xFF;

/// タグ（major 6）を値に変換するハンドラ: `(tagged_value, tag_number) -> value`
pub type Tagger<'h> = &'h dyn Fn(Value, u64) -> Value;

/// simple value（major 7 の 0..=19, 24 + n）を値に変換するハンドラ
pub type SimpleHandler<'h> = &'h dyn Fn(u8) -> Value;

/// CBOR バイト列を 1 つの値にデコードする
///
/// 値の後ろにバイトが残っている場合はエラーになる。
pub fn from_slice(data: &[u8]) -> Result<Value, CborError> {
    Decoder::new(data).decode()
}

/// CBOR デコーダ
///
/// タグと simple value の扱いはハンドラで差し替えられる。
/// 既定ではそれぞれ `Value::Tag` / `Value::Simple` として残す。
pub struct Decoder<'a, 'h> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    tagger: Option<Tagger<'h>>,
    simple_handler: Option<SimpleHandler<'h>>,
}

/// 初期バイトの引数部分
enum Argument {
    Definite(u64),
    Indefinite,
}

impl<'a, 'h> Decoder<'a, 'h> {
    pub fn new(data: &'a [u8]) -> Self {
        Decoder {
            data,
            pos: 0,
            depth: 0,
            tagger: None,
            simple_handler: None,
        }
    }

    /// タグ付き値のハンドラを設定する
    pub fn with_tagger(mut self, tagger: Tagger<'h>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// simple value のハンドラを設定する
    pub fn with_simple_handler(mut self, handler: SimpleHandler<'h>) -> Self {
        self.simple_handler = Some(handler);
        self
    }

    /// 値を 1 つデコードし、入力をすべて消費したことを確認する
    ///
    /// # エラー
    /// - `CborError::TrailingBytes`: 値の後ろに未消費のバイトがある
    /// - その他、構文エラー
    pub fn decode(mut self) -> Result<Value, CborError> {
        let value = self.read_value()?;
        if self.pos != self.data.len() {
            return Err(CborError::TrailingBytes {
                offset: self.pos,
                remaining: self.data.len() - self.pos,
            });
        }
        Ok(value)
    }

    fn read_value(&mut self) -> Result<Value, CborError> {
        let offset = self.pos;
        let initial = self.read_u8()?;
        let major = initial >> 5;
        let info = initial & 0x1F;

        match major {
            0 => Ok(Value::Unsigned(self.read_definite(offset, info)?)),
            1 => Ok(Value::Negative(self.read_definite(offset, info)?)),
            2 => match self.read_argument(offset, info)? {
                Argument::Definite(len) => Ok(Value::Bytes(self.read_slice(len)?.to_vec())),
                Argument::Indefinite => Ok(Value::Bytes(self.read_chunks(2)?)),
            },
            3 => {
                let bytes = match self.read_argument(offset, info)? {
                    Argument::Definite(len) => self.read_slice(len)?.to_vec(),
                    Argument::Indefinite => self.read_chunks(3)?,
                };
                String::from_utf8(bytes)
                    .map(Value::Text)
                    .map_err(|_| CborError::InvalidUtf8 { offset })
            }
            4 => {
                let argument = self.read_argument(offset, info)?;
                self.enter()?;
                let items = match argument {
                    Argument::Definite(len) => {
                        let mut items = Vec::with_capacity(self.capacity_hint(len));
                        for _ in 0..len {
                            items.push(self.read_value()?);
                        }
                        items
                    }
                    Argument::Indefinite => {
                        let mut items = Vec::new();
                        while !self.take_break()? {
                            items.push(self.read_value()?);
                        }
                        items
                    }
                };
                self.depth -= 1;
                Ok(Value::Array(items))
            }
            5 => {
                let argument = self.read_argument(offset, info)?;
                self.enter()?;
                let entries = match argument {
                    Argument::Definite(len) => {
                        let mut entries = Vec::with_capacity(self.capacity_hint(len));
                        for _ in 0..len {
                            let key = self.read_value()?;
                            let value = self.read_value()?;
                            entries.push((key, value));
                        }
                        entries
                    }
                    Argument::Indefinite => {
                        let mut entries = Vec::new();
                        while !self.take_break()? {
                            let key = self.read_value()?;
                            let value = self.read_value()?;
                            entries.push((key, value));
                        }
                        entries
                    }
                };
                self.depth -= 1;
                Ok(Value::Map(entries))
            }
            6 => {
                let tag = self.read_definite(offset, info)?;
                self.enter()?;
                let inner = self.read_value()?;
                self.depth -= 1;
                Ok(match self.tagger {
                    Some(tagger) => tagger(inner, tag),
                    None => Value::Tag(tag, Box::new(inner)),
                })
            }
            _ => self.read_simple(offset, info),
        }
    }

    /// major 7: simple value / float / break
    fn read_simple(&mut self, offset: usize, info: u8) -> Result<Value, CborError> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            23 => Ok(Value::Undefined),
            0..=19 => Ok(self.simple(info)),
            24 => {
                let n = self.read_u8()?;
                if n < 32 {
                    return Err(CborError::InvalidSimpleValue(n));
                }
                Ok(self.simple(n))
            }
            25 => {
                let bits = u16::from_be_bytes(self.read_array::<2>()?);
                Ok(Value::Float(half_to_f64(bits)))
            }
            26 => {
                let bits = u32::from_be_bytes(self.read_array::<4>()?);
                Ok(Value::Float(f32::from_bits(bits) as f64))
            }
            27 => {
                let bits = u64::from_be_bytes(self.read_array::<8>()?);
                Ok(Value::Float(f64::from_bits(bits)))
            }
            31 => Err(CborError::UnexpectedBreak { offset }),
            _ => Err(CborError::InvalidAdditionalInfo { offset, info }),
        }
    }

    fn simple(&self, n: u8) -> Value {
        match self.simple_handler {
            Some(handler) => handler(n),
            None => Value::Simple(n),
        }
    }

    /// 不定長バイト列/文字列のチャンクを break まで連結する
    fn read_chunks(&mut self, major: u8) -> Result<Vec<u8>, CborError> {
        let mut out = Vec::new();
        loop {
            let offset = self.pos;
            let initial = self.read_u8()?;
            if initial == BREAK {
                return Ok(out);
            }
            if initial >> 5 != major {
                return Err(CborError::InvalidIndefiniteChunk { offset });
            }
            match self.read_argument(offset, initial & 0x1F)? {
                Argument::Definite(len) => out.extend_from_slice(self.read_slice(len)?),
                Argument::Indefinite => return Err(CborError::InvalidIndefiniteChunk { offset }),
            }
        }
    }

    fn read_argument(&mut self, offset: usize, info: u8) -> Result<Argument, CborError> {
        let value = match info {
            0..=23 => info as u64,
            24 => self.read_u8()? as u64,
            25 => u16::from_be_bytes(self.read_array::<2>()?) as u64,
            26 => u32::from_be_bytes(self.read_array::<4>()?) as u64,
            27 => u64::from_be_bytes(self.read_array::<8>()?),
            31 => return Ok(Argument::Indefinite),
            _ => return Err(CborError::InvalidAdditionalInfo { offset, info }),
        };
        Ok(Argument::Definite(value))
    }

    /// 不定長を許さない引数（整数・タグ番号）
    fn read_definite(&mut self, offset: usize, info: u8) -> Result<u64, CborError> {
        match self.read_argument(offset, info)? {
            Argument::Definite(n) => Ok(n),
            Argument::Indefinite => Err(CborError::InvalidAdditionalInfo { offset, info }),
        }
    }

    /// 次のバイトが break なら消費して true
    fn take_break(&mut self) -> Result<bool, CborError> {
        match self.data.get(self.pos) {
            Some(&BREAK) => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CborError::UnexpectedEof { offset: self.pos }),
        }
    }

    fn enter(&mut self) -> Result<(), CborError> {
        if self.depth >= MAX_DEPTH {
            return Err(CborError::DepthExceeded { max: MAX_DEPTH });
        }
        self.depth += 1;
        Ok(())
    }

    /// 宣言長を信用しすぎない事前確保サイズ（1 要素最低 1 バイト）
    fn capacity_hint(&self, len: u64) -> usize {
        let remaining = self.data.len() - self.pos;
        (len as usize).min(remaining)
    }

    fn read_u8(&mut self) -> Result<u8, CborError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(CborError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CborError> {
        let slice = self.read_slice(N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_slice(&mut self, len: u64) -> Result<&'a [u8], CborError> {
        let remaining = self.data.len() - self.pos;
        if len > remaining as u64 {
            return Err(CborError::UnexpectedEof {
                offset: self.data.len(),
            });
        }
        let len = len as usize;
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

/// IEEE 754 half precision → f64
fn half_to_f64(bits: u16) -> f64 {
    let exponent = ((bits >> 10) & 0x1F) as i64;
    let mantissa = (bits & 0x03FF) as f64;
    let magnitude = match exponent {
        // subnormal: mantissa × 2^-24
        0 => mantissa / 16_777_216.0,
        31 if mantissa == 0.0 => f64::INFINITY,
        31 => f64::NAN,
        // (1024 + mantissa) × 2^(exponent - 25)
        _ => (1024.0 + mantissa) * f64::from_bits(((exponent - 25 + 1023) as u64) << 52),
    };
    if bits & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
