//! CBOR の値表現

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

/// CBOR 値（再帰的な直和型）
///
/// マップは挿入順を保持する（mcumgr のレスポンスはキー順に意味を持たないが、
/// エンコード結果を決定的にするため）。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// major 0: 非負整数
    Unsigned(u64),
    /// major 1: 負の整数。保持する値 `n` は `-1 - n` を表す
    Negative(u64),
    /// major 7: 浮動小数点数
    Float(f64),
    /// major 2: バイト列
    Bytes(Vec<u8>),
    /// major 3: UTF-8 文字列
    Text(String),
    /// major 4: 配列
    Array(Vec<Value>),
    /// major 5: マップ（挿入順）
    Map(Vec<(Value, Value)>),
    /// major 6: タグ付き値
    Tag(u64, Box<Value>),
    Bool(bool),
    Null,
    Undefined,
    /// major 7: その他の simple value
    Simple(u8),
}

/// JavaScript の Number と同じ「安全な整数」の上限（2^53 - 1）
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Value {
    /// 符号付き整数から値を作る
    pub fn integer(n: i64) -> Self {
        if n >= 0 {
            Value::Unsigned(n as u64)
        } else {
            Value::Negative((-(n + 1)) as u64)
        }
    }

    /// 数値から値を作る
    ///
    /// 整数値かつ安全な整数範囲なら整数、それ以外は float64 になる。
    pub fn number(n: f64) -> Self {
        let integral = n.is_finite() && n == (n as i64) as f64;
        if integral && (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&n) {
            Value::integer(n as i64)
        } else {
            Value::Float(n)
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Unsigned(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Unsigned(n) if n <= i64::MAX as u64 => Some(n as i64),
            Value::Negative(n) if n <= i64::MAX as u64 => Some(-1 - n as i64),
            _ => None,
        }
    }

    /// 整数も含めて f64 として読む
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Unsigned(n) => Some(n as f64),
            Value::Negative(n) => Some(-1.0 - n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// テキストキーでマップを引く（マップ以外、またはキーがなければ `None`）
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// マップにエントリを追加する（マップ以外なら何もしない）
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        if let Value::Map(entries) = self {
            entries.push((key.into(), value.into()));
        }
    }
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Unsigned(n as u64)
                }
            }
        )*
    };
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::integer(n as i64)
                }
            }
        )*
    };
}

impl_from_unsigned!(u8, u16, u32, u64, usize);
impl_from_signed!(i8, i16, i32, i64);

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(String::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}
