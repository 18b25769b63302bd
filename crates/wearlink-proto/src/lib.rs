//! # wearlink-proto
//!
//! デバイスプロトコルのメッセージ定義と、全サブプロトコル共通の TLV フレーミング。
//!
//! ## 外側フレームの Wire Format
//!
//! ```text
//! [type_index: u8][length: u16 LE][payload: length bytes] が transport メッセージの終端まで繰り返される
//! ```
//!
//! ## センサーデータ内側フレーム
//!
//! ```text
//! [timestamp: u16 LE]([sensor_type: u8][length: u8][payload...])*
//! ```
//!
//! 長さフィールドの幅（1 or 2 バイト）は呼び出し側が [`LengthWidth`] で指定する。
//! 型インデックスの解決には閉じた enum カタログ（[`Catalog`]）を使う。

#![no_std]
extern crate alloc;

#[macro_use]
mod catalog;

pub mod crc32;
pub mod error;
pub mod message;
pub mod request;
pub mod sensor;
pub mod tlv;

pub use catalog::Catalog;
pub use crc32::{crc32, Crc32};
pub use error::ProtoError;
pub use message::{MessageType, SubProtocol, TxMessage};
pub use request::RequestId;
pub use sensor::{parse_sensor_data, SensorData, SensorTimestamp, SensorType};
pub use tlv::{decode_frames, encode_frame, LengthWidth};
