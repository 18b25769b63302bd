//! # wearlink-smp
//!
//! SMP（Simple Management Protocol, mcumgr）によるファームウェア更新エンジン。
//!
//! ## SMP メッセージの Wire Format
//!
//! ```text
//! [op: u8][flags: u8][length: u16 BE][group: u16 BE][seq: u8][command_id: u8]
//! [CBOR map: length bytes]
//! ```
//!
//! 外側プロトコルでは `MessageType::SmpMessage` フレームのペイロードとして運ばれる。
//! 受信側は通知が分割されて届くことがあるため、[`Accumulator`] で 1 メッセージずつ切り出す。
//!
//! ## イメージアップロード
//!
//! ```text
//! → {off: 0, data, len, sha}   ← {rc: 0, off: n0}
//! → {off: n0, data}            ← {rc: 0, off: n0 + n1}
//! ...                          ← {rc: 0, off: len}   → 完了、イメージ状態を再取得
//! ```
//!
//! 常に 1 チャンクだけを送り、ピアが返した `off` から次のチャンクを作る。

#![no_std]
extern crate alloc;

pub mod accumulator;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod header;
pub mod image;
pub mod slots;

pub use accumulator::Accumulator;
pub use config::SmpConfig;
pub use engine::{SmpEngine, SmpRequest};
pub use error::SmpError;
pub use event::{FirmwareEvent, TaskInfo};
pub use header::{SmpGroup, SmpHeader, SmpMessage, SmpOp};
pub use image::{inspect_image, ImageInfo, ImageVersion};
pub use slots::{derive_status, FirmwareImage, FirmwareStatus};
