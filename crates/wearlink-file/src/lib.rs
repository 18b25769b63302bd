//! # wearlink-file
//!
//! ファイル転送エンジン。デバイスとのファイル送受信を 1 ブロックずつ進める。
//!
//! ## 送信の流れ
//!
//! ```text
//! SetFileType     → (GetFileType のエコー)
//! SetFileLength   → (GetFileLength のエコー)
//! SetFileChecksum → (GetFileChecksum のエコー)
//! SetFileTransferCommand(Send) → GetFileTransferStatus(Sending)
//! SetFileBlock[0] → FileBytesTransferred(n0)
//! SetFileBlock[1] → FileBytesTransferred(n0 + n1)
//! ...
//! GetFileTransferStatus(Idle) → 完了
//! ```
//!
//! 受信は `SetFileType` → `SetFileTransferCommand(Receive)` のあと、
//! ピアから届く `GetFileBlock` を連結し、宣言長と CRC-32 が一致したら完了とする。
//! 長さ 0 が宣言されたファイルはブロックを待たずに完了する。
//!
//! エンジンは I/O を持たない。操作と受信処理は送るべき `TxMessage` を返し、
//! 結果は `take_events()` で取り出すイベントとして通知する。

#![no_std]
extern crate alloc;

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod state;

pub use config::FileTransferConfig;
pub use engine::FileTransferEngine;
pub use error::FileTransferError;
pub use event::FileTransferEvent;
pub use state::{FileTransferCommand, FileTransferState, FileTransferStatus, PeerFileInfo};

/// ブロックごとに予約するフレームオーバーヘッド（外側 TLV ヘッダー 3 + 内側 3）
pub const DEFAULT_BLOCK_OVERHEAD: usize = 6;

/// MTU が分からないときのブロックサイズ
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;
