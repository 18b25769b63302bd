//! # wearlink-transport
//!
//! 接続マネージャー。デバイス 1 台ごとの接続状態と送信キューを管理する。
//!
//! I/O は持たない。送信すべきパケットを返すだけで、実際の書き込みはホスト
//! （`wearlink-device` / `wearlink-wasm`）が担当する。
//!
//! ## 送信の流れ
//!
//! ```text
//! enqueue(messages) → PendingQueue
//! flush()           → キューを一括で取り出し → TLV エンコード → MTU ごとに詰める → packets
//! (ホストが packets を書き込む)
//! sent()            → busy 解除 → flush 中に積まれた分を再 flush
//! ```
//!
//! ## パケットの構造
//!
//! ```text
//! [frame][frame]...   frame = [type_index: u8][length: u16 LE][payload]
//! 合計長 ≤ MTU - header_overhead（フレームは分割しない）
//! ```
//!
//! ## 接続状態の遷移
//!
//! ```text
//! NotConnected → Connecting → Connected → Disconnecting → NotConnected
//!                     └──────────────────────────────────┘ (接続失敗)
//! ```

#![no_std]
extern crate alloc;

pub mod dispatch;
pub mod error;
pub mod manager;
pub mod packer;
pub mod status;

pub use dispatch::{Dispatcher, HandlerMap};
pub use error::ConnectionError;
pub use manager::{ConnectionConfig, ConnectionManager, ConnectionStats, Flush};
pub use packer::Packer;
pub use status::ConnectionStatus;

/// MTU が報告されるまでの既定値（BLE の最小 ATT MTU）
pub const DEFAULT_MTU: usize = 23;

/// パケットごとのヘッダーオーバーヘッド（BLE ATT ヘッダー）
pub const DEFAULT_HEADER_OVERHEAD: usize = 3;

/// 生存確認の間隔（ミリ秒）
pub const LIVENESS_INTERVAL_MS: u64 = 5000;
