//! # wearlink-device
//!
//! デバイス 1 台分のプロトコルスタックをまとめるオーケストレーター。
//!
//! ```text
//! Device<T: Transport>
//!   ├── ConnectionManager  (wearlink-transport) - 接続状態、送信キュー、MTU パッキング
//!   ├── FileTransferEngine (wearlink-file)      - ファイル転送
//!   └── SmpEngine          (wearlink-smp)       - ファームウェア更新
//! ```
//!
//! ホストは BLE などのトランスポートからの通知を `on_connected` / `on_mtu` /
//! `on_data` / `on_disconnected` で渡し、定期的に `tick(now_ms)` を呼ぶ。
//! 結果は `take_events()` で取り出す。

#![no_std]
extern crate alloc;

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod registry;
pub mod transport;

pub use config::DeviceConfig;
pub use device::Device;
pub use error::DeviceError;
pub use event::{DeviceEvent, SensorReading};
pub use registry::DeviceRegistry;
pub use transport::Transport;
