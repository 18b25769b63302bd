//! # wearlink-wasm
//!
//! wasm-bindgen エクスポート：Web Bluetooth を使う JS ホストから呼び出す公開 API。
//!
//! ## 使用方法（TypeScript）
//!
//! ```typescript
//! import { WearClient, init_panic_hook, init_logger } from '../wearlink-wasm-pkg/wearlink_wasm';
//!
//! init_panic_hook();
//! init_logger("info");
//!
//! // 書き込みコールバックは 1 パケットずつ呼ばれる
//! const client = new WearClient((packet: Uint8Array) => characteristic.writeValueWithoutResponse(packet));
//!
//! client.onConnected();
//! client.onMtu(247);
//! characteristic.addEventListener('characteristicvaluechanged', (e) => {
//!     client.onData(new Uint8Array(e.target.value.buffer));
//! });
//!
//! client.uploadFirmware(imageBytes);
//!
//! // 定期タイマー（生存確認）
//! setInterval(() => {
//!     client.tick(Date.now());
//!     for (const event of JSON.parse(client.takeEvents())) { ... }
//! }, 100);
//! ```

use wasm_bindgen::prelude::*;

pub mod client;
pub mod json;
pub mod logger;

pub use client::{JsTransport, WearClient};
pub use json::{events_json, parse_config, stats_json, ClientStats};
pub use logger::init_logger;

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
