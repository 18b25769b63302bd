//! WearClient wasm-bindgen エクスポート
//!
//! JS ホストから呼び出すデバイス 1 台分の主エントリポイント。
//! 接続管理・ファイル転送・ファームウェア更新を統合する。

use js_sys::{Function, Uint8Array};
use wasm_bindgen::prelude::*;

use wearlink_device::{Device, DeviceError, Transport};
use wearlink_proto::{Catalog, MessageType, RequestId, TxMessage};

use crate::json::{events_json, parse_config, stats_json};

/// JS コールバックで書き込むトランスポート
///
/// 接続状態はホストが `onConnected` / `onDisconnected` で報告した値を保持する。
pub struct JsTransport {
    write: Function,
    connect: Option<Function>,
    disconnect: Option<Function>,
    connected: bool,
}

impl JsTransport {
    pub fn new(write: Function) -> Self {
        JsTransport {
            write,
            connect: None,
            disconnect: None,
            connected: false,
        }
    }
}

impl Transport for JsTransport {
    type Error = String;

    fn write(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        let array = Uint8Array::from(packet);
        self.write
            .call1(&JsValue::NULL, &array)
            .map(|_| ())
            .map_err(describe)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self) -> Result<(), Self::Error> {
        match &self.connect {
            Some(callback) => callback.call0(&JsValue::NULL).map(|_| ()).map_err(describe),
            None => Ok(()),
        }
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        match &self.disconnect {
            Some(callback) => callback.call0(&JsValue::NULL).map(|_| ()).map_err(describe),
            None => Ok(()),
        }
    }
}

fn describe(value: JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn js_error(e: DeviceError) -> JsError {
    JsError::new(&format!("{}", e))
}

/// デバイス 1 台分のクライアント
///
/// ## 内部アーキテクチャ
///
/// ```text
/// WearClient
///   └── Device<JsTransport>  (wearlink-device)
///         ├── ConnectionManager  (wearlink-transport) - 状態機械 + MTU パッキング
///         ├── FileTransferEngine (wearlink-file)      - ファイル転送
///         └── SmpEngine          (wearlink-smp)       - ファームウェア更新
/// ```
///
/// ## スレッド安全性
///
/// WASM はシングルスレッドのため、`!Send + !Sync` を満たす。
/// JS からは単一スレッドで呼び出される前提。
#[wasm_bindgen]
pub struct WearClient {
    device: Device<JsTransport>,
}

#[wasm_bindgen]
impl WearClient {
    /// クライアントを初期化する
    ///
    /// # 引数
    /// - `write`: パケット（Uint8Array）を 1 つ書き込むコールバック
    /// - `config_json`: 設定 JSON。省略時は既定値
    ///
    /// # エラー
    /// - 設定 JSON が不正
    ///
    /// # 例（TypeScript）
    /// ```typescript
    /// const client = new WearClient(write);
    /// const client2 = new WearClient(write, '{"connection": {"default_mtu": 185}}');
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(write: Function, config_json: Option<String>) -> Result<WearClient, JsError> {
        let config = parse_config(config_json.as_deref())
            .map_err(|e| JsError::new(&format!("Invalid config: {}", e)))?;
        Ok(WearClient {
            device: Device::new(JsTransport::new(write), config),
        })
    }

    /// `connect()` / `disconnect()` で呼ばれるコールバックを設定する
    #[wasm_bindgen(js_name = "setConnectionCallbacks")]
    pub fn set_connection_callbacks(&mut self, connect: Function, disconnect: Function) {
        let transport = self.device.transport_mut();
        transport.connect = Some(connect);
        transport.disconnect = Some(disconnect);
    }

    pub fn connect(&mut self) -> Result<(), JsError> {
        self.device.connect().map_err(js_error)
    }

    pub fn disconnect(&mut self) -> Result<(), JsError> {
        self.device.disconnect().map_err(js_error)
    }

    #[wasm_bindgen(js_name = "onConnected")]
    pub fn on_connected(&mut self) -> Result<(), JsError> {
        self.device.transport_mut().connected = true;
        self.device.on_connected().map_err(js_error)
    }

    #[wasm_bindgen(js_name = "onDisconnected")]
    pub fn on_disconnected(&mut self) {
        self.device.transport_mut().connected = false;
        self.device.on_disconnected();
    }

    #[wasm_bindgen(js_name = "onMtu")]
    pub fn on_mtu(&mut self, mtu: u32) {
        self.device.on_mtu(mtu as usize);
    }

    /// 受信した通知（生バイト）を処理する
    ///
    /// # エラー
    /// - 外側フレームが壊れている（それより前のフレームは処理済み）
    #[wasm_bindgen(js_name = "onData")]
    pub fn on_data(&mut self, bytes: &[u8]) -> Result<(), JsError> {
        self.device.on_data(bytes).map_err(js_error)
    }

    /// 定期タイマー tick（生存確認）
    ///
    /// # 引数
    /// - `now_ms`: 現在時刻（`Date.now()`）
    pub fn tick(&mut self, now_ms: f64) {
        self.device.tick(now_ms as u64);
    }

    /// 接続状態（"NotConnected" など）
    pub fn status(&self) -> String {
        format!("{:?}", self.device.status())
    }

    /// 任意のメッセージを送る
    ///
    /// # 引数
    /// - `message_type`: 外側プロトコルの型インデックス
    #[wasm_bindgen(js_name = "sendMessage")]
    pub fn send_message(&mut self, message_type: u8, data: &[u8]) -> Result<(), JsError> {
        let message_type = MessageType::from_index(message_type)
            .ok_or_else(|| JsError::new(&format!("Unknown message type: {}", message_type)))?;
        let message = if data.is_empty() {
            TxMessage::new(message_type)
        } else {
            TxMessage::with_data(message_type, data.to_vec())
        };
        self.device.send_message(message).map_err(js_error)
    }

    #[wasm_bindgen(js_name = "sendFile")]
    pub fn send_file(&mut self, file_type: u8, data: Vec<u8>) -> Result<(), JsError> {
        self.device.send_file(file_type, data).map_err(js_error)
    }

    #[wasm_bindgen(js_name = "receiveFile")]
    pub fn receive_file(&mut self, file_type: u8) -> Result<(), JsError> {
        self.device.receive_file(file_type).map_err(js_error)
    }

    #[wasm_bindgen(js_name = "cancelFile")]
    pub fn cancel_file(&mut self) -> Result<(), JsError> {
        self.device.cancel_file().map_err(js_error)
    }

    /// イメージ状態を読む
    ///
    /// ファームウェア操作はどれも要求 ID を返す。`deviceError` イベントの `id` と対応する。
    #[wasm_bindgen(js_name = "readImageState")]
    pub fn read_image_state(&mut self) -> Result<u32, JsError> {
        request_id(self.device.read_image_state())
    }

    #[wasm_bindgen(js_name = "uploadFirmware")]
    pub fn upload_firmware(&mut self, image: Vec<u8>) -> Result<u32, JsError> {
        request_id(self.device.upload_firmware(image))
    }

    #[wasm_bindgen(js_name = "testFirmware")]
    pub fn test_firmware(&mut self) -> Result<u32, JsError> {
        request_id(self.device.test_firmware())
    }

    #[wasm_bindgen(js_name = "confirmFirmware")]
    pub fn confirm_firmware(&mut self) -> Result<u32, JsError> {
        request_id(self.device.confirm_firmware())
    }

    #[wasm_bindgen(js_name = "eraseFirmware")]
    pub fn erase_firmware(&mut self) -> Result<u32, JsError> {
        request_id(self.device.erase_firmware())
    }

    #[wasm_bindgen(js_name = "resetDevice")]
    pub fn reset_device(&mut self) -> Result<u32, JsError> {
        request_id(self.device.reset_device())
    }

    pub fn echo(&mut self, text: &str) -> Result<u32, JsError> {
        request_id(self.device.echo(text))
    }

    #[wasm_bindgen(js_name = "taskStats")]
    pub fn task_stats(&mut self) -> Result<u32, JsError> {
        request_id(self.device.task_stats())
    }

    #[wasm_bindgen(js_name = "uploadDeviceFile")]
    pub fn upload_device_file(&mut self, name: &str, data: Vec<u8>) -> Result<u32, JsError> {
        request_id(self.device.upload_device_file(name, data))
    }

    #[wasm_bindgen(js_name = "downloadDeviceFile")]
    pub fn download_device_file(&mut self, name: &str) -> Result<u32, JsError> {
        request_id(self.device.download_device_file(name))
    }

    #[wasm_bindgen(js_name = "cancelFirmwareTransfer")]
    pub fn cancel_firmware_transfer(&mut self) -> Result<(), JsError> {
        self.device.cancel_firmware_transfer().map_err(js_error)
    }

    /// 溜まったイベントを JSON 配列で取り出す
    ///
    /// 各要素は `{"source": "file" | "firmware" | ..., "event": {...}}`。
    #[wasm_bindgen(js_name = "takeEvents")]
    pub fn take_events(&mut self) -> Result<String, JsError> {
        events_json(&self.device.take_events())
            .map_err(|e| JsError::new(&format!("Event serialization failed: {}", e)))
    }

    /// 接続統計を JSON 文字列で返す（形は `stats_json` を参照）
    #[wasm_bindgen(js_name = "getStats")]
    pub fn get_stats(&self) -> Result<String, JsError> {
        stats_json(&self.device)
            .map_err(|e| JsError::new(&format!("Stats serialization failed: {}", e)))
    }
}

fn request_id(result: Result<RequestId, DeviceError>) -> Result<u32, JsError> {
    result.map(|id| id.0).map_err(js_error)
}
