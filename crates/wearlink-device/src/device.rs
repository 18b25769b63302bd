//! デバイス 1 台分のオーケストレーター

use alloc::string::ToString;
use alloc::vec::Vec;

use log::{debug, info, warn};
use wearlink_file::{FileTransferEngine, FileTransferState};
use wearlink_proto::{parse_sensor_data, MessageType, RequestId, SubProtocol, TxMessage};
use wearlink_smp::{FirmwareImage, FirmwareStatus, SmpEngine, SmpError, SmpRequest};
use wearlink_transport::{
    ConnectionError, ConnectionManager, ConnectionStats, ConnectionStatus, Dispatcher, Flush,
};

use crate::config::DeviceConfig;
use crate::error::DeviceError;
use crate::event::{DeviceEvent, SensorReading};
use crate::transport::Transport;

/// 接続済み（または接続予定）のデバイス
///
/// 送信はすべて接続マネージャーのキューを通り、flush した結果をその場で
/// トランスポートに書き込む。書き込みが終わるたびに `sent()` で次の flush を受け取る。
pub struct Device<T: Transport> {
    transport: T,
    connection: ConnectionManager,
    file: FileTransferEngine,
    firmware: SmpEngine,
    events: Vec<DeviceEvent>,
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T, config: DeviceConfig) -> Self {
        Device {
            transport,
            connection: ConnectionManager::new(config.connection),
            file: FileTransferEngine::new(config.file),
            firmware: SmpEngine::new(config.firmware),
            events: Vec::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn mtu(&self) -> Option<usize> {
        self.connection.mtu()
    }

    pub fn stats(&self) -> &ConnectionStats {
        self.connection.stats()
    }

    pub fn file_state(&self) -> &FileTransferState {
        self.file.state()
    }

    pub fn firmware_status(&self) -> FirmwareStatus {
        self.firmware.status()
    }

    pub fn images(&self) -> &[FirmwareImage] {
        self.firmware.images()
    }

    pub fn take_events(&mut self) -> Vec<DeviceEvent> {
        core::mem::take(&mut self.events)
    }

    // ===== 接続 =====

    /// トランスポートに接続を依頼する（完了は `on_connected` で報告される）
    pub fn connect(&mut self) -> Result<(), DeviceError> {
        self.transition(ConnectionStatus::Connecting)?;
        if let Err(e) = self.transport.connect() {
            warn!("transport connect failed: {}", e);
            self.drop_connection();
            return Err(DeviceError::Transport(e.to_string()));
        }
        Ok(())
    }

    /// 切断を依頼する（完了は `on_disconnected` で報告される）
    pub fn disconnect(&mut self) -> Result<(), DeviceError> {
        match self.connection.status() {
            ConnectionStatus::NotConnected | ConnectionStatus::Disconnecting => return Ok(()),
            ConnectionStatus::Connected => self.transition(ConnectionStatus::Disconnecting)?,
            ConnectionStatus::Connecting => self.transition(ConnectionStatus::NotConnected)?,
        }
        self.transport
            .disconnect()
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }

    /// トランスポートが接続を報告した
    ///
    /// ピア側から接続された場合（`NotConnected` のまま）も `Connecting` を経由する。
    pub fn on_connected(&mut self) -> Result<(), DeviceError> {
        if self.connection.status() == ConnectionStatus::NotConnected {
            self.transition(ConnectionStatus::Connecting)?;
        }
        self.transition(ConnectionStatus::Connected)
    }

    /// トランスポートが切断を報告した
    pub fn on_disconnected(&mut self) {
        self.drop_connection();
    }

    /// トランスポートが MTU を報告した
    pub fn on_mtu(&mut self, mtu: usize) {
        info!("mtu {}", mtu);
        self.connection.set_mtu(Some(mtu));
    }

    /// 受信したバイト列を処理する
    ///
    /// # エラー
    /// - `DeviceError::Connection`: 外側フレームが壊れている。エラーの前までの
    ///   フレームは処理済みで、その応答も送信済み
    /// - 応答の送信に失敗した場合のエラー
    pub fn on_data(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut inbound = Inbound {
            file: &mut self.file,
            firmware: &mut self.firmware,
            events: &mut self.events,
            replies: Vec::new(),
        };
        let received = self.connection.receive(bytes, &mut inbound);
        let replies = inbound.replies;

        if !replies.is_empty() {
            self.send(replies)?;
        }
        received.map_err(DeviceError::from)
    }

    /// 定期処理（生存確認）
    pub fn tick(&mut self, now_ms: u64) {
        let transitions = self
            .connection
            .tick(now_ms, self.transport.is_connected());
        for status in transitions {
            self.status_changed(status);
        }
    }

    // ===== 送信 =====

    /// 任意のメッセージを送る（デバイス情報の問い合わせ、振動など）
    pub fn send_message(&mut self, message: TxMessage) -> Result<(), DeviceError> {
        self.send(alloc::vec![message])
    }

    pub fn send_file(&mut self, file_type: u8, data: Vec<u8>) -> Result<(), DeviceError> {
        self.ensure_sendable()?;
        let messages = self.file.send(file_type, data, self.connection.mtu())?;
        self.file_messages(messages)
    }

    pub fn receive_file(&mut self, file_type: u8) -> Result<(), DeviceError> {
        self.ensure_sendable()?;
        let messages = self.file.receive(file_type)?;
        self.file_messages(messages)
    }

    pub fn cancel_file(&mut self) -> Result<(), DeviceError> {
        self.ensure_sendable()?;
        let messages = self.file.cancel()?;
        self.file_messages(messages)
    }

    // ===== ファームウェア =====

    pub fn read_image_state(&mut self) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, _| smp.read_image_state())
    }

    /// ファームウェアイメージをアップロードする（チャンクは現在の MTU で決まる）
    pub fn upload_firmware(&mut self, image: Vec<u8>) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, mtu| smp.upload_image(image, mtu))
    }

    pub fn test_firmware(&mut self) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, _| smp.test_image())
    }

    pub fn confirm_firmware(&mut self) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, _| smp.confirm_image())
    }

    pub fn erase_firmware(&mut self) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, _| smp.erase_image())
    }

    pub fn reset_device(&mut self) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, _| smp.reset())
    }

    pub fn echo(&mut self, text: &str) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, _| smp.echo(text))
    }

    pub fn task_stats(&mut self) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, _| smp.task_stats())
    }

    /// デバイスのファイルシステムにファイルを書き込む（SMP FS グループ）
    pub fn upload_device_file(&mut self, name: &str, data: Vec<u8>) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, mtu| smp.upload_file(name, data, mtu))
    }

    pub fn download_device_file(&mut self, name: &str) -> Result<RequestId, DeviceError> {
        self.firmware_command(|smp, _| smp.download_file(name))
    }

    pub fn cancel_firmware_transfer(&mut self) -> Result<(), DeviceError> {
        self.firmware.cancel_transfer()?;
        self.collect_firmware_events();
        Ok(())
    }

    // ===== Private メソッド =====

    fn ensure_sendable(&self) -> Result<(), DeviceError> {
        let status = self.connection.status();
        if status.accepts_sends() {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected { status }.into())
        }
    }

    fn file_messages(&mut self, messages: Vec<TxMessage>) -> Result<(), DeviceError> {
        self.events
            .extend(self.file.take_events().into_iter().map(DeviceEvent::File));
        if messages.is_empty() {
            return Ok(());
        }
        self.send(messages).inspect_err(|_| self.file.reset())
    }

    fn firmware_command<F>(&mut self, command: F) -> Result<RequestId, DeviceError>
    where
        F: FnOnce(&mut SmpEngine, Option<usize>) -> Result<SmpRequest, SmpError>,
    {
        self.ensure_sendable()?;
        let request = command(&mut self.firmware, self.connection.mtu());
        self.collect_firmware_events();
        let request = request?;

        let id = request.id;
        self.send(alloc::vec![smp_frame(request)])?;
        Ok(id)
    }

    fn collect_firmware_events(&mut self) {
        self.events
            .extend(self.firmware.take_events().into_iter().map(DeviceEvent::Firmware));
    }

    fn send(&mut self, messages: Vec<TxMessage>) -> Result<(), DeviceError> {
        let flush = self.connection.enqueue(messages, true)?;
        self.write(flush)
    }

    /// flush の結果を書き込み、書き終えるたびに続きを flush する
    fn write(&mut self, mut flush: Flush) -> Result<(), DeviceError> {
        loop {
            for error in core::mem::take(&mut flush.rejected) {
                self.report_rejected(error);
            }
            if flush.packets.is_empty() {
                return Ok(());
            }
            for packet in &flush.packets {
                if let Err(e) = self.transport.write(packet) {
                    warn!("transport write failed: {}", e);
                    self.drop_connection();
                    return Err(DeviceError::Transport(e.to_string()));
                }
            }
            flush = self.connection.sent();
        }
    }

    fn report_rejected(&mut self, error: ConnectionError) {
        warn!("frame not sent: {}", error);
        let event = match error {
            ConnectionError::FrameTooLarge {
                message_type,
                frame_len,
                budget,
            } => DeviceEvent::FrameRejected {
                message_type,
                frame_len,
                budget,
            },
            other => DeviceEvent::ProtocolError {
                message_type: None,
                message: other.to_string(),
            },
        };
        self.events.push(event);
    }

    fn transition(&mut self, status: ConnectionStatus) -> Result<(), DeviceError> {
        if status == self.connection.status() {
            return Ok(());
        }
        self.connection.set_status(status)?;
        self.status_changed(status);
        Ok(())
    }

    /// 合法な遷移をたどって `NotConnected` まで落とす
    fn drop_connection(&mut self) {
        for status in self.connection.status().path_to_disconnected() {
            if self.connection.set_status(*status).is_ok() {
                self.status_changed(*status);
            }
        }
    }

    fn status_changed(&mut self, status: ConnectionStatus) {
        self.events.push(DeviceEvent::Connection { status });
        if status == ConnectionStatus::NotConnected {
            debug!("resetting engines after disconnect");
            self.file.reset();
            self.firmware.reset_connection();
            self.collect_firmware_events();
        }
    }
}

/// 受信フレームをエンジンに振り分ける
struct Inbound<'a> {
    file: &'a mut FileTransferEngine,
    firmware: &'a mut SmpEngine,
    events: &'a mut Vec<DeviceEvent>,
    /// エンジンが返した続きのメッセージ
    replies: Vec<TxMessage>,
}

impl Inbound<'_> {
    fn protocol_error(&mut self, message_type: MessageType, error: impl ToString) {
        let message = error.to_string();
        warn!("{:?}: {}", message_type, message);
        self.events.push(DeviceEvent::ProtocolError {
            message_type: Some(message_type),
            message,
        });
    }
}

impl Dispatcher for Inbound<'_> {
    fn dispatch(&mut self, message_type: MessageType, payload: &[u8]) {
        match message_type.sub_protocol() {
            SubProtocol::FileTransfer => {
                match self.file.handle(message_type, payload) {
                    Ok(replies) => self.replies.extend(replies),
                    Err(e) => self.protocol_error(message_type, e),
                }
                self.events
                    .extend(self.file.take_events().into_iter().map(DeviceEvent::File));
            }
            SubProtocol::Smp => {
                let requests = self.firmware.handle(payload);
                self.replies.extend(requests.into_iter().map(smp_frame));
                self.events.extend(
                    self.firmware
                        .take_events()
                        .into_iter()
                        .map(DeviceEvent::Firmware),
                );
            }
            SubProtocol::SensorData if message_type == MessageType::SensorData => {
                match parse_sensor_data(payload) {
                    Ok(data) => self.events.push(DeviceEvent::SensorData {
                        timestamp: data.timestamp.raw(),
                        readings: data
                            .readings
                            .into_iter()
                            .map(|(sensor_type, data)| SensorReading {
                                sensor_type,
                                data: data.to_vec(),
                            })
                            .collect(),
                    }),
                    Err(e) => self.protocol_error(message_type, e),
                }
            }
            _ => self.events.push(DeviceEvent::Message {
                message_type,
                payload: payload.to_vec(),
            }),
        }
    }
}

fn smp_frame(request: SmpRequest) -> TxMessage {
    TxMessage::with_data(MessageType::SmpMessage, request.bytes)
}
