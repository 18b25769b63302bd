//! 複数デバイスの管理
//!
//! アプリケーションが所有する明示的なオブジェクト。グローバルな状態は持たない。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use log::info;
use wearlink_transport::ConnectionStatus;

use crate::device::Device;
use crate::event::DeviceEvent;
use crate::transport::Transport;

/// ID（BLE アドレスなど）をキーにしたデバイス表
pub struct DeviceRegistry<T: Transport> {
    devices: BTreeMap<String, Device<T>>,
}

impl<T: Transport> DeviceRegistry<T> {
    pub fn new() -> Self {
        DeviceRegistry {
            devices: BTreeMap::new(),
        }
    }

    /// デバイスを登録する（同じ ID の既存デバイスを返す）
    pub fn insert(&mut self, id: impl Into<String>, device: Device<T>) -> Option<Device<T>> {
        let id = id.into();
        info!("registering device {}", id);
        self.devices.insert(id, device)
    }

    pub fn get(&self, id: &str) -> Option<&Device<T>> {
        self.devices.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Device<T>> {
        self.devices.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Device<T>> {
        self.devices.remove(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// 接続中のデバイスの ID（ID 順）
    pub fn connected_ids(&self) -> Vec<&str> {
        self.devices
            .iter()
            .filter(|(_, device)| device.status() == ConnectionStatus::Connected)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// すべてのデバイスの定期処理を行う
    pub fn tick_all(&mut self, now_ms: u64) {
        for device in self.devices.values_mut() {
            device.tick(now_ms);
        }
    }

    /// すべてのデバイスのイベントを ID 付きで取り出す
    pub fn take_all_events(&mut self) -> Vec<(String, DeviceEvent)> {
        let mut events = Vec::new();
        for (id, device) in self.devices.iter_mut() {
            events.extend(device.take_events().into_iter().map(|e| (id.clone(), e)));
        }
        events
    }
}

impl<T: Transport> Default for DeviceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
