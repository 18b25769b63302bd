//! 受信フレームのサブプロトコルへの振り分け

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use log::debug;
use wearlink_proto::{MessageType, SubProtocol};

/// 受信フレームの受け取り手
///
/// `ConnectionManager::receive` が 1 フレームごとに `dispatch` を呼び、
/// バッファを読み終えたら `batch_received` を 1 回呼ぶ。
pub trait Dispatcher {
    fn dispatch(&mut self, message_type: MessageType, payload: &[u8]);

    /// 1 回の受信バッファをすべて処理し終えた
    fn batch_received(&mut self) {}
}

/// ハンドラー関数
pub type Handler = Box<dyn FnMut(MessageType, &[u8])>;

/// サブプロトコルごとにクロージャを登録する `Dispatcher`
///
/// ハンドラーのないサブプロトコルのフレームはログに残して捨てる。
#[derive(Default)]
pub struct HandlerMap {
    handlers: BTreeMap<SubProtocol, Handler>,
    on_batch: Option<Box<dyn FnMut()>>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラーを登録する（同じサブプロトコルの既存ハンドラーは置き換える）
    pub fn register<F>(&mut self, sub_protocol: SubProtocol, handler: F)
    where
        F: FnMut(MessageType, &[u8]) + 'static,
    {
        self.handlers.insert(sub_protocol, Box::new(handler));
    }

    /// バッファ処理完了時のフックを登録する
    pub fn on_batch<F>(&mut self, hook: F)
    where
        F: FnMut() + 'static,
    {
        self.on_batch = Some(Box::new(hook));
    }

    pub fn unregister(&mut self, sub_protocol: SubProtocol) -> bool {
        self.handlers.remove(&sub_protocol).is_some()
    }
}

impl Dispatcher for HandlerMap {
    fn dispatch(&mut self, message_type: MessageType, payload: &[u8]) {
        match self.handlers.get_mut(&message_type.sub_protocol()) {
            Some(handler) => handler(message_type, payload),
            None => debug!(
                "no handler for {:?} ({} bytes)",
                message_type,
                payload.len()
            ),
        }
    }

    fn batch_received(&mut self) {
        if let Some(hook) = self.on_batch.as_mut() {
            hook();
        }
    }
}
