//! ブラウザコンソールへの `log` 出力

use log::{Level, LevelFilter, Log, Metadata, Record};
use wasm_bindgen::prelude::*;
use web_sys::console;

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            Level::Error => console::error_1(&line),
            Level::Warn => console::warn_1(&line),
            Level::Info => console::info_1(&line),
            Level::Debug => console::debug_1(&line),
            Level::Trace => console::log_1(&line),
        }
    }

    fn flush(&self) {}
}

/// ログレベル名（"off", "error", "warn", "info", "debug", "trace"、大文字小文字を問わない）
pub fn level_filter(level: &str) -> Option<LevelFilter> {
    level.parse().ok()
}

/// `log` の出力先をブラウザコンソールにする
///
/// 2 回目以降の呼び出しはレベルだけを変更する。
///
/// # エラー
/// - 未知のレベル名
#[wasm_bindgen]
pub fn init_logger(level: &str) -> Result<(), JsError> {
    let filter =
        level_filter(level).ok_or_else(|| JsError::new(&format!("Unknown log level: {}", level)))?;
    // 登録済みなら Err が返るだけ
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(filter);
    Ok(())
}
