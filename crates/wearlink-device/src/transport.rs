//! トランスポート抽象

use core::fmt;

/// デバイスとのバイト列の通り道（BLE の characteristic など）
///
/// MTU や接続状態の変化、受信データはホストが `Device` のコールバックで報告する。
/// このトレイトは Rust 側からトランスポートを操作する方向だけを表す。
pub trait Transport {
    type Error: fmt::Display;

    /// 1 パケットを書き込む（書き終えてから戻る）
    fn write(&mut self, packet: &[u8]) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;

    fn connect(&mut self) -> Result<(), Self::Error>;

    fn disconnect(&mut self) -> Result<(), Self::Error>;
}
