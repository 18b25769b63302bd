//! 要求/応答の対応付けに使う識別子

/// エンジンが要求ごとに払い出す識別子
///
/// ワイヤ上には載らない。応答がどの要求に対応したかをイベントで報告するために使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestId(pub u32);

impl RequestId {
    /// 現在の値を返し、カウンタを 1 進める
    pub fn next(counter: &mut RequestId) -> RequestId {
        let id = *counter;
        counter.0 = counter.0.wrapping_add(1);
        id
    }
}
