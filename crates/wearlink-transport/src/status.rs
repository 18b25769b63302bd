//! 接続状態

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionStatus {
    #[default]
    NotConnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionStatus {
    /// `self → next` が許可された遷移かどうか
    ///
    /// 許可される辺は次の 5 本だけ:
    /// NotConnected→Connecting, Connecting→Connected, Connecting→NotConnected,
    /// Connected→Disconnecting, Disconnecting→NotConnected
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (NotConnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, NotConnected)
                | (Connected, Disconnecting)
                | (Disconnecting, NotConnected)
        )
    }

    /// 送信を受け付ける状態か（接続処理中の問い合わせも許可する）
    pub fn accepts_sends(self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Connected)
    }

    /// `NotConnected` までの最短の合法な経路（自身を含まない）
    pub fn path_to_disconnected(self) -> &'static [ConnectionStatus] {
        use ConnectionStatus::*;
        match self {
            NotConnected => &[],
            Connecting | Disconnecting => &[NotConnected],
            Connected => &[Disconnecting, NotConnected],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionStatus::*;

    const ALL: [ConnectionStatus; 4] = [NotConnected, Connecting, Connected, Disconnecting];

    #[test]
    fn test_exactly_five_legal_edges() {
        let legal: alloc::vec::Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            legal,
            alloc::vec![
                (NotConnected, Connecting),
                (Connecting, NotConnected),
                (Connecting, Connected),
                (Connected, Disconnecting),
                (Disconnecting, NotConnected),
            ]
        );
    }

    #[test]
    fn test_no_self_loops() {
        for s in ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn test_path_to_disconnected_uses_legal_edges() {
        for start in ALL {
            let mut current = start;
            for next in start.path_to_disconnected() {
                assert!(current.can_transition_to(*next), "{:?} -> {:?}", current, next);
                current = *next;
            }
            assert_eq!(current, NotConnected);
        }
    }

    #[test]
    fn test_accepts_sends() {
        assert!(!NotConnected.accepts_sends());
        assert!(Connecting.accepts_sends());
        assert!(Connected.accepts_sends());
        assert!(!Disconnecting.accepts_sends());
    }
}
