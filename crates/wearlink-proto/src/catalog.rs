//! 型インデックス ⇔ enum の変換（メッセージ種別カタログ）

/// 閉じたメッセージ種別カタログ
///
/// 各サブプロトコルは自分のカタログ enum を持ち、
/// ワイヤ上の 1 バイト型インデックスはこのカタログで解決する。
pub trait Catalog: Copy + Sized + 'static {
    /// 型インデックスから種別を解決する（範囲外なら `None`）
    fn from_index(index: u8) -> Option<Self>;

    /// ワイヤ上の型インデックス
    fn index(self) -> u8;

    /// ログ出力用の名前
    fn name(self) -> &'static str;
}

/// 連番の型インデックスを持つカタログ enum を定義する
///
/// 宣言順がそのままワイヤ上のインデックス（0 始まり）になる。
#[macro_export]
macro_rules! catalog {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// カタログの全要素（インデックス順）
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl $crate::Catalog for $name {
            fn from_index(index: u8) -> Option<Self> {
                Self::ALL.get(index as usize).copied()
            }

            fn index(self) -> u8 {
                self as u8
            }

            fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => stringify!($variant) ),+
                }
            }
        }
    };
}
