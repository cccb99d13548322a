use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 不正なID（0以下）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: i64,
}

impl fmt::Display for InvalidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The {} id must be a positive non-zero value (got {})",
            self.kind, self.value
        )
    }
}

impl std::error::Error for InvalidId {}

/// 各サービスのエンティティIDを定義する
///
/// IDはデータベースの採番（BIGSERIAL）に合わせてi64で保持する。
/// `parse`は外部入力用で、0以下の値を拒否する。
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// 採番済みの値から生成する（検証なし）
            pub const fn from_raw(value: i64) -> Self {
                Self(value)
            }

            /// 外部入力から生成する
            pub fn parse(value: i64) -> Result<Self, InvalidId> {
                if value <= 0 {
                    return Err(InvalidId { kind: $kind, value });
                }
                Ok(Self(value))
            }

            pub const fn value(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// 貸出ID - 貸出サービスの集約ID
    LoanId,
    "loan"
);
entity_id!(
    /// 会員ID - 会員サービスへの参照
    MemberId,
    "member"
);
entity_id!(
    /// 蔵書コピーID - 在庫サービスの集約ID
    EditionCopyId,
    "edition copy"
);
entity_id!(
    /// 版ID
    EditionId,
    "edition"
);
entity_id!(
    /// 書籍ID
    BookId,
    "book"
);

const BARCODE_PREFIX: &str = "LIB-";
const BARCODE_BODY_LENGTH: usize = 30;

/// バーコード
///
/// 不変条件：一度発行されたら変更されない。一意性はストア側のUNIQUE制約で保証する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Barcode(String);

impl Barcode {
    /// 新しいバーコードを発行する（`LIB-` + UUID先頭30文字の大文字）
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4().to_string().to_uppercase();
        let body: String = uuid.chars().take(BARCODE_BODY_LENGTH).collect();
        Self(format!("{BARCODE_PREFIX}{body}"))
    }

    /// 保存済みの値から復元する
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
