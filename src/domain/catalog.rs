use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{BookId, EditionId, MemberId};

/// 版の形態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookFormat {
    Hardback,
    Paperback,
    Comic,
    Digital,
    Audio,
}

impl BookFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookFormat::Hardback => "HARDBACK",
            BookFormat::Paperback => "PAPERBACK",
            BookFormat::Comic => "COMIC",
            BookFormat::Digital => "DIGITAL",
            BookFormat::Audio => "AUDIO",
        }
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HARDBACK" => Ok(BookFormat::Hardback),
            "PAPERBACK" => Ok(BookFormat::Paperback),
            "COMIC" => Ok(BookFormat::Comic),
            "DIGITAL" => Ok(BookFormat::Digital),
            "AUDIO" => Ok(BookFormat::Audio),
            _ => Err(format!("Invalid book format: {}", s)),
        }
    }
}

/// 書籍（在庫サービス所有、貸出側からは読み取り専用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
}

/// 版
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    pub edition_id: EditionId,
    pub book_id: BookId,
    pub isbn: String,
    pub publisher: String,
    pub publication_year: i32,
    /// 版の表記（例: "2nd"）
    pub edition: String,
    pub format: BookFormat,
}

/// 会員（会員サービス所有）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub first_name: String,
    pub last_name: String,
}
