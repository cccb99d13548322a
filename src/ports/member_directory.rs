use crate::domain::{Member, MemberId};
use async_trait::async_trait;

use super::Result;

/// 会員サービスポート
///
/// 貸出コンテキストは会員の氏名をスナップショットとして保持するだけで、
/// 会員情報そのものは所有しない。
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// 会員を取得する（存在しない場合は`PortError::NotFound`）
    async fn get_member(&self, member_id: MemberId) -> Result<Member>;
}
