use crate::domain::{Member, MemberId};
use crate::ports::{MemberDirectory, PortError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{build_client, get_json};

/// 会員サービスの GET /members/:id レスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberResponse {
    pub member_id: i64,
    pub first_name: String,
    pub last_name: String,
}

/// 会員サービスのREST APIを呼ぶMemberDirectory
pub struct HttpMemberDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMemberDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> std::result::Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MemberDirectory for HttpMemberDirectory {
    async fn get_member(&self, member_id: MemberId) -> Result<Member> {
        let url = format!("{}/members/{}", self.base_url, member_id);
        let response: MemberResponse = get_json(&self.client, url).await?;

        Ok(Member {
            member_id: MemberId::parse(response.member_id).map_err(PortError::unavailable)?,
            first_name: response.first_name,
            last_name: response.last_name,
        })
    }
}
