use crate::domain::{Member, MemberId};
use crate::ports::{MemberDirectory as MemberDirectoryTrait, PortError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Mock implementation of MemberDirectory
///
/// Supports stateful testing by storing registered members.
/// When `accept_unknown` is set, any positive member id resolves to a placeholder name.
pub struct MemberDirectory {
    members: Mutex<HashMap<MemberId, Member>>,
    accept_unknown: bool,
}

impl MemberDirectory {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            accept_unknown: false,
        }
    }

    /// Directory that resolves every member id (for local runs without a member service)
    pub fn accepting_all() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            accept_unknown: true,
        }
    }

    /// Add a member for testing purposes
    pub fn add_member(&self, member_id: MemberId, first_name: &str, last_name: &str) {
        let member = Member {
            member_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(member_id, member);
    }
}

impl Default for MemberDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemberDirectoryTrait for MemberDirectory {
    async fn get_member(&self, member_id: MemberId) -> Result<Member> {
        let members = self.members.lock().unwrap_or_else(PoisonError::into_inner);

        match members.get(&member_id) {
            Some(member) => Ok(member.clone()),
            None if self.accept_unknown => Ok(Member {
                member_id,
                first_name: "Member".to_string(),
                last_name: member_id.to_string(),
            }),
            None => Err(PortError::NotFound(format!(
                "A member with the id {} could not be found",
                member_id
            ))),
        }
    }
}
