//! In-memory port implementations and tmp-file helpers shared by the core
//! test modules.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    sync::Mutex,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    domain::{GroupId, Role, UserId},
    ports::{GroupMember, GroupMembershipOracle, MessageTransport},
    store::RecordStore,
    Result,
};

/// A store backed by a unique path under `/tmp` that does not exist yet.
pub(crate) fn temp_store<T>(prefix: &str) -> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    RecordStore::new(
        "test",
        Some(PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}-{n}.json"))),
    )
}

/// Oracle answering from fixed member/role tables.
#[derive(Default)]
pub(crate) struct FixedOracle {
    pub members: Vec<GroupMember>,
    pub roles: HashMap<UserId, Role>,
    pub member_calls: AtomicUsize,
}

impl FixedOracle {
    pub fn with_members(users: &[UserId]) -> Self {
        Self {
            members: users
                .iter()
                .map(|&user_id| GroupMember {
                    user_id,
                    card: String::new(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_role(user: UserId, role: Role) -> Self {
        let mut oracle = Self::default();
        oracle.roles.insert(user, role);
        oracle
    }
}

#[async_trait]
impl GroupMembershipOracle for FixedOracle {
    async fn group_members(&self, _group: GroupId) -> Result<Vec<GroupMember>> {
        self.member_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.members.clone())
    }

    async fn member_role(&self, _group: GroupId, user: UserId) -> Result<Option<Role>> {
        Ok(self.roles.get(&user).copied())
    }
}

/// Transport that records every outbound private message.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub sent: Mutex<Vec<(UserId, String)>>,
}

impl RecordingTransport {
    pub fn replies_to(&self, user: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send_private(&self, user: UserId, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((user, text.to_string()));
        Ok(())
    }
}
