use async_trait::async_trait;

use crate::{
    domain::{GroupId, Role, UserId},
    Result,
};

/// Outbound side of the chat protocol client.
///
/// OneBot/napcat is the first implementation; the shape is small enough that
/// other QQ protocol clients can fit behind it.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_private(&self, user: UserId, text: &str) -> Result<()>;
}

/// A member of the target group as reported by the protocol client.
#[derive(Clone, Debug)]
pub struct GroupMember {
    pub user_id: UserId,
    pub card: String,
}

/// Group membership / role lookups.
///
/// Implementations must query the live group state on every call: the
/// verification flow depends on seeing a join immediately, so no caching.
#[async_trait]
pub trait GroupMembershipOracle: Send + Sync {
    async fn group_members(&self, group: GroupId) -> Result<Vec<GroupMember>>;

    /// The sender's role in the group, or `None` if they are not a member.
    async fn member_role(&self, group: GroupId, user: UserId) -> Result<Option<Role>>;
}
