use serde::{Deserialize, Serialize};

/// QQ user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// QQ group id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Role of a member inside the target group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    /// Whether this role may use admin commands. Plain members may not.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_tier_is_not_elevated() {
        assert!(Role::Owner.is_elevated());
        assert!(Role::Admin.is_elevated());
        assert!(!Role::Member.is_elevated());
    }

    #[test]
    fn ids_serialize_as_raw_numbers() {
        let qq = UserId(10001);
        assert_eq!(serde_json::to_string(&qq).unwrap(), "10001");
        let back: UserId = serde_json::from_str("10001").unwrap();
        assert_eq!(back, qq);
    }
}
