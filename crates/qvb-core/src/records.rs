use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::domain::UserId;

/// A verification code issued by the game-side registration flow, waiting to
/// be redeemed in chat. Consumed exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingVerification {
    pub code: String,
    pub uuid: String,
    pub name: String,
}

/// The persisted association between a QQ number and a game identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub qq: UserId,
    pub uuid: String,
    pub time: String,
    #[serde(default)]
    pub names: Vec<String>,
}

impl Binding {
    /// New binding stamped with the current local time, name history seeded
    /// with the name from the redeemed pending record.
    pub fn new(qq: UserId, uuid: String, name: String) -> Self {
        Self {
            qq,
            uuid,
            time: local_time_string(),
            names: vec![name],
        }
    }
}

/// A manually approved exception bypassing code verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub uuid: String,
    #[serde(default)]
    pub names: Vec<String>,
    pub reason: String,
}

/// Wire container: `{"records": [...]}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PendingRecords {
    #[serde(default)]
    pub records: Vec<PendingVerification>,
}

impl PendingRecords {
    pub fn position_by_code(&self, code: &str) -> Option<usize> {
        self.records.iter().position(|r| r.code == code)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&PendingVerification> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Remove and return the record for `name`, leaving all others intact.
    pub fn take_by_name(&mut self, name: &str) -> Option<PendingVerification> {
        let idx = self.records.iter().position(|r| r.name == name)?;
        Some(self.records.remove(idx))
    }
}

/// Wire container: `{"records": [...]}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BindingRecords {
    #[serde(default)]
    pub records: Vec<Binding>,
}

impl BindingRecords {
    pub fn find_by_qq(&self, qq: UserId) -> Option<&Binding> {
        self.records.iter().find(|b| b.qq == qq)
    }

    pub fn has_qq(&self, qq: UserId) -> bool {
        self.find_by_qq(qq).is_some()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Binding> {
        self.records
            .iter()
            .find(|b| b.names.iter().any(|n| n == name))
    }

    pub fn search_name(&self, fragment: &str) -> Vec<&Binding> {
        self.records
            .iter()
            .filter(|b| b.names.iter().any(|n| n.contains(fragment)))
            .collect()
    }
}

/// Wire container: `{"whitelist": [...]}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WhitelistRecords {
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntry>,
}

impl WhitelistRecords {
    /// Whether `name` already appears in any entry's name list.
    pub fn has_name(&self, name: &str) -> bool {
        self.whitelist
            .iter()
            .any(|e| e.names.iter().any(|n| n == name))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&WhitelistEntry> {
        self.whitelist
            .iter()
            .find(|e| e.names.iter().any(|n| n == name))
    }

    pub fn search_name(&self, fragment: &str) -> Vec<&WhitelistEntry> {
        self.whitelist
            .iter()
            .filter(|e| e.names.iter().any(|n| n.contains(fragment)))
            .collect()
    }
}

pub fn local_time_string() -> String {
    Local::now().format("%Y/%m/%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(code: &str, uuid: &str, name: &str) -> PendingVerification {
        PendingVerification {
            code: code.to_string(),
            uuid: uuid.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn pending_wire_field_is_records() {
        let book = PendingRecords {
            records: vec![pending("1234", "u1", "Alice")],
        };
        let json = serde_json::to_value(&book).unwrap();
        assert!(json.get("records").is_some());

        let back: PendingRecords =
            serde_json::from_str(r#"{"records":[{"code":"1234","uuid":"u1","name":"Alice"}]}"#)
                .unwrap();
        assert_eq!(back.records, book.records);
    }

    #[test]
    fn whitelist_wire_field_is_whitelist() {
        let json = r#"{"whitelist":[{"uuid":"u1","names":["Alice"],"reason":"manual"}]}"#;
        let back: WhitelistRecords = serde_json::from_str(json).unwrap();
        assert!(back.has_name("Alice"));
        assert!(!back.has_name("Bob"));
    }

    #[test]
    fn binding_names_default_to_empty_on_old_files() {
        let json = r#"{"records":[{"qq":10001,"uuid":"u1","time":"2026/01/01 00:00:00"}]}"#;
        let book: BindingRecords = serde_json::from_str(json).unwrap();
        assert!(book.find_by_qq(UserId(10001)).unwrap().names.is_empty());
    }

    #[test]
    fn take_by_name_removes_only_the_match() {
        let mut book = PendingRecords {
            records: vec![
                pending("1111", "u1", "Alice"),
                pending("2222", "u2", "Bob"),
                pending("3333", "u3", "Carol"),
            ],
        };

        let taken = book.take_by_name("Bob").unwrap();
        assert_eq!(taken.uuid, "u2");
        assert_eq!(book.records.len(), 2);
        assert!(book.find_by_name("Alice").is_some());
        assert!(book.find_by_name("Carol").is_some());
        assert!(book.take_by_name("Bob").is_none());
    }

    #[test]
    fn binding_search_matches_any_historical_name() {
        let mut binding = Binding::new(UserId(1), "u1".to_string(), "OldName".to_string());
        binding.names.push("NewName".to_string());
        let book = BindingRecords {
            records: vec![binding],
        };

        assert!(book.find_by_name("OldName").is_some());
        assert!(book.find_by_name("NewName").is_some());
        assert_eq!(book.search_name("Name").len(), 1);
        assert!(book.search_name("missing").is_empty());
    }
}
