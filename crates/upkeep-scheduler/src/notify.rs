//! Notification model: alerts surfaced to a user or a role.
//! Delivery is by polling the store; an optional broadcast hook exists for
//! in-process push consumers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use upkeep_core::UpkeepError;

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient: Recipient,
    pub kind: NotificationKind,
    /// Title/summary.
    pub title: String,
    /// Body content.
    pub message: String,
    /// Maintenance record this refers to, if any.
    pub record_id: Option<String>,
    pub asset_id: Option<String>,
    pub priority: NotifyPriority,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub record_id: Option<String>,
    pub asset_id: Option<String>,
    pub priority: NotifyPriority,
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Recipient {
    User(String),
    Role(String),
}

impl Recipient {
    /// Parse a comma-separated list such as `user:alice,role:maintenance`.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, UpkeepError> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Role(name) => write!(f, "role:{name}"),
        }
    }
}

impl FromStr for Recipient {
    type Err = UpkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some(("user", id)) if !id.is_empty() => Ok(Self::User(id.to_string())),
            Some(("role", name)) if !name.is_empty() => Ok(Self::Role(name.to_string())),
            _ => Err(UpkeepError::Validation(format!(
                "recipient must be 'user:<id>' or 'role:<name>', got '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for Recipient {
    type Error = UpkeepError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Recipient> for String {
    fn from(value: Recipient) -> Self {
        value.to_string()
    }
}

/// What a notification is about. Only `Maintenance` is produced by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Maintenance,
    StatusChange,
    Assignment,
    Alert,
    Info,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::StatusChange => "status_change",
            Self::Assignment => "assignment",
            Self::Alert => "alert",
            Self::Info => "info",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = UpkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maintenance" => Ok(Self::Maintenance),
            "status_change" => Ok(Self::StatusChange),
            "assignment" => Ok(Self::Assignment),
            "alert" => Ok(Self::Alert),
            "info" => Ok(Self::Info),
            _ => Err(UpkeepError::Validation(format!("unknown notification type '{s}'"))),
        }
    }
}

/// Notification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl NotifyPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for NotifyPriority {
    type Err = UpkeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(UpkeepError::Validation(format!("unknown priority '{s}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_parse() {
        assert_eq!("user:alice".parse::<Recipient>().unwrap(), Recipient::User("alice".into()));
        assert_eq!(
            "role:maintenance".parse::<Recipient>().unwrap(),
            Recipient::Role("maintenance".into())
        );
        assert!("alice".parse::<Recipient>().is_err());
        assert!("user:".parse::<Recipient>().is_err());
        assert!("group:ops".parse::<Recipient>().is_err());
    }

    #[test]
    fn test_recipient_list() {
        let list = Recipient::parse_list("user:bob, role:ops,").unwrap();
        assert_eq!(list, vec![Recipient::User("bob".into()), Recipient::Role("ops".into())]);
        assert!(Recipient::parse_list("user:bob,nobody").is_err());
    }

    #[test]
    fn test_recipient_serializes_as_string() {
        let json = serde_json::to_string(&Recipient::Role("ops".into())).unwrap();
        assert_eq!(json, "\"role:ops\"");
        let back: Recipient = serde_json::from_str("\"user:7\"").unwrap();
        assert_eq!(back, Recipient::User("7".into()));
        assert!(serde_json::from_str::<Recipient>("\"7\"").is_err());
    }

    #[test]
    fn test_kind_and_priority_text() {
        assert_eq!("status_change".parse::<NotificationKind>().unwrap(), NotificationKind::StatusChange);
        assert_eq!(NotifyPriority::High.as_str(), "high");
        assert_eq!("normal".parse::<NotifyPriority>().unwrap(), NotifyPriority::Medium);
    }
}
