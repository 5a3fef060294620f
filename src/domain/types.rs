//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "record_status", rename_all = "snake_case")]
pub enum RecordStatus {
    Enabled,
    Disabled,
}

impl RecordStatus {
    pub fn is_enabled(self) -> bool {
        matches!(self, RecordStatus::Enabled)
    }
}

/// Fixed filesystem root categories the path resolver maps URLs
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    Code,
    Content,
    Uploads,
    Admin,
    Includes,
    Home,
}

impl RootKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RootKind::Code => "code",
            RootKind::Content => "content",
            RootKind::Uploads => "uploads",
            RootKind::Admin => "admin",
            RootKind::Includes => "includes",
            RootKind::Home => "home",
        }
    }
}

/// Bulk state-change verbs accepted by the admin façade. `Delete` is
/// a sentinel: it resets the item for re-evaluation rather than
/// removing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStateChange {
    Enable,
    Disable,
    Delete,
}

impl TryFrom<&str> for ItemStateChange {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "enabled" | "enable" => Ok(ItemStateChange::Enable),
            "disabled" | "disable" => Ok(ItemStateChange::Disable),
            "delete" => Ok(ItemStateChange::Delete),
            _ => Err(()),
        }
    }
}
