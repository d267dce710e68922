use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 15;
pub const MAX_DESCRIPTION_LEN: usize = 3000;

/// Column values of a company, everything except the identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyFields {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub employees_count: i32,
    pub is_registered: bool,
    #[serde(rename = "type")]
    pub company_type: i32,
}

/// A persisted company.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanyRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: CompanyFields,
}

/// Company body as sent by the client, for both create and update. A
/// `None` field was left out of the JSON; the validator decides which ones a
/// create must carry and the [`UpdatePolicy`] decides what an update does
/// with them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub employees_count: Option<i32>,
    pub is_registered: Option<bool>,
    #[serde(rename = "type")]
    pub company_type: Option<i32>,
}

pub type CompanyInput = CompanyPayload;
pub type CompanyPatch = CompanyPayload;

impl CompanyPayload {
    /// Full-record overwrite: absent fields become empty or zero.
    pub fn overwrite(self) -> CompanyFields {
        CompanyFields {
            name: self.name.unwrap_or_default(),
            description: self.description,
            employees_count: self.employees_count.unwrap_or_default(),
            is_registered: self.is_registered.unwrap_or_default(),
            company_type: self.company_type.unwrap_or_default(),
        }
    }

    /// Absent fields keep the value from `current`.
    pub fn merge_onto(self, current: CompanyFields) -> CompanyFields {
        CompanyFields {
            name: self.name.unwrap_or(current.name),
            description: self.description.or(current.description),
            employees_count: self.employees_count.unwrap_or(current.employees_count),
            is_registered: self.is_registered.unwrap_or(current.is_registered),
            company_type: self.company_type.unwrap_or(current.company_type),
        }
    }
}

/// How an update payload is turned into the stored record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum UpdatePolicy {
    #[default]
    Overwrite,
    Merge,
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => write!(f, "overwrite"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "merge" => Ok(Self::Merge),
            other => Err(format!("unknown update policy {other:?}")),
        }
    }
}

impl TryFrom<String> for UpdatePolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
