//! Column schema for the listing rule engine (§4.6, §6 "persisted
//! server-type file").

use serde::{Deserialize, Serialize};

/// A well-known column a rule can assign into. Mirrors the fixed set of
/// facts a [`crate::ftp::types::FtpEntry`] can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnId {
    Name,
    Size,
    Permissions,
    Owner,
    Group,
    LinkTarget,
    IsDir,
    IsLink,
    IsDevice,
    Day,
    Month,
    Year,
    Time,
    YearAssumed,
}

impl ColumnId {
    pub fn from_name(s: &str) -> Option<Self> {
        Some(match s {
            "name" => Self::Name,
            "size" => Self::Size,
            "permissions" => Self::Permissions,
            "owner" => Self::Owner,
            "group" => Self::Group,
            "link_target" => Self::LinkTarget,
            "is_dir" => Self::IsDir,
            "is_link" => Self::IsLink,
            "is_device" => Self::IsDevice,
            "day" => Self::Day,
            "month" => Self::Month,
            "year" => Self::Year,
            "time" => Self::Time,
            "year_assumed" => Self::YearAssumed,
            _ => return None,
        })
    }
}

/// One column's declared shape, as persisted in a `.str` server-type file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub id: ColumnId,
    /// Literal display name, when the column isn't one of the well-known
    /// name/size/date/etc. facts (e.g. a server-specific attribute).
    pub display_name: Option<String>,
    pub type_tag: ColumnTypeTag,
    pub description: String,
    pub empty_value: String,
    pub align_right: bool,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnTypeTag {
    Text,
    Number,
    Bool,
    Date,
}

/// Value assigned to a column while evaluating one rule against one line.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Str(String),
    Num(i64),
    Bool(bool),
    Unset,
}

impl ColumnValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<i64> {
        match self {
            ColumnValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}
