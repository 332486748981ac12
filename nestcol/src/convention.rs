use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::NestcolError;

/// Physical layout used for list fields.
///
/// The convention is chosen once per file; every list in the schema uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListConvention {
    /// 2-level layout: the repeated node holds the element value directly.
    /// Elements can't be null, only the list as a whole can be absent.
    #[default]
    Legacy,
    /// 3-level layout: a repeated `list` group wraps an `element` field which may
    /// be nullable.
    Standard,
}

impl ListConvention {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            ListConvention::Legacy => 0,
            ListConvention::Standard => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ListConvention::Legacy),
            1 => Some(ListConvention::Standard),
            _ => None,
        }
    }

    /// Whether a list element may be null under this convention, given the
    /// element's own `required` flag.
    pub fn element_nullable(&self, element_required: bool) -> bool {
        match self {
            ListConvention::Legacy => false,
            ListConvention::Standard => !element_required,
        }
    }
}

impl fmt::Display for ListConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListConvention::Legacy => write!(f, "legacy"),
            ListConvention::Standard => write!(f, "standard"),
        }
    }
}

impl FromStr for ListConvention {
    type Err = NestcolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "2-level" | "two-level" => Ok(ListConvention::Legacy),
            "standard" | "3-level" | "three-level" => Ok(ListConvention::Standard),
            _ => Err(NestcolError::InvalidOption {
                key: "list-convention".to_string(),
                value: s.to_string(),
            }),
        }
    }
}
