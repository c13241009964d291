//! DICOM attribute addressing and rule types
//!
//! [`TagAddress`] is the `(group, element)` pair every rule resolves to. It
//! serializes as the conventional `(GGGG,EEEE)` text form so compiled rules,
//! rule scripts and audit payloads all read the same way.

use dicom_core::Tag;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A DICOM attribute address
///
/// # Examples
///
/// ```
/// use dicom_deid::domain::TagAddress;
/// use std::str::FromStr;
///
/// let tag = TagAddress::from_str("(0010,0010)").unwrap();
/// assert_eq!(tag, TagAddress::new(0x0010, 0x0010));
/// assert_eq!(tag.to_string(), "(0010,0010)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagAddress {
    group: u16,
    element: u16,
}

impl TagAddress {
    /// Creates a tag address from its group and element numbers
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// Group number
    pub fn group(&self) -> u16 {
        self.group
    }

    /// Element number
    pub fn element(&self) -> u16 {
        self.element
    }

    /// Private tags have odd group numbers
    pub fn is_private(&self) -> bool {
        self.group % 2 != 0
    }
}

impl fmt::Display for TagAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

impl FromStr for TagAddress {
    type Err = String;

    /// Accepts `(GGGG,EEEE)`, `GGGG,EEEE` and `GGGGEEEE` (hex, case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (group, element) = match trimmed.split_once(',') {
            Some((g, e)) => (g.trim(), e.trim()),
            None if trimmed.len() == 8 => trimmed.split_at(4),
            None => return Err(format!("Invalid DICOM tag '{s}'")),
        };

        let parse = |part: &str| {
            if part.len() != 4 {
                return Err(format!("Invalid DICOM tag '{s}': expected 4 hex digits"));
            }
            u16::from_str_radix(part, 16).map_err(|e| format!("Invalid DICOM tag '{s}': {e}"))
        };

        Ok(Self::new(parse(group)?, parse(element)?))
    }
}

impl From<Tag> for TagAddress {
    fn from(tag: Tag) -> Self {
        Self::new(tag.group(), tag.element())
    }
}

impl From<TagAddress> for Tag {
    fn from(tag: TagAddress) -> Self {
        Tag(tag.group, tag.element)
    }
}

impl Serialize for TagAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TagAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TagAddress::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// What a rule does to its tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum TagAction {
    /// The attribute must not be present in the output
    Remove,
    /// The attribute must be present with exactly this value
    Replace(String),
}

impl TagAction {
    /// Short action name used in scripts and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            TagAction::Remove => "remove",
            TagAction::Replace(_) => "replace",
        }
    }
}

/// A single compiled rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRule {
    /// Resolved attribute address
    pub tag: TagAddress,

    /// Dictionary keyword, when one is known
    pub keyword: Option<String>,

    /// Action to apply
    pub action: TagAction,
}

impl TagRule {
    /// Creates a removal rule
    pub fn remove(tag: TagAddress, keyword: Option<String>) -> Self {
        Self {
            tag,
            keyword,
            action: TagAction::Remove,
        }
    }

    /// Creates a replacement rule
    pub fn replace(tag: TagAddress, keyword: Option<String>, value: impl Into<String>) -> Self {
        Self {
            tag,
            keyword,
            action: TagAction::Replace(value.into()),
        }
    }

    /// `(GGGG,EEEE) Keyword`, or just the address for unnamed tags
    pub fn label(&self) -> String {
        match &self.keyword {
            Some(keyword) => format!("{} {}", self.tag, keyword),
            None => self.tag.to_string(),
        }
    }
}
