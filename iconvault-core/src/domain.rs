//! Domain model for icon assets
//!
//! An icon is a named collection of renditions ("iconfiles"), each identified
//! by a (format, size) descriptor and carrying the raw content bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifies one rendition of an icon: a (format, size) pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IconfileDescriptor {
    /// File format, e.g. "svg" or "png"
    pub format: String,
    /// Rendition size, e.g. "24px"
    pub size: String,
}

impl IconfileDescriptor {
    pub fn new(format: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            size: size.into(),
        }
    }
}

impl fmt::Display for IconfileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.format, self.size)
    }
}

/// One rendition with its raw content bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iconfile {
    pub descriptor: IconfileDescriptor,
    pub content: Vec<u8>,
}

impl Iconfile {
    pub fn new(descriptor: IconfileDescriptor, content: Vec<u8>) -> Self {
        Self {
            descriptor,
            content,
        }
    }
}

/// Metadata of an icon, independent of its renditions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IconAttributes {
    /// Unique icon name
    pub name: String,
    /// User who last modified the icon
    pub modified_by: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Aggregate root: metadata plus all renditions with content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    #[serde(flatten)]
    pub attributes: IconAttributes,
    pub iconfiles: Vec<Iconfile>,
}

/// Content-free view of an icon: metadata plus rendition descriptors only.
///
/// This is what listing operations return; content is fetched separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconDescriptor {
    #[serde(flatten)]
    pub attributes: IconAttributes,
    pub iconfiles: Vec<IconfileDescriptor>,
}

impl IconDescriptor {
    /// Whether the given rendition descriptor is present.
    pub fn has_iconfile(&self, descriptor: &IconfileDescriptor) -> bool {
        self.iconfiles.iter().any(|d| d == descriptor)
    }
}
