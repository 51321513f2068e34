//! Path mapping between icon descriptors and file-tree paths
//!
//! The mapping is the contract both the sync coordinator and the consistency
//! auditor rely on for path identity, so it is a pure function of its inputs:
//! no I/O, no hidden state. Layout: `<format>/<size>/<iconName>.<format>`.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::IconfileDescriptor;

/// Rejection of a name or descriptor outside the configured vocabulary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("file format \"{0}\" is not allowed")]
    UnknownFormat(String),

    #[error("icon size \"{0}\" is not allowed")]
    UnknownSize(String),

    #[error("invalid icon name \"{0}\"")]
    InvalidIconName(String),

    #[error("path \"{0}\" does not map to an iconfile")]
    UnmappablePath(String),
}

/// Maps descriptors to relative tree paths and back.
///
/// Constructed from the allowed format/size vocabulary; both directions
/// validate against it so the two stores can never disagree on identity.
#[derive(Debug, Clone)]
pub struct PathMapper {
    formats: BTreeSet<String>,
    sizes: BTreeSet<String>,
}

impl PathMapper {
    pub fn new<I, J>(formats: I, sizes: J) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        Self {
            formats: formats.into_iter().map(Into::into).collect(),
            sizes: sizes.into_iter().map(Into::into).collect(),
        }
    }

    /// Validate a descriptor against the vocabulary.
    pub fn validate(&self, descriptor: &IconfileDescriptor) -> Result<(), MappingError> {
        if !self.formats.contains(&descriptor.format) {
            return Err(MappingError::UnknownFormat(descriptor.format.clone()));
        }
        if !self.sizes.contains(&descriptor.size) {
            return Err(MappingError::UnknownSize(descriptor.size.clone()));
        }
        Ok(())
    }

    /// Validate an icon name: non-empty, no path separators, no whitespace,
    /// no leading dot.
    pub fn validate_name(&self, name: &str) -> Result<(), MappingError> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0')
            || name.chars().any(char::is_whitespace)
        {
            return Err(MappingError::InvalidIconName(name.to_string()));
        }
        Ok(())
    }

    /// Map `(name, descriptor)` to its relative tree path.
    pub fn to_path(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<String, MappingError> {
        self.validate_name(icon_name)?;
        self.validate(descriptor)?;
        Ok(format!(
            "{}/{}/{}.{}",
            descriptor.format, descriptor.size, icon_name, descriptor.format
        ))
    }

    /// Exact inverse of [`to_path`](Self::to_path) over all valid paths.
    pub fn from_path(&self, path: &str) -> Result<(String, IconfileDescriptor), MappingError> {
        let unmappable = || MappingError::UnmappablePath(path.to_string());

        let mut segments = path.split('/');
        let (format, size, file_name) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(format), Some(size), Some(file), None) => (format, size, file),
            _ => return Err(unmappable()),
        };

        let icon_name = file_name
            .strip_suffix(&format!(".{format}"))
            .ok_or_else(unmappable)?;

        let descriptor = IconfileDescriptor::new(format, size);
        self.validate(&descriptor)?;
        self.validate_name(icon_name)?;
        Ok((icon_name.to_string(), descriptor))
    }
}
