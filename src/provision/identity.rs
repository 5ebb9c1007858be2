//! Resource identities
//!
//! Display names from the sheet become lowercase-hyphen tokens used as the
//! remote primary key of APIs, operations, products and tags.

use super::error::ProvisionError;
use std::fmt;

/// Canonicalize a display string into `[a-z0-9-]` with no leading, trailing or
/// doubled hyphens.
///
/// Returns an empty string when the input has no ASCII alphanumerics at all.
/// Fails with [`ProvisionError::InvalidIdentitySource`] when the input is blank.
pub fn sanitize(text: &str) -> Result<String, ProvisionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProvisionError::InvalidIdentitySource(text.to_string()));
    }

    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            // Any other character (including '-') starts or continues a separator run
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }

    Ok(out)
}

/// A sanitized, non-empty identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Derive an identity from a display name
    pub fn derive(display: &str) -> Result<Self, ProvisionError> {
        let id = sanitize(display)?;
        if id.is_empty() {
            return Err(ProvisionError::InvalidIdentitySource(display.to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
