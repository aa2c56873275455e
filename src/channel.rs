//! # Channel names.
//!
//! [`ChannelName`] is the canonical identity of a tracked room. Every name that
//! enters the runtime (CLI input, stored records, orchestrator calls) passes
//! through [`ChannelName::new`] first, so storage keys and registry keys can never
//! disagree on case or punctuation.
//!
//! ## Rules
//! - lowercased and trimmed;
//! - every character outside `[a-z0-9_]` becomes `_`;
//! - the empty name is rejected.
//!
//! ```rust
//! use roomvisor::ChannelName;
//!
//! let name = ChannelName::new("Foo_Bar").unwrap();
//! assert_eq!(name.as_str(), "foo_bar");
//! assert_eq!(name.table_name(), "events_foo_bar");
//! ```

use std::fmt;
use std::sync::Arc;

/// Prefix for per-channel event tables.
pub const TABLE_PREFIX: &str = "events_";

/// Sanitized, case-normalized channel name.
///
/// Cheap to clone (backed by `Arc<str>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(Arc<str>);

impl ChannelName {
    /// Normalizes `raw` into a channel name.
    ///
    /// Returns `None` if nothing is left after trimming.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let sanitized: String = trimmed
            .chars()
            .flat_map(char::to_lowercase)
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Some(Self(sanitized.into()))
    }

    /// Returns the sanitized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the per-channel event table (safe to interpolate into SQL).
    pub fn table_name(&self) -> String {
        format!("{TABLE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ChannelName> for Arc<str> {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

impl From<&ChannelName> for Arc<str> {
    fn from(name: &ChannelName) -> Self {
        Arc::clone(&name.0)
    }
}
