//! Defines the boundary towards the directory server.
//!
//! The registry never speaks the LDAP wire protocol itself. It is handed an implementation of
//! the [Directory] trait by the embedding application and only assumes one primitive: a search
//! below a base DN with a scope and an RFC 4515 filter, yielding raw [Record]s. This keeps the
//! whole crate testable against an in-memory double and keeps the choice of LDAP client (and
//! its connection handling) out of scope.
//!
//! Raw attribute values are byte strings, as that is what a directory actually delivers
//! (jpegPhoto being the prominent non-textual case). [Record] provides the typed accessors the
//! extraction layer builds on.
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Contains the maximal duration we await a single directory search.
///
/// Searches taking longer are treated like an unreachable directory.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Enumerates the standard LDAP search scopes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Scope {
    /// Matches only the base entry itself.
    Base,

    /// Matches the direct children of the base entry.
    OneLevel,

    /// Matches the whole subtree below (and including) the base entry.
    Subtree,
}

/// Represents a raw directory entry: its DN plus a multi-valued attribute map.
#[derive(Clone, Debug)]
pub struct Record {
    dn: String,
    attrs: HashMap<String, Vec<Vec<u8>>>,
}

impl Record {
    /// Creates a new record for the given DN and attributes.
    pub fn new(dn: String, attrs: HashMap<String, Vec<Vec<u8>>>) -> Self {
        Record { dn, attrs }
    }

    /// Returns the distinguished name of this entry.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Returns the raw values of the given attribute, if present (and non-empty).
    pub fn attr(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.attrs
            .get(name)
            .map(|values| values.as_slice())
            .filter(|values| !values.is_empty())
    }

    /// Returns the first value of the given attribute as UTF-8 string.
    ///
    /// Values with invalid UTF-8 are treated as absent.
    pub fn first_str(&self, name: &str) -> Option<&str> {
        self.attr(name)
            .and_then(|values| values.first())
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Returns all values of the given attribute as UTF-8 strings, skipping invalid ones.
    pub fn strs(&self, name: &str) -> Vec<&str> {
        self.attr(name)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| std::str::from_utf8(value).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Interprets the first value of the given attribute as a boolean flag.
    ///
    /// Directory servers commonly store booleans as `TRUE` / `FALSE`, some schemas use
    /// `YES` / `NO`. Returns **None** if the attribute is absent or unparsable.
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.first_str(name)?.to_ascii_uppercase().as_str() {
            "TRUE" | "YES" => Some(true),
            "FALSE" | "NO" => Some(false),
            _ => None,
        }
    }
}

/// Escapes a value for embedding in an RFC 4515 search filter.
///
/// This prevents identifiers taken from URLs or DNs from altering the structure of the filter
/// they are spliced into.
pub fn escape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            _ => result.push(ch),
        }
    }

    result
}

/// Describes the search primitive the registry requires from a directory client.
///
/// Implementations are expected to be cheap to call concurrently (a connection pool or an
/// internally synchronized connection). Errors are reported via [anyhow::Result]; the registry
/// maps any failure to its *directory unavailable* error and, where possible, keeps serving
/// stale data.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Performs a search below `base` with the given `scope` and RFC 4515 `filter`.
    async fn search(&self, base: &str, scope: Scope, filter: &str)
        -> anyhow::Result<Vec<Record>>;
}
