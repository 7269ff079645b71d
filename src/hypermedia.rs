//! Renders references between resources as hypermedia link objects.
//!
//! A link is a small JSON object of the shape `{href, rel?, rev?, value?}`:
//!
//! * **href** points at the referenced resource,
//! * **rel** names the relation from the current document to the target,
//! * **rev** names the reverse relation (used for a person's involvements, where the role is
//!   a property of the *group*, not of the person document it appears in),
//! * **value** carries an optional human readable label.
//!
//! At least one of rel/rev must be present, otherwise a client cannot interpret the link.
//! Encoding is a pure function of the link: no cache access, no directory access, and the
//! field order is fixed so that repeated encodings are byte-identical.
use serde_json::{json, Map, Value};

/// Represents a single hypermedia link.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Link {
    /// The target of the link.
    pub href: String,

    /// The forward relation name, if any.
    pub rel: Option<String>,

    /// The reverse relation name, if any.
    pub rev: Option<String>,

    /// An optional human readable label.
    pub value: Option<String>,
}

impl Link {
    /// Creates a link pointing at the group with the given cn, using the default
    /// **group** relation.
    pub fn group(id: &str) -> Self {
        Link {
            href: format!("/groups/{}", id),
            rel: Some("group".to_owned()),
            rev: None,
            value: None,
        }
    }

    /// Creates a link pointing at the person with the given uid, using the default
    /// **person** relation.
    pub fn person(id: &str) -> Self {
        Link {
            href: format!("/people/{}", id),
            rel: Some("person".to_owned()),
            rev: None,
            value: None,
        }
    }

    /// Creates a link pointing at the photo of the person with the given uid.
    pub fn photo(id: &str) -> Self {
        Link {
            href: format!("/people/{}/photo", id),
            rel: Some("photo".to_owned()),
            rev: None,
            value: None,
        }
    }

    /// Replaces the forward relation name.
    pub fn rel(mut self, rel: &str) -> Self {
        self.rel = Some(rel.to_owned());
        self
    }

    /// Replaces the relation by a reverse relation name.
    pub fn rev(mut self, rev: &str) -> Self {
        self.rel = None;
        self.rev = Some(rev.to_owned());
        self
    }

    /// Attaches a human readable label.
    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_owned());
        self
    }

    /// Encodes this link as a JSON object, omitting absent fields.
    pub fn to_json(&self) -> Value {
        debug_assert!(
            self.rel.is_some() || self.rev.is_some(),
            "A link requires at least one of rel/rev!"
        );

        // serde_json is compiled with preserve_order off, so a Map is sorted by key and the
        // rendered field order is stable across encodings.
        let mut object = Map::new();
        let _ = object.insert("href".to_owned(), json!(self.href));
        if let Some(rel) = &self.rel {
            let _ = object.insert("rel".to_owned(), json!(rel));
        }
        if let Some(rev) = &self.rev {
            let _ = object.insert("rev".to_owned(), json!(rev));
        }
        if let Some(value) = &self.value {
            let _ = object.insert("value".to_owned(), json!(value));
        }

        Value::Object(object)
    }
}
