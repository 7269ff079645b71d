//! Contains the typed entities served by the registry.
//!
//! These are plain immutable values. They are produced in one piece by the resolver and then
//! swapped into the cache atomically, therefore readers never observe a partially updated
//! entity. Relations between entities are kept as lightweight references ([PersonRef],
//! [GroupRef]) rather than nested documents, mirroring the link-based representation the HTTP
//! layer emits.

/// Names the role a person plays within a project group.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    /// The principal investigator of the project.
    Pi,

    /// An owner of the group (can administer membership).
    Owner,

    /// An ordinary member.
    Member,
}

impl Role {
    /// Returns the wire name of this role as used in link relations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pi => "pi",
            Role::Owner => "owner",
            Role::Member => "member",
        }
    }
}

/// A resolved reference to a person (enough to render a link with a human readable label).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PersonRef {
    /// The uid of the person.
    pub id: String,

    /// The full name of the person.
    pub name: String,
}

/// A reference to a group, used when reporting a person's involvements.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupRef {
    /// The cn of the group.
    pub id: String,

    /// The human readable name of the group.
    pub name: String,
}

/// A project group as resolved from the directory.
#[derive(Clone, Debug)]
pub struct Group {
    /// The cn of the group, which is also its identifier in the REST facade.
    pub id: String,

    /// Determines if the project is currently active.
    pub active: bool,

    /// An optional free-text description.
    pub description: Option<String>,

    /// The preliminary study identifiers assigned to this project.
    pub prelims: Vec<String>,

    /// The principal investigator, if one is recorded.
    pub pi: Option<PersonRef>,

    /// The owners of the group.
    pub owners: Vec<PersonRef>,

    /// The members of the group.
    pub members: Vec<PersonRef>,
}

impl Group {
    /// Yields the name used when labelling links pointing at this group.
    pub fn name(&self) -> &str {
        &self.id
    }
}

/// A person as resolved from the directory.
#[derive(Clone, Debug)]
pub struct Person {
    /// The uid of the person, which is also their identifier in the REST facade.
    pub id: String,

    /// The full name.
    pub name: String,

    /// The primary mail address.
    pub mail: String,

    /// The job title, if recorded.
    pub title: Option<String>,

    /// Determines if this account belongs to an actual human (as opposed to a
    /// service or shared account).
    pub human: bool,

    /// Determines if the account is currently active.
    pub active: bool,

    /// The decoded JPEG portrait, if one is stored.
    pub photo: Option<Vec<u8>>,
}
