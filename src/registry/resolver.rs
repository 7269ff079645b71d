//! Turns raw directory records into typed entities.
//!
//! Extraction is split into pure parsing (record in, entity or error out - easily unit tested)
//! and the async resolution wrappers which perform the search and, for groups, resolve the
//! referenced people through the cache. A dangling reference (a DN outside the people subtree,
//! a deleted person or a record we cannot parse) is logged and skipped so that one broken
//! member never takes a whole group down. Only an unreachable directory aborts the resolution,
//! as in that case everything else would fail anyway and the caller is better served by its
//! stale fallback.
use crate::directory::{escape, Record, Scope};
use crate::model::{Group, Person, PersonRef};
use crate::registry::{Registry, RegistryError};
use anyhow::{anyhow, Context};
use base64::Engine;

const GROUP_CLASSES: &str = "(objectClass=posixGroup)(objectClass=sangerHumgenProjectGroup)";
const PERSON_CLASS: &str = "(objectClass=posixAccount)";

/// The filter which enumerates all project groups during seeding.
pub(crate) fn group_seed_filter() -> String {
    format!("(&{})", GROUP_CLASSES)
}

/// The filter which enumerates all people during seeding.
pub(crate) fn person_seed_filter() -> String {
    PERSON_CLASS.to_owned()
}

/// Extracts a [Person] from a raw record.
pub(crate) fn parse_person(record: &Record) -> anyhow::Result<Person> {
    let id = required(record, "uid")?;
    let name = required(record, "cn")?;
    let mail = required(record, "mail")?;

    let photo = match record.attr("jpegPhoto").and_then(|values| values.first()) {
        Some(value) => Some(
            base64::engine::general_purpose::STANDARD
                .decode(value)
                .with_context(|| format!("Cannot decode the photo of {}!", record.dn()))?,
        ),
        None => None,
    };

    // An account belongs to a human if the HR system vouches for it. Such accounts are active
    // if HR says so, all others fall back to the generic account flag.
    let human = record.flag("sangerAgressoCurrentPerson");

    Ok(Person {
        id,
        name,
        mail,
        title: record.first_str("title").map(str::to_owned),
        human: human.is_some(),
        active: human.unwrap_or(false) || record.flag("sangerActiveAccount").unwrap_or(false),
        photo,
    })
}

/// The directly extractable part of a group, before its person references are resolved.
pub(crate) struct GroupRecord {
    pub id: String,
    pub active: bool,
    pub description: Option<String>,
    pub prelims: Vec<String>,
    pub pi_dn: Option<String>,
    pub owner_dns: Vec<String>,
    pub member_dns: Vec<String>,
}

/// Extracts the attribute-level part of a group from a raw record.
pub(crate) fn parse_group(record: &Record) -> anyhow::Result<GroupRecord> {
    Ok(GroupRecord {
        id: required(record, "cn")?,
        active: record.flag("sangerHumgenProjectActive").ok_or_else(|| {
            anyhow!(
                "The entry {} lacks a valid sangerHumgenProjectActive flag!",
                record.dn()
            )
        })?,
        description: record.first_str("description").map(str::to_owned),
        prelims: record
            .strs("sangerPrelimID")
            .into_iter()
            .map(str::to_owned)
            .collect(),
        pi_dn: record.first_str("sangerProjectPI").map(str::to_owned),
        owner_dns: record.strs("owner").into_iter().map(str::to_owned).collect(),
        member_dns: record
            .strs("member")
            .into_iter()
            .map(str::to_owned)
            .collect(),
    })
}

fn required(record: &Record, name: &str) -> anyhow::Result<String> {
    record
        .first_str(name)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("The entry {} lacks the attribute {}!", record.dn(), name))
}

/// Fetches and parses the person with the given uid from the directory.
pub(crate) async fn resolve_person(
    registry: &Registry,
    uid: &str,
) -> Result<Person, RegistryError> {
    let filter = format!("(&{}(uid={}))", PERSON_CLASS, escape(uid));
    let records = registry
        .search(registry.people_base(), Scope::OneLevel, &filter)
        .await?;

    let record = records
        .first()
        .ok_or_else(|| RegistryError::EntityNotFound(uid.to_owned()))?;

    parse_person(record).map_err(|cause| RegistryError::Resolution {
        key: uid.to_owned(),
        cause,
    })
}

/// Fetches the group with the given cn and resolves its person references through the cache.
pub(crate) async fn resolve_group(registry: &Registry, cn: &str) -> Result<Group, RegistryError> {
    let filter = format!("(&{}(cn={}))", GROUP_CLASSES, escape(cn));
    let records = registry
        .search(registry.groups_base(), Scope::OneLevel, &filter)
        .await?;

    let record = records
        .first()
        .ok_or_else(|| RegistryError::EntityNotFound(cn.to_owned()))?;

    let raw = parse_group(record).map_err(|cause| RegistryError::Resolution {
        key: cn.to_owned(),
        cause,
    })?;

    let pi = match &raw.pi_dn {
        Some(dn) => resolve_reference(registry, dn).await?,
        None => None,
    };

    let mut owners = Vec::with_capacity(raw.owner_dns.len());
    for dn in &raw.owner_dns {
        if let Some(person) = resolve_reference(registry, dn).await? {
            owners.push(person);
        }
    }

    let mut members = Vec::with_capacity(raw.member_dns.len());
    for dn in &raw.member_dns {
        if let Some(person) = resolve_reference(registry, dn).await? {
            members.push(person);
        }
    }

    Ok(Group {
        id: raw.id,
        active: raw.active,
        description: raw.description,
        prelims: raw.prelims,
        pi,
        owners,
        members,
    })
}

/// Resolves a person DN into a [PersonRef] via the cache.
///
/// Returns **None** (after logging) for anything dangling; only an unreachable directory is
/// propagated.
async fn resolve_reference(
    registry: &Registry,
    dn: &str,
) -> Result<Option<PersonRef>, RegistryError> {
    let uid = match registry.person_uid(dn) {
        Some(uid) => uid,
        None => {
            log::warn!("Ignoring the reference {} which is not a person entry.", dn);
            return Ok(None);
        }
    };

    match registry.get_person(&uid).await {
        Ok(cached) => Ok(Some(PersonRef {
            id: uid,
            name: cached.value().name.clone(),
        })),
        Err(error @ RegistryError::DirectoryUnavailable(_)) => Err(error),
        Err(error) => {
            log::warn!("Ignoring the unresolvable person {}: {}", uid, error);
            Ok(None)
        }
    }
}
