//! Contains the read-through entity cache which forms the core of the system.
//!
//! The [Registry] answers every read from memory if it can. For each entity kind (project
//! groups, people) it keeps a [store::Store] of slots; a lookup first tries the lock-free fresh
//! read, and only if the entry is absent, expired or invalidated does it enter the populate
//! path. Population is single-flight per key: all concurrent callers for the same identifier
//! serialize on the slot's lock and every late caller reuses the winner's result instead of
//! issuing its own directory search.
//!
//! When a population fails but an older value exists, that value is served unchanged and the
//! failure is merely logged (stale beats down). Entities which have disappeared from the
//! directory are likewise retained last-known-good. Only a lookup for which no value was ever
//! resolved surfaces an error.
//!
//! Listings (`/groups`, `/people`) are backed by a *seed* search per kind which enumerates the
//! whole subtree once per TTL. Seeding a kind registers its keys; for people the seed search
//! also stores the parsed entities themselves, as a person is extracted from a single record
//! anyway. A group on the other hand is only resolved (including its member references) when
//! actually requested.
//!
//! The [refresh] submodule drives the background sweep which renews expired entries so that
//! foreground requests rarely wait for the directory at all.
use crate::config::Settings;
use crate::directory::{Directory, Record, Scope, SEARCH_TIMEOUT};
use crate::model::{Group, GroupRef, Person, Role};
use crate::registry::store::{Cached, Slot, Store};
use anyhow::anyhow;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

pub mod refresh;
mod resolver;
pub mod store;

/// Names the two entity kinds managed by the registry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntityKind {
    /// A project group.
    Group,

    /// A person.
    Person,
}

/// Represents an error reported by the registry.
///
/// We distinguish the unreachable directory (the only error which aborts an otherwise healthy
/// resolution), lookups for identifiers the directory has never heard of, entries which exist
/// but cannot be turned into a valid entity, and the special case of a person without a photo.
#[derive(Debug)]
pub enum RegistryError {
    /// The directory did not answer (connection failure or timeout).
    DirectoryUnavailable(anyhow::Error),

    /// No entity with the given identifier exists in the directory.
    EntityNotFound(String),

    /// The entity exists but could not be extracted into a typed value.
    Resolution {
        /// The identifier of the offending entity.
        key: String,
        /// The underlying extraction failure.
        cause: anyhow::Error,
    },

    /// The person exists but has no photo on record.
    PhotoNotFound(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DirectoryUnavailable(error) => {
                write!(f, "The directory is currently unavailable: {}", error)
            }
            RegistryError::EntityNotFound(key) => write!(f, "Unknown entity: {}", key),
            RegistryError::Resolution { key, cause } => {
                write!(f, "Failed to resolve {}: {}", key, cause)
            }
            RegistryError::PhotoNotFound(key) => {
                write!(f, "There is no photo on record for {}", key)
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::DirectoryUnavailable(error) => Some(error.as_ref()),
            RegistryError::Resolution { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// Provides cached access to the groups and people of the directory.
pub struct Registry {
    directory: Arc<dyn Directory>,
    ttl: Duration,
    groups_base: String,
    people_base: String,
    person_rdn: Regex,
    groups: Store<Group>,
    people: Store<Person>,
    group_seed: Slot<()>,
    people_seed: Slot<()>,
}

impl Registry {
    /// Creates a registry on top of the given directory gateway.
    pub fn new(directory: Arc<dyn Directory>, settings: &Settings) -> anyhow::Result<Arc<Self>> {
        let people_base = settings.people_base();
        let person_rdn = Regex::new(&format!("^uid=([^,]+),{}$", regex::escape(&people_base)))
            .map_err(|error| anyhow!("Cannot compile the person RDN pattern: {}", error))?;

        Ok(Arc::new(Registry {
            directory,
            ttl: settings.expiry,
            groups_base: settings.groups_base(),
            people_base,
            person_rdn,
            groups: Store::new(),
            people: Store::new(),
            group_seed: Slot::new(),
            people_seed: Slot::new(),
        }))
    }

    /// Returns the configured TTL. [Duration::ZERO] signals that caching is disabled.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn groups_base(&self) -> &str {
        &self.groups_base
    }

    pub(crate) fn people_base(&self) -> &str {
        &self.people_base
    }

    /// Extracts the uid from a DN which lies directly below the people subtree.
    pub(crate) fn person_uid(&self, dn: &str) -> Option<String> {
        self.person_rdn
            .captures(dn)
            .and_then(|captures| captures.get(1))
            .map(|uid| uid.as_str().to_owned())
    }

    /// Performs a time-bounded directory search.
    pub(crate) async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
    ) -> Result<Vec<Record>, RegistryError> {
        match tokio::time::timeout(SEARCH_TIMEOUT, self.directory.search(base, scope, filter))
            .await
        {
            Ok(Ok(records)) => Ok(records),
            Ok(Err(error)) => Err(RegistryError::DirectoryUnavailable(error)),
            Err(_) => Err(RegistryError::DirectoryUnavailable(anyhow!(
                "The search below {} did not complete within {:?}.",
                base,
                SEARCH_TIMEOUT
            ))),
        }
    }

    /// Fetches the group with the given cn, populating the cache if required.
    pub async fn get_group(&self, cn: &str) -> Result<Arc<Cached<Group>>, RegistryError> {
        let slot = self.groups.slot(cn);
        if let Some(cached) = slot.fresh(self.ttl) {
            return Ok(cached);
        }

        let _guard = slot.begin_populate().await;

        // A concurrent caller might have populated the slot while we were waiting...
        if let Some(cached) = slot.fresh(self.ttl) {
            return Ok(cached);
        }

        match resolver::resolve_group(self, cn).await {
            Ok(group) => {
                log::debug!("Resolved group {}.", cn);
                let cached = slot.store(group);
                self.groups.register(cn, &slot);
                Ok(cached)
            }
            Err(error) => match slot.current() {
                Some(previous) => {
                    log::warn!("Serving stale data for group {}: {}", cn, error);
                    Ok(previous)
                }
                None => {
                    // Nothing was ever resolved for this key, so it must not linger in the
                    // key set (listings would otherwise advertise it).
                    self.groups.discard_if_empty(cn, &slot);
                    Err(error)
                }
            },
        }
    }

    /// Fetches the person with the given uid, populating the cache if required.
    pub async fn get_person(&self, uid: &str) -> Result<Arc<Cached<Person>>, RegistryError> {
        let slot = self.people.slot(uid);
        if let Some(cached) = slot.fresh(self.ttl) {
            return Ok(cached);
        }

        let _guard = slot.begin_populate().await;

        if let Some(cached) = slot.fresh(self.ttl) {
            return Ok(cached);
        }

        match resolver::resolve_person(self, uid).await {
            Ok(person) => {
                log::debug!("Resolved person {}.", uid);
                let cached = slot.store(person);
                self.people.register(uid, &slot);
                Ok(cached)
            }
            Err(error) => match slot.current() {
                Some(previous) => {
                    log::warn!("Serving stale data for person {}: {}", uid, error);
                    Ok(previous)
                }
                None => {
                    self.people.discard_if_empty(uid, &slot);
                    Err(error)
                }
            },
        }
    }

    /// Returns the JPEG photo of the given person.
    pub async fn photo(&self, uid: &str) -> Result<Vec<u8>, RegistryError> {
        let cached = self.get_person(uid).await?;
        cached
            .value()
            .photo
            .clone()
            .ok_or_else(|| RegistryError::PhotoNotFound(uid.to_owned()))
    }

    /// Lists the identifiers of all known groups (sorted), seeding the kind if required.
    pub async fn groups(&self) -> Result<Vec<String>, RegistryError> {
        self.ensure_groups_seeded().await?;
        Ok(self.groups.keys())
    }

    /// Lists the identifiers of all known people (sorted), seeding the kind if required.
    pub async fn people(&self) -> Result<Vec<String>, RegistryError> {
        self.ensure_people_seeded().await?;
        Ok(self.people.keys())
    }

    /// Reports the groups the given person is involved in, along with their role.
    ///
    /// This is derived from the group entries currently in the cache: a group which has never
    /// been resolved cannot contribute, so the result converges as groups are requested.
    /// Per group the roles are reported in the order PI, owner, member.
    pub fn involvement(&self, uid: &str) -> Vec<(GroupRef, Role)> {
        let mut result = Vec::new();
        for (id, slot) in self.groups.snapshot() {
            if let Some(cached) = slot.current() {
                let group = cached.value();
                let group_ref = GroupRef {
                    id: id.clone(),
                    name: group.name().to_owned(),
                };

                if group.pi.as_ref().map(|pi| pi.id == uid).unwrap_or(false) {
                    result.push((group_ref.clone(), Role::Pi));
                }
                if group.owners.iter().any(|owner| owner.id == uid) {
                    result.push((group_ref.clone(), Role::Owner));
                }
                if group.members.iter().any(|member| member.id == uid) {
                    result.push((group_ref, Role::Member));
                }
            }
        }

        result
    }

    /// Marks the given entity as stale so that the next access or sweep repopulates it.
    pub fn invalidate(&self, kind: EntityKind, id: &str) {
        let invalidated = match kind {
            EntityKind::Group => self.groups.peek(id).map(|slot| slot.invalidate()),
            EntityKind::Person => self.people.peek(id).map(|slot| slot.invalidate()),
        };

        if invalidated.is_none() {
            log::debug!("Ignoring invalidation of unknown {:?} {}.", kind, id);
        }
    }

    async fn ensure_groups_seeded(&self) -> Result<(), RegistryError> {
        if self.group_seed.fresh(self.ttl).is_some() {
            return Ok(());
        }

        let _guard = self.group_seed.begin_populate().await;
        if self.group_seed.fresh(self.ttl).is_some() {
            return Ok(());
        }

        let records = match self
            .search(
                &self.groups_base,
                Scope::OneLevel,
                &resolver::group_seed_filter(),
            )
            .await
        {
            Ok(records) => records,
            Err(error) if self.group_seed.current().is_some() => {
                // The previously discovered key set remains usable...
                log::warn!("Serving a stale group listing: {}", error);
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        if records.is_empty() {
            log::warn!("The group seed search below {} found no entries.", self.groups_base);
        }

        for record in records {
            match record.first_str("cn") {
                Some(cn) => {
                    let _ = self.groups.slot(cn);
                }
                None => log::warn!("Ignoring the group entry {} without a cn.", record.dn()),
            }
        }

        let _ = self.group_seed.store(());
        log::debug!("Seeded the group listing ({} keys).", self.groups.keys().len());

        Ok(())
    }

    async fn ensure_people_seeded(&self) -> Result<(), RegistryError> {
        if self.people_seed.fresh(self.ttl).is_some() {
            return Ok(());
        }

        let _guard = self.people_seed.begin_populate().await;
        if self.people_seed.fresh(self.ttl).is_some() {
            return Ok(());
        }

        let records = match self
            .search(
                &self.people_base,
                Scope::OneLevel,
                &resolver::person_seed_filter(),
            )
            .await
        {
            Ok(records) => records,
            Err(error) if self.people_seed.current().is_some() => {
                log::warn!("Serving a stale people listing: {}", error);
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        if records.is_empty() {
            log::warn!("The people seed search below {} found no entries.", self.people_base);
        }

        // A person is extracted from its own record anyway, so the seed search already yields
        // the complete entities and we store them right away.
        for record in records {
            match resolver::parse_person(&record) {
                Ok(person) => {
                    let _ = self.people.slot(&person.id.clone()).store(person);
                }
                Err(error) => log::warn!("Skipping the entry {}: {}", record.dn(), error),
            }
        }

        let _ = self.people_seed.store(());
        log::debug!("Seeded the people listing ({} keys).", self.people.keys().len());

        Ok(())
    }

    /// Renews every expired or invalidated cache entry, returning the number of entries which
    /// were actually refreshed.
    ///
    /// A failing entry is logged and skipped; one broken entity never stops the sweep. This is
    /// invoked periodically by [refresh::install] but can also be driven directly.
    pub async fn refresh_stale(&self) -> usize {
        if self.ttl.is_zero() {
            return 0;
        }

        let mut refreshed = 0;

        if self.group_seed.needs_refresh(self.ttl) {
            if let Err(error) = self.ensure_groups_seeded().await {
                log::error!("Failed to refresh the group listing: {}", error);
            }
        }
        if self.people_seed.needs_refresh(self.ttl) {
            if let Err(error) = self.ensure_people_seeded().await {
                log::error!("Failed to refresh the people listing: {}", error);
            }
        }

        for (uid, slot) in self.people.snapshot() {
            if !slot.needs_refresh(self.ttl) {
                continue;
            }

            let _guard = slot.begin_populate().await;
            if !slot.needs_refresh(self.ttl) {
                continue;
            }

            match resolver::resolve_person(self, &uid).await {
                Ok(person) => {
                    let _ = slot.store(person);
                    refreshed += 1;
                }
                Err(error) => log::error!("Failed to refresh person {}: {}", uid, error),
            }
        }

        for (cn, slot) in self.groups.snapshot() {
            if !slot.needs_refresh(self.ttl) {
                continue;
            }

            let _guard = slot.begin_populate().await;
            if !slot.needs_refresh(self.ttl) {
                continue;
            }

            match resolver::resolve_group(self, &cn).await {
                Ok(group) => {
                    let _ = slot.store(group);
                    refreshed += 1;
                }
                Err(error) => log::error!("Failed to refresh group {}: {}", cn, error),
            }
        }

        if refreshed > 0 {
            log::debug!("Refreshed {} cache entries.", refreshed);
        }

        refreshed
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::model::Role;
    use crate::registry::{EntityKind, Registry, RegistryError};
    use crate::testing::{
        group_record, person_record, test_async, TestDirectory, SHARED_TEST_RESOURCES,
        TEST_BASE_DN,
    };
    use mock_instant::global::MockClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_settings(expiry_seconds: i64) -> Settings {
        Settings {
            ldap_uri: "ldap://localhost".to_owned(),
            base_dn: TEST_BASE_DN.to_owned(),
            expiry: if expiry_seconds > 0 {
                Duration::from_secs(expiry_seconds as u64)
            } else {
                Duration::ZERO
            },
            api_host: "127.0.0.1".to_owned(),
            api_port: 5000,
        }
    }

    fn sample_directory() -> Arc<TestDirectory> {
        let directory = Arc::new(TestDirectory::new());
        directory.put(person_record(
            "ab12",
            "Ada Lovelace",
            "ab12@example.com",
            Some("PI"),
            Some(b"JPEG"),
            true,
            true,
        ));
        directory.put(person_record(
            "cd34",
            "Charles Babbage",
            "cd34@example.com",
            None,
            None,
            true,
            true,
        ));
        directory.put(group_record(
            "hgi",
            true,
            Some("Human genetics informatics"),
            &["prelim-1"],
            Some("ab12"),
            &["ab12"],
            &["ab12", "cd34"],
        ));
        directory
    }

    #[test]
    fn groups_are_resolved_with_their_members() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            let group = registry.get_group("hgi").await.unwrap();
            let group = group.value();
            assert_eq!(group.id, "hgi");
            assert!(group.active);
            assert_eq!(group.pi.as_ref().unwrap().name, "Ada Lovelace");
            assert_eq!(group.owners.len(), 1);
            assert_eq!(group.members.len(), 2);

            // Resolving the group cached its members as well...
            let person = registry.get_person("cd34").await.unwrap();
            assert_eq!(person.value().name, "Charles Babbage");
        });
    }

    #[test]
    fn cached_entities_are_served_without_a_directory_roundtrip() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            let first = registry.get_person("ab12").await.unwrap();
            let searches = directory.searches();

            let second = registry.get_person("ab12").await.unwrap();
            assert!(Arc::ptr_eq(&first, &second));
            assert_eq!(directory.searches(), searches);

            // Once the TTL has elapsed, the next access repopulates...
            MockClock::advance(Duration::from_secs(3601));
            let third = registry.get_person("ab12").await.unwrap();
            assert!(!Arc::ptr_eq(&first, &third));
            assert!(directory.searches() > searches);
        });
    }

    #[test]
    fn concurrent_lookups_share_a_single_directory_search() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = Arc::new(TestDirectory::with_delay(Duration::from_millis(25)));
            directory.put(person_record(
                "ab12",
                "Ada Lovelace",
                "ab12@example.com",
                None,
                None,
                true,
                true,
            ));
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            let (first, second) = tokio::join!(
                registry.get_person("ab12"),
                registry.get_person("ab12")
            );

            assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
            assert_eq!(directory.searches(), 1);
        });
    }

    #[test]
    fn a_failing_directory_yields_stale_data_but_not_errors() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            let first = registry.get_person("ab12").await.unwrap();

            directory.set_failing(true);
            MockClock::advance(Duration::from_secs(3601));

            // The expired value is served as fallback, untouched...
            let second = registry.get_person("ab12").await.unwrap();
            assert_eq!(second.value().name, "Ada Lovelace");
            assert_eq!(second.last_updated(), first.last_updated());

            // ...while an entity we never resolved reports the outage.
            match registry.get_person("zz99").await {
                Err(RegistryError::DirectoryUnavailable(_)) => (),
                other => panic!("Unexpected result: {:?}", other.map(|_| ())),
            }
        });
    }

    #[test]
    fn deleted_entities_are_retained_last_known_good() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            let _ = registry.get_person("cd34").await.unwrap();

            directory.remove(&format!("uid=cd34,ou=people,{}", TEST_BASE_DN));
            MockClock::advance(Duration::from_secs(3601));

            let person = registry.get_person("cd34").await.unwrap();
            assert_eq!(person.value().name, "Charles Babbage");
        });
    }

    #[test]
    fn unknown_entities_are_reported_as_not_found() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory, &test_settings(3600)).unwrap();

            match registry.get_person("zz99").await {
                Err(RegistryError::EntityNotFound(key)) => assert_eq!(key, "zz99"),
                other => panic!("Unexpected result: {:?}", other.map(|_| ())),
            }
            match registry.get_group("nope").await {
                Err(RegistryError::EntityNotFound(key)) => assert_eq!(key, "nope"),
                other => panic!("Unexpected result: {:?}", other.map(|_| ())),
            }
        });
    }

    #[test]
    fn dangling_members_are_skipped() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            directory.put(group_record(
                "partial",
                true,
                None,
                &[],
                None,
                &[],
                &["ab12", "ghost"],
            ));
            let registry = Registry::new(directory, &test_settings(3600)).unwrap();

            let group = registry.get_group("partial").await.unwrap();
            let members: Vec<&str> = group
                .value()
                .members
                .iter()
                .map(|member| member.id.as_str())
                .collect();
            assert_eq!(members, vec!["ab12"]);
        });
    }

    #[test]
    fn listings_are_seeded_once_and_sorted() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            directory.put(group_record("arts", true, None, &[], None, &[], &[]));
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            assert_eq!(registry.groups().await.unwrap(), vec!["arts", "hgi"]);
            assert_eq!(registry.people().await.unwrap(), vec!["ab12", "cd34"]);

            // The people seed already stores complete entities, so this lookup is served
            // without another search...
            let searches = directory.searches();
            let person = registry.get_person("ab12").await.unwrap();
            assert_eq!(person.value().name, "Ada Lovelace");
            assert_eq!(directory.searches(), searches);

            // Listing again within the TTL does not search either...
            assert_eq!(registry.groups().await.unwrap().len(), 2);
            assert_eq!(directory.searches(), searches);
        });
    }

    #[test]
    fn failed_lookups_do_not_register_keys() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory, &test_settings(3600)).unwrap();

            assert_eq!(registry.groups().await.unwrap(), vec!["hgi"]);

            // A lookup for a nonexistent group fails...
            assert!(registry.get_group("no-such-group").await.is_err());

            // ...and must not leave a phantom key behind.
            assert_eq!(registry.groups().await.unwrap(), vec!["hgi"]);

            assert!(registry.get_person("zz99").await.is_err());
            assert_eq!(registry.people().await.unwrap(), vec!["ab12", "cd34"]);
        });
    }

    #[test]
    fn dangling_members_do_not_register_keys_either() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            directory.put(group_record(
                "partial",
                true,
                None,
                &[],
                None,
                &[],
                &["ab12", "ghost"],
            ));
            let registry = Registry::new(directory, &test_settings(3600)).unwrap();

            let _ = registry.get_group("partial").await.unwrap();

            // The dangling member was skipped during resolution and must not show up in the
            // people listing afterwards.
            assert_eq!(registry.people().await.unwrap(), vec!["ab12", "cd34"]);
        });
    }

    #[test]
    fn listings_survive_directory_outages() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            assert_eq!(registry.groups().await.unwrap(), vec!["hgi"]);

            directory.set_failing(true);
            MockClock::advance(Duration::from_secs(3601));

            assert_eq!(registry.groups().await.unwrap(), vec!["hgi"]);
        });
    }

    #[test]
    fn involvement_is_derived_from_resolved_groups() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory, &test_settings(3600)).unwrap();

            // Nothing resolved yet, so nothing to report...
            assert!(registry.involvement("ab12").is_empty());

            let _ = registry.get_group("hgi").await.unwrap();

            let roles: Vec<Role> = registry
                .involvement("ab12")
                .into_iter()
                .map(|(_, role)| role)
                .collect();
            assert_eq!(roles, vec![Role::Pi, Role::Owner, Role::Member]);

            let involvement = registry.involvement("cd34");
            assert_eq!(involvement.len(), 1);
            assert_eq!(involvement[0].0.id, "hgi");
            assert_eq!(involvement[0].1, Role::Member);
        });
    }

    #[test]
    fn invalidate_forces_a_repopulation() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            let first = registry.get_person("ab12").await.unwrap();
            registry.invalidate(EntityKind::Person, "ab12");

            let second = registry.get_person("ab12").await.unwrap();
            assert!(!Arc::ptr_eq(&first, &second));
            assert!(second.last_updated() >= first.last_updated());
        });
    }

    #[test]
    fn photos_are_decoded_or_reported_missing() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory, &test_settings(3600)).unwrap();

            assert_eq!(registry.photo("ab12").await.unwrap(), b"JPEG");
            match registry.photo("cd34").await {
                Err(RegistryError::PhotoNotFound(key)) => assert_eq!(key, "cd34"),
                other => panic!("Unexpected result: {:?}", other.map(|_| ())),
            }
        });
    }

    #[test]
    fn the_sweep_renews_expired_entries_and_isolates_failures() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory.clone(), &test_settings(3600)).unwrap();

            let _ = registry.get_group("hgi").await.unwrap();
            let before = registry.get_person("ab12").await.unwrap();

            // Nothing is expired yet...
            assert_eq!(registry.refresh_stale().await, 0);

            // Break one person directory-side and expire everything...
            directory.remove(&format!("uid=cd34,ou=people,{}", TEST_BASE_DN));
            MockClock::advance(Duration::from_secs(3601));

            let refreshed = registry.refresh_stale().await;

            // ab12 and hgi were renewed, cd34 failed but did not stop the sweep...
            assert!(refreshed >= 2);
            let after = registry.get_person("ab12").await.unwrap();
            assert!(!Arc::ptr_eq(&before, &after));
            assert!(after.last_updated() >= before.last_updated());

            // ...and its last known value is still being served.
            let person = registry.get_person("cd34").await.unwrap();
            assert_eq!(person.value().name, "Charles Babbage");
        });
    }

    #[test]
    fn disabled_caching_always_consults_the_directory() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();
        test_async(async {
            let directory = sample_directory();
            let registry = Registry::new(directory.clone(), &test_settings(0)).unwrap();

            let _ = registry.get_person("ab12").await.unwrap();
            let searches = directory.searches();
            let _ = registry.get_person("ab12").await.unwrap();
            assert!(directory.searches() > searches);

            // The sweep has nothing to do in this mode...
            assert_eq!(registry.refresh_stale().await, 0);
        });
    }
}
