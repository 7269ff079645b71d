//! A read-through caching registry which exposes LDAP groups and people as hypermedia resources.
//!
//! # Introduction
//! Directory servers are authoritative but slow and easily overloaded, especially when a web
//! frontend walks the group/person graph on every request. This crate sits between HTTP clients
//! and an LDAP directory and serves every read from an in-memory cache which is populated on
//! first access and periodically refreshed, so that staleness is bounded by a configurable TTL
//! while the directory only ever sees one fetch per entity and refresh period.
//!
//! Clients never talk to the directory themselves. They observe a small hypermedia API
//! (`/groups`, `/people`, ...) in which every relation (group membership, ownership, the PI of a
//! project group) is rendered as a link object rather than an embedded document.
//!
//! # Modules
//! * **registry**: The core of the crate - a keyed entity cache with per-key single-flight
//!   population, stale-if-error fallback and a background refresh sweep. See [crate::registry].
//! * **directory**: The boundary towards the LDAP server. The actual wire client is injected via
//!   the [Directory](crate::directory::Directory) trait; the crate only assumes a
//!   search-by-filter primitive. See [crate::directory].
//! * **model**: Typed [Group](crate::model::Group) and [Person](crate::model::Person) entities,
//!   extracted from raw directory records with proper validation.
//! * **hypermedia**: Renders entity references as `{href, rel, rev, value}` link objects.
//! * **httpd**: The REST facade built on hyper, serving JSON documents and person photos.
//!
//! # Example
//! A minimal embedding looks like this (the `Directory` implementation - e.g. one backed by a
//! real LDAP client - is supplied by the embedder):
//!
//! ```no_run
//! use std::sync::Arc;
//! use ldap_registry::config::Settings;
//! use ldap_registry::platform::Platform;
//! use ldap_registry::registry::{refresh, Registry};
//!
//! # fn gateway() -> Arc<dyn ldap_registry::directory::Directory> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     ldap_registry::init_logging();
//!
//!     let settings = Settings::from_env()?;
//!     let platform = Platform::new();
//!     let registry = Registry::new(gateway(), &settings)?;
//!
//!     refresh::install(platform.clone(), registry.clone());
//!     ldap_registry::httpd::serve(platform, registry, settings.bind_address()?).await
//! }
//! ```
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod config;
pub mod directory;
pub mod httpd;
pub mod hypermedia;
pub mod model;
pub mod platform;
pub mod registry;

/// Contains the version of the registry library.
pub const REGISTRY_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Initializes the logging system.
///
/// Intended for containerized deployments where logging to stdout is all that is needed. The
/// time format being used is digestible by established log shippers.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise the integration tests might crash as the logging system
    // is initialized several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned closure to make
/// clippy happy.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate ldap_registry;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
