//! Reads the system configuration from environment variables.
//!
//! The service is intended to run in a container where all knobs arrive via the environment:
//!
//! * **LDAP_URI**: the address of the directory server (required). The registry itself never
//!   dials this URI, it is handed to the injected [Directory](crate::directory::Directory)
//!   implementation by the embedder.
//! * **BASE_DN**: the root of the directory tree, e.g. `dc=example,dc=com` (required).
//! * **EXPIRY**: the cache TTL in seconds (default **3600**). A value of zero or less disables
//!   caching entirely so that every read hits the directory.
//! * **API_HOST** / **API_PORT**: the bind address of the REST facade (default
//!   **127.0.0.1:5000**).
use anyhow::{anyhow, Context};
use std::net::SocketAddr;
use std::time::Duration;

/// Contains the default TTL (one hour) being used if **EXPIRY** is absent.
pub const DEFAULT_EXPIRY_SECONDS: i64 = 3600;

/// Contains the effective settings of the system as read by [Settings::from_env].
#[derive(Clone, Debug)]
pub struct Settings {
    /// Contains the URI of the directory server (informational, see module docs).
    pub ldap_uri: String,

    /// Contains the root DN under which both subtrees live.
    pub base_dn: String,

    /// Contains the cache TTL. [Duration::ZERO] signals that caching is disabled.
    pub expiry: Duration,

    /// Contains the host to bind the REST facade to.
    pub api_host: String,

    /// Contains the port to bind the REST facade to.
    pub api_port: u16,
}

impl Settings {
    /// Reads the settings from the process environment.
    ///
    /// Fails if a required variable is absent or if a value cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        let ldap_uri = required("LDAP_URI")?;
        let base_dn = required("BASE_DN")?;

        let expiry_seconds = match std::env::var("EXPIRY") {
            Ok(value) => value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Cannot parse EXPIRY ('{}') as seconds!", value))?,
            Err(_) => DEFAULT_EXPIRY_SECONDS,
        };

        let api_host =
            std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = match std::env::var("API_PORT") {
            Ok(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Cannot parse API_PORT ('{}') as a port!", value))?,
            Err(_) => 5000,
        };

        Ok(Settings {
            ldap_uri,
            base_dn,
            expiry: if expiry_seconds > 0 {
                Duration::from_secs(expiry_seconds as u64)
            } else {
                Duration::ZERO
            },
            api_host,
            api_port,
        })
    }

    /// Determines if caching is enabled at all.
    pub fn caching_enabled(&self) -> bool {
        !self.expiry.is_zero()
    }

    /// Returns the base DN of the subtree containing all project groups.
    pub fn groups_base(&self) -> String {
        format!("ou=group,{}", self.base_dn)
    }

    /// Returns the base DN of the subtree containing all people.
    pub fn people_base(&self) -> String {
        format!("ou=people,{}", self.base_dn)
    }

    /// Computes the socket address the REST facade binds to.
    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| {
                format!(
                    "Cannot parse '{}:{}' as a socket address!",
                    self.api_host, self.api_port
                )
            })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("The required environment variable {} is not set!", name))
}
