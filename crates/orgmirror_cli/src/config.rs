//! Configuration file support for orgmirror.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `ORGMIRROR__`, nesting separated by
//!    `__`, e.g. `ORGMIRROR__DATABASE__URL`, `ORGMIRROR__CREDENTIALS__MIRROR_X`)
//! 3. `./orgmirror.toml`, or the file passed with `--config`
//! 4. XDG config file (`~/.config/orgmirror/config.toml`)
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! source_org = "acme"
//! source_credential = "source"
//! work_root = "/var/lib/orgmirror/work"
//! max_concurrency = 4
//! retry_threshold = 5
//! soft_delete_enabled = true
//!
//! [[destinations]]
//! id = "backup-eu"
//! org = "acme-backup-eu"
//! credential_ref = "backup_eu"
//!
//! [credentials]
//! source = "ghp_..."
//! backup_eu = "ghp_..."   # or ORGMIRROR__CREDENTIALS__BACKUP_EU
//!
//! [host]
//! api_url = "https://ghe.example.com/api/v3"  # omit for github.com
//!
//! [database]
//! url = "sqlite:///var/lib/orgmirror/state.db?mode=rwc"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use orgmirror::Credential;
use orgmirror::mirror::{self, Destination, MirrorOptions};
use orgmirror::rate_limits;
use serde::Deserialize;
use thiserror::Error;

/// Configuration that cannot produce a runnable engine.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("`{0}` is not configured")]
    Missing(&'static str),

    #[error("No destinations are configured")]
    NoDestinations,

    #[error("Destination id `{0}` is configured more than once")]
    DuplicateDestination(String),

    #[error("Credential `{credential_ref}` for {owner} is not defined under [credentials]")]
    MissingCredential {
        owner: String,
        credential_ref: String,
    },

    #[error("`{field}` must be at least 1")]
    Invalid { field: &'static str },
}

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub host: HostConfig,
    /// Organization whose repositories are mirrored.
    pub source_org: Option<String>,
    /// Name of the credential used to read the source.
    pub source_credential: Option<String>,
    pub destinations: Vec<DestinationConfig>,
    /// Named tokens referenced by `source_credential` and `credential_ref`.
    pub credentials: BTreeMap<String, String>,
    /// Root for working mirrors. Defaults to the state directory.
    pub work_root: Option<PathBuf>,
    pub max_concurrency: usize,
    pub retry_threshold: u32,
    pub soft_delete_enabled: bool,
    pub creating_retry_after_secs: u64,
    pub call_timeout_secs: u64,
    pub requests_per_second: u32,
    pub enforce_branch_protection: bool,
    pub audit_drift: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            host: HostConfig::default(),
            source_org: None,
            source_credential: None,
            destinations: Vec::new(),
            credentials: BTreeMap::new(),
            work_root: None,
            max_concurrency: mirror::DEFAULT_CONCURRENCY,
            retry_threshold: mirror::DEFAULT_RETRY_THRESHOLD,
            soft_delete_enabled: true,
            creating_retry_after_secs: mirror::DEFAULT_CREATING_RETRY_AFTER.as_secs(),
            call_timeout_secs: mirror::DEFAULT_CALL_TIMEOUT.as_secs(),
            requests_per_second: rate_limits::GITHUB_DEFAULT_RPS,
            enforce_branch_protection: false,
            audit_drift: true,
        }
    }
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
}

/// Host API configuration, shared by the source and every destination.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// API root for GitHub Enterprise; github.com when unset.
    pub api_url: Option<String>,
}

/// One destination organization.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    /// Stable identifier stored with every pair.
    pub id: String,
    /// Organization name; defaults to `id`.
    #[serde(default)]
    pub org: Option<String>,
    /// Name of the credential under `[credentials]`.
    pub credential_ref: String,
}

/// A destination with its credential resolved.
#[derive(Debug, Clone)]
pub struct ResolvedDestination {
    pub destination: Destination,
    pub credential: Credential,
}

/// Everything a run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub options: MirrorOptions,
    pub source_credential: Credential,
    pub destinations: Vec<ResolvedDestination>,
    pub api_url: Option<String>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/orgmirror/config.toml)
    /// 3. `explicit` if given, else ./orgmirror.toml
    /// 4. Environment variables with the ORGMIRROR__ prefix
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "orgmirror") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        match explicit {
            Some(path) => {
                tracing::debug!("Loading config from {:?}", path);
                builder = builder.add_source(
                    File::from(path.to_path_buf())
                        .format(FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                let local_config = PathBuf::from("orgmirror.toml");
                if local_config.exists() {
                    tracing::debug!("Loading config from ./orgmirror.toml");
                    builder = builder.add_source(
                        File::from(local_config)
                            .format(FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        // ORGMIRROR__DATABASE__URL -> database.url
        builder = builder.add_source(
            Environment::with_prefix("ORGMIRROR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize::<Config>()?)
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("orgmirror.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/orgmirror` or `~/.local/state/orgmirror`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "orgmirror").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }

    fn credential(&self, owner: &str, credential_ref: &str) -> Result<Credential, ConfigError> {
        self.credentials
            .get(credential_ref)
            .filter(|token| !token.trim().is_empty())
            .map(|token| Credential::new(token.trim()))
            .ok_or_else(|| ConfigError::MissingCredential {
                owner: owner.to_string(),
                credential_ref: credential_ref.to_string(),
            })
    }

    /// Destination ids in configuration order.
    pub fn destination_ids(&self) -> Vec<String> {
        self.destinations.iter().map(|d| d.id.clone()).collect()
    }

    /// Validate and resolve credentials into engine inputs.
    ///
    /// Every destination must name a defined credential; nothing is skipped.
    pub fn resolve(&self) -> Result<MirrorConfig, ConfigError> {
        let source_org = self
            .source_org
            .clone()
            .filter(|org| !org.trim().is_empty())
            .ok_or(ConfigError::Missing("source_org"))?;
        let source_ref = self
            .source_credential
            .as_deref()
            .ok_or(ConfigError::Missing("source_credential"))?;
        let source_credential = self.credential("the source", source_ref)?;

        if self.destinations.is_empty() {
            return Err(ConfigError::NoDestinations);
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrency",
            });
        }
        if self.requests_per_second == 0 {
            return Err(ConfigError::Invalid {
                field: "requests_per_second",
            });
        }

        let mut seen = HashSet::new();
        let mut destinations = Vec::with_capacity(self.destinations.len());
        for dest in &self.destinations {
            if !seen.insert(dest.id.as_str()) {
                return Err(ConfigError::DuplicateDestination(dest.id.clone()));
            }
            let credential =
                self.credential(&format!("destination `{}`", dest.id), &dest.credential_ref)?;
            let org = dest.org.clone().unwrap_or_else(|| dest.id.clone());
            destinations.push(ResolvedDestination {
                destination: Destination::new(dest.id.clone(), org),
                credential,
            });
        }

        let work_root = self
            .work_root
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join("work")))
            .ok_or(ConfigError::Missing("work_root"))?;

        let mut options = MirrorOptions::new(source_org, work_root);
        options.max_concurrency = self.max_concurrency;
        options.retry_threshold = self.retry_threshold;
        options.soft_delete_enabled = self.soft_delete_enabled;
        options.creating_retry_after = Duration::from_secs(self.creating_retry_after_secs);
        options.call_timeout = Duration::from_secs(self.call_timeout_secs.max(1));
        options.requests_per_second = self.requests_per_second;
        options.enforce_branch_protection = self.enforce_branch_protection;
        options.audit_drift = self.audit_drift;

        Ok(MirrorConfig {
            options,
            source_credential,
            destinations,
            api_url: self.host.api_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const FULL: &str = r#"
        source_org = "acme"
        source_credential = "src"
        work_root = "/tmp/orgmirror-work"
        max_concurrency = 8
        retry_threshold = 3
        soft_delete_enabled = false
        call_timeout_secs = 30

        [[destinations]]
        id = "backup-a"
        org = "acme-backup-a"
        credential_ref = "tok_a"

        [[destinations]]
        id = "acme-backup-b"
        credential_ref = "tok_b"

        [credentials]
        src = "ghp_source"
        tok_a = "ghp_a"
        tok_b = "ghp_b"

        [database]
        url = "sqlite:///tmp/test.db"
    "#;

    #[test]
    fn test_config_builder_with_defaults() {
        let settings = ConfigBuilder::builder().build().unwrap();
        let config: Config = settings.try_deserialize().unwrap_or_default();

        assert_eq!(config.max_concurrency, mirror::DEFAULT_CONCURRENCY);
        assert_eq!(config.retry_threshold, mirror::DEFAULT_RETRY_THRESHOLD);
        assert!(config.soft_delete_enabled);
        assert!(config.audit_drift);
        assert!(config.destinations.is_empty());
    }

    #[test]
    fn test_full_config_parsing() {
        let config = parse(FULL);

        assert_eq!(config.source_org.as_deref(), Some("acme"));
        assert_eq!(config.destinations.len(), 2);
        assert_eq!(config.destinations[1].org, None);
        assert_eq!(config.credentials.get("tok_a").map(String::as_str), Some("ghp_a"));
        assert_eq!(config.database.url.as_deref(), Some("sqlite:///tmp/test.db"));
    }

    #[test]
    fn test_resolve_maps_options_and_destinations() {
        let resolved = parse(FULL).resolve().expect("resolves");

        assert_eq!(resolved.options.source_org, "acme");
        assert_eq!(resolved.options.max_concurrency, 8);
        assert_eq!(resolved.options.retry_threshold, 3);
        assert!(!resolved.options.soft_delete_enabled);
        assert_eq!(resolved.options.call_timeout, Duration::from_secs(30));
        assert_eq!(resolved.source_credential.expose(), "ghp_source");

        let a = &resolved.destinations[0];
        assert_eq!(a.destination, Destination::new("backup-a", "acme-backup-a"));
        assert_eq!(a.credential.expose(), "ghp_a");
        // org defaults to the id
        assert_eq!(resolved.destinations[1].destination.org, "acme-backup-b");
    }

    #[test]
    fn test_missing_destination_credential_is_an_error() {
        let config = parse(
            r#"
            source_org = "acme"
            source_credential = "src"
            [[destinations]]
            id = "backup-a"
            credential_ref = "nope"
            [credentials]
            src = "ghp_source"
        "#,
        );

        let err = config.resolve().expect_err("missing credential");
        assert!(matches!(
            err,
            ConfigError::MissingCredential { ref credential_ref, .. } if credential_ref == "nope"
        ));
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let config = parse(
            r#"
            source_org = "acme"
            source_credential = "src"
            [[destinations]]
            id = "backup-a"
            credential_ref = "tok"
            [credentials]
            src = "ghp_source"
            tok = "  "
        "#,
        );
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::MissingCredential { .. })
        ));
    }

    #[test]
    fn test_duplicate_destination_ids_are_rejected() {
        let config = parse(
            r#"
            source_org = "acme"
            source_credential = "src"
            [[destinations]]
            id = "backup"
            credential_ref = "src"
            [[destinations]]
            id = "backup"
            credential_ref = "src"
            [credentials]
            src = "ghp_source"
        "#,
        );
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::DuplicateDestination(id)) if id == "backup"
        ));
    }

    #[test]
    fn test_missing_source_org_and_destinations() {
        assert!(matches!(
            Config::default().resolve(),
            Err(ConfigError::Missing("source_org"))
        ));

        let config = parse(
            r#"
            source_org = "acme"
            source_credential = "src"
            [credentials]
            src = "ghp_source"
        "#,
        );
        assert!(matches!(config.resolve(), Err(ConfigError::NoDestinations)));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let mut config = parse(FULL);
        config.max_concurrency = 0;
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::Invalid {
                field: "max_concurrency"
            })
        ));
    }

    #[test]
    fn test_database_url_default_uses_state_dir() {
        let config = Config::default();
        if let Some(url) = config.database_url() {
            assert!(url.starts_with("sqlite://"));
            assert!(url.ends_with("orgmirror.db?mode=rwc"));
        }
    }
}
