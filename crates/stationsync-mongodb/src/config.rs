//! MongoDB connection configuration
//!
//! [`MongoConfig`] is validated once at construction and immutable afterwards.
//! The derived [`MongoConfig::uri`] and [`MongoConfig::options`] describe how
//! the driver will be connected.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use stationsync_common::{Result, SyncError};

use crate::connection::PoolConfig;
use crate::validation::ValidatedCollectionName;

/// Well-known MongoDB port
pub const DEFAULT_PORT: u16 = 27017;

/// Read preference mode accepted in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPreferenceMode {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadPreferenceMode {
    /// Name as written in a MongoDB connection string
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreferenceMode::Primary => "primary",
            ReadPreferenceMode::PrimaryPreferred => "primaryPreferred",
            ReadPreferenceMode::Secondary => "secondary",
            ReadPreferenceMode::SecondaryPreferred => "secondaryPreferred",
            ReadPreferenceMode::Nearest => "nearest",
        }
    }
}

impl FromStr for ReadPreferenceMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" => Ok(ReadPreferenceMode::Primary),
            "primaryPreferred" => Ok(ReadPreferenceMode::PrimaryPreferred),
            "secondary" => Ok(ReadPreferenceMode::Secondary),
            "secondaryPreferred" => Ok(ReadPreferenceMode::SecondaryPreferred),
            "nearest" => Ok(ReadPreferenceMode::Nearest),
            other => Err(SyncError::Config(format!(
                "Unknown read preference '{}', expected one of: primary, primaryPreferred, \
                 secondary, secondaryPreferred, nearest",
                other
            ))),
        }
    }
}

impl fmt::Display for ReadPreferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable MongoDB / DocumentDB connection settings
#[derive(Clone)]
pub struct MongoConfig {
    host: String,
    user_name: String,
    password: String,
    database: String,
    collection: ValidatedCollectionName,
    ca_file: Option<PathBuf>,
    replica_set: Option<String>,
    read_preference: Option<ReadPreferenceMode>,
    port: u16,
    pool: PoolConfig,
}

impl MongoConfig {
    /// Start building a configuration from the required settings
    pub fn builder(
        host: impl Into<String>,
        user_name: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> MongoConfigBuilder {
        MongoConfigBuilder {
            host: host.into(),
            user_name: user_name.into(),
            password: password.into(),
            database: database.into(),
            collection: collection.into(),
            ca_file: None,
            replica_set: None,
            read_preference: None,
            port: DEFAULT_PORT,
            pool: PoolConfig::default(),
        }
    }

    /// Parse a configuration from a JSON object
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawMongoConfig = serde_json::from_str(json)
            .map_err(|e| SyncError::Config(format!("Invalid database settings: {}", e)))?;
        raw.into_builder().build()
    }

    /// Parse a configuration from a YAML mapping
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawMongoConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SyncError::Config(format!("Invalid database settings: {}", e)))?;
        raw.into_builder().build()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        self.collection.as_str()
    }

    /// Absolute path of the CA certificate, if TLS is configured
    pub fn ca_file(&self) -> Option<&Path> {
        self.ca_file.as_deref()
    }

    pub fn replica_set(&self) -> Option<&str> {
        self.replica_set.as_deref()
    }

    pub fn read_preference(&self) -> Option<ReadPreferenceMode> {
        self.read_preference
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Connection URI with percent-encoded credentials
    pub fn uri(&self) -> String {
        format!(
            "mongodb://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user_name),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.database
        )
    }

    /// Driver options derived from the optional settings.
    ///
    /// Keys are MongoDB connection-string option names. Only settings that
    /// were supplied contribute an entry.
    pub fn options(&self) -> BTreeMap<&'static str, String> {
        let mut options = BTreeMap::new();
        if let Some(ca_file) = &self.ca_file {
            options.insert("tls", "true".to_string());
            options.insert("tlsCAFile", ca_file.display().to_string());
        }
        if let Some(replica_set) = &self.replica_set {
            options.insert("replicaSet", replica_set.clone());
        }
        if let Some(mode) = self.read_preference {
            options.insert("readPreference", mode.as_str().to_string());
        }
        options
    }
}

impl fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("host", &self.host)
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .field("database", &self.database)
            .field("collection", &self.collection.as_str())
            .field("ca_file", &self.ca_file)
            .field("replica_set", &self.replica_set)
            .field("read_preference", &self.read_preference)
            .field("port", &self.port)
            .finish()
    }
}

/// Builder for [`MongoConfig`]; validation happens in [`MongoConfigBuilder::build`]
#[derive(Debug, Clone)]
pub struct MongoConfigBuilder {
    host: String,
    user_name: String,
    password: String,
    database: String,
    collection: String,
    ca_file: Option<PathBuf>,
    replica_set: Option<String>,
    read_preference: Option<String>,
    port: u16,
    pool: PoolConfig,
}

impl MongoConfigBuilder {
    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable TLS with the given CA certificate file
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Set the replica set name
    pub fn replica_set(mut self, name: impl Into<String>) -> Self {
        self.replica_set = Some(name.into());
        self
    }

    /// Set the read preference mode (e.g. "secondaryPreferred")
    pub fn read_preference(mut self, mode: impl Into<String>) -> Self {
        self.read_preference = Some(mode.into());
        self
    }

    /// Set driver pool tuning
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Validate the settings and freeze them into a [`MongoConfig`]
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if the host or database is empty, the
    /// collection name is invalid, the read preference is unknown, or the CA
    /// file is not an existing regular file.
    pub fn build(self) -> Result<MongoConfig> {
        if self.host.is_empty() {
            return Err(SyncError::Config("Host cannot be empty".to_string()));
        }
        if self.database.is_empty() {
            return Err(SyncError::Config("Database name cannot be empty".to_string()));
        }
        let collection = ValidatedCollectionName::new(&self.collection)?;

        let read_preference = self
            .read_preference
            .as_deref()
            .map(ReadPreferenceMode::from_str)
            .transpose()?;

        let ca_file = match self.ca_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(SyncError::Config(format!(
                        "The specified CA file {} is not found",
                        path.display()
                    )));
                }
                let resolved = std::fs::canonicalize(&path).map_err(|e| {
                    SyncError::Config(format!(
                        "Cannot resolve CA file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Some(resolved)
            }
            None => None,
        };

        Ok(MongoConfig {
            host: self.host,
            user_name: self.user_name,
            password: self.password,
            database: self.database,
            collection,
            ca_file,
            replica_set: self.replica_set,
            read_preference,
            port: self.port,
            pool: self.pool,
        })
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Settings as they appear in an external settings file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMongoConfig {
    host: String,
    user_name: String,
    password: String,
    database: String,
    collection: String,
    #[serde(default)]
    ca_file: Option<PathBuf>,
    #[serde(default)]
    replica_set: Option<String>,
    #[serde(default)]
    read_preference: Option<String>,
    #[serde(default = "default_port")]
    port: u16,
}

impl RawMongoConfig {
    fn into_builder(self) -> MongoConfigBuilder {
        let mut builder = MongoConfig::builder(
            self.host,
            self.user_name,
            self.password,
            self.database,
            self.collection,
        )
        .port(self.port);
        if let Some(ca_file) = self.ca_file {
            builder = builder.ca_file(ca_file);
        }
        if let Some(replica_set) = self.replica_set {
            builder = builder.replica_set(replica_set);
        }
        if let Some(mode) = self.read_preference {
            builder = builder.read_preference(mode);
        }
        builder
    }
}
