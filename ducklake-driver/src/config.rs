//! Connection configuration.
//!
//! [`Options`] is the loose, deserializable description a caller hands in;
//! [`Config`] is the validated, immutable result shared by every handle
//! opened from it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ducklake_sql::setup::{Attachment, Extension, ExtensionSource, Secret, SecretProvider};
use ducklake_sql::sql::{bare_name, sanitize_name};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::error::{DriverError, DriverResult};

/// Path prefix selecting the lakehouse form.
pub const LAKE_PREFIX: &str = "ducklake:";

/// Extension required by the lakehouse form.
pub const LAKE_EXTENSION: &str = "ducklake";

/// Default pool size in lakehouse mode.
pub const DEFAULT_LAKE_POOL_SIZE: usize = 5;

/// The database being opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabasePath {
    /// In-memory database.
    InMemory,
    /// File-based database.
    File(PathBuf),
    /// A lakehouse catalog, kept with its `ducklake:` prefix.
    Lake(String),
}

impl DatabasePath {
    /// Classify a path string. Empty or `:memory:` is in-memory.
    pub fn parse(path: &str) -> Self {
        let path = path.trim();
        if path.is_empty() || path == ":memory:" {
            Self::InMemory
        } else if path.starts_with(LAKE_PREFIX) {
            Self::Lake(path.to_string())
        } else {
            Self::File(PathBuf::from(path))
        }
    }

    /// Get the path string for display and logging.
    pub fn display(&self) -> String {
        match self {
            Self::InMemory => ":memory:".to_string(),
            Self::File(path) => path.display().to_string(),
            Self::Lake(path) => path.clone(),
        }
    }

    pub fn is_lake(&self) -> bool {
        matches!(self, Self::Lake(_))
    }
}

/// Database access mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Read-write access (default).
    #[default]
    ReadWrite,
    /// Read-only access.
    ReadOnly,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadWrite => "read_write",
            Self::ReadOnly => "read_only",
        }
    }
}

/// An extension entry: a bare name or a full table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExtensionOption {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        install: Option<bool>,
        #[serde(default)]
        load: Option<bool>,
    },
}

/// A secret entry. Provider fields sit next to `name` and `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SecretOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, JsonValue>,
}

/// An attachment entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachOption {
    pub path: String,
    pub alias: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub data_path: Option<String>,
}

/// Unvalidated connection options, as loaded from TOML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub path: Option<String>,
    pub pool_size: Option<usize>,
    pub extensions: Vec<ExtensionOption>,
    pub secrets: Vec<SecretOption>,
    pub attach: Vec<AttachOption>,
    /// Data location of the lakehouse.
    pub data_path: Option<String>,
    /// Alias for the lakehouse; derived from the path when absent.
    pub lake_alias: Option<String>,
    pub access_mode: Option<AccessMode>,
    pub threads: Option<usize>,
    pub memory_limit: Option<String>,
}

/// Validated connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub path: DatabasePath,
    /// Number of handles a pool may open. Always 1 outside lakehouse mode.
    pub pool_size: usize,
    /// In install/load order.
    pub extensions: Vec<Extension>,
    pub secrets: Vec<Secret>,
    pub attachments: Vec<Attachment>,
    /// Data location of the lakehouse.
    pub data_path: Option<String>,
    /// Alias the lakehouse is attached under.
    pub lake_alias: Option<String>,
    pub access_mode: AccessMode,
    /// Number of threads for parallel execution.
    pub threads: Option<usize>,
    /// Memory limit (e.g., "4GB").
    pub memory_limit: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: DatabasePath::InMemory,
            pool_size: 1,
            extensions: Vec::new(),
            secrets: Vec::new(),
            attachments: Vec::new(),
            data_path: None,
            lake_alias: None,
            access_mode: AccessMode::ReadWrite,
            threads: None,
            memory_limit: None,
        }
    }
}

impl Config {
    /// An in-memory database with nothing to set up.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Validate options into a config.
    ///
    /// Every entry is checked here, so a missing secret field or a malformed
    /// name fails now rather than when a connection is opened.
    pub fn from_options(options: Options) -> DriverResult<Self> {
        let mut builder = Self::builder()
            .path(options.path.as_deref().unwrap_or_default())
            .access_mode(options.access_mode.unwrap_or_default());

        if let Some(pool_size) = options.pool_size {
            builder = builder.pool_size(pool_size);
        }
        for entry in options.extensions {
            builder = builder.extension(parse_extension(entry)?);
        }
        for entry in options.secrets {
            builder = builder.secret(parse_secret(entry)?);
        }
        for entry in options.attach {
            builder = builder.attach(parse_attachment(entry));
        }
        if let Some(data_path) = options.data_path {
            builder = builder.data_path(data_path);
        }
        if let Some(alias) = options.lake_alias {
            builder = builder.lake_alias(alias);
        }
        if let Some(threads) = options.threads {
            builder = builder.threads(threads);
        }
        if let Some(limit) = options.memory_limit {
            builder = builder.memory_limit(limit);
        }

        builder.build()
    }

    /// The lakehouse attachment, when the path is in lakehouse form.
    pub fn lake_attachment(&self) -> Option<Attachment> {
        let DatabasePath::Lake(path) = &self.path else {
            return None;
        };
        let alias = self
            .lake_alias
            .clone()
            .unwrap_or_else(|| derive_lake_alias(path));
        let mut attachment = Attachment::new(path.clone(), alias);
        if self.is_read_only() {
            attachment = attachment.read_only();
        }
        if let Some(data_path) = &self.data_path {
            attachment = attachment.data_path(data_path.clone());
        }
        Some(attachment)
    }

    pub fn is_lake(&self) -> bool {
        self.path.is_lake()
    }

    pub fn is_read_only(&self) -> bool {
        self.access_mode == AccessMode::ReadOnly
    }
}

/// Alias for a lakehouse path: its base filename without extension, with
/// every non-alphanumeric character replaced by `_`.
pub fn derive_lake_alias(path: &str) -> String {
    let target = path.strip_prefix(LAKE_PREFIX).unwrap_or(path);
    let stem = Path::new(target)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let alias = sanitize_name(&stem);
    match alias.chars().next() {
        None => "lake".to_string(),
        Some(c) if c.is_ascii_digit() => format!("lake_{}", alias),
        Some(_) => alias,
    }
}

fn parse_extension(entry: ExtensionOption) -> DriverResult<Extension> {
    let extension = match entry {
        ExtensionOption::Name(name) => Extension::new(name),
        ExtensionOption::Full {
            name,
            source,
            install,
            load,
        } => {
            let source = match source.as_deref() {
                None | Some("default") => ExtensionSource::Default,
                Some("core") => ExtensionSource::Core,
                Some("community") => ExtensionSource::Community,
                Some(url) => ExtensionSource::Url(url.to_string()),
            };
            Extension::new(name)
                .source(source)
                .install(install.unwrap_or(true))
                .load(load.unwrap_or(true))
        }
    };
    Ok(extension)
}

/// Provider fields pulled out of a secret entry, consumed as they are read so
/// that leftovers can be reported.
struct SecretFields {
    secret: String,
    kind: String,
    fields: BTreeMap<String, JsonValue>,
}

impl SecretFields {
    fn required(&mut self, key: &str) -> DriverResult<String> {
        self.optional(key)?.ok_or_else(|| {
            DriverError::config(format!(
                "secret {} ({}) is missing required field {}",
                self.secret, self.kind, key
            ))
        })
    }

    fn optional(&mut self, key: &str) -> DriverResult<Option<String>> {
        match self.fields.remove(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(DriverError::config(format!(
                "secret {} field {} must be a string, got {}",
                self.secret, key, other
            ))),
        }
    }

    fn optional_bool(&mut self, key: &str) -> DriverResult<Option<bool>> {
        match self.fields.remove(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::Bool(b)) => Ok(Some(b)),
            Some(other) => Err(DriverError::config(format!(
                "secret {} field {} must be a boolean, got {}",
                self.secret, key, other
            ))),
        }
    }

    fn finish(self) -> DriverResult<()> {
        match self.fields.keys().next() {
            None => Ok(()),
            Some(key) => Err(DriverError::config(format!(
                "secret {} ({}) has unknown field {}",
                self.secret, self.kind, key
            ))),
        }
    }
}

fn parse_secret(entry: SecretOption) -> DriverResult<Secret> {
    let mut fields = SecretFields {
        secret: entry.name.clone(),
        kind: entry.kind.clone(),
        fields: entry.fields,
    };

    let provider = match entry.kind.to_ascii_lowercase().as_str() {
        "s3" => SecretProvider::S3 {
            key_id: fields.required("key_id")?,
            secret: fields.required("secret")?,
            region: fields.required("region")?,
            endpoint: fields.optional("endpoint")?,
            use_ssl: fields.optional_bool("use_ssl")?,
            url_style: fields.optional("url_style")?,
            session_token: fields.optional("session_token")?,
        },
        "gcs" => SecretProvider::Gcs {
            key_id: fields.required("key_id")?,
            secret: fields.required("secret")?,
        },
        "r2" => SecretProvider::R2 {
            key_id: fields.required("key_id")?,
            secret: fields.required("secret")?,
            account_id: fields.required("account_id")?,
        },
        "azure" => SecretProvider::Azure {
            connection_string: fields.required("connection_string")?,
        },
        other => {
            return Err(DriverError::config(format!(
                "secret {} has unknown type {}",
                entry.name, other
            )));
        }
    };
    fields.finish()?;

    let mut secret = Secret::new(entry.name, provider);
    if let Some(scope) = entry.scope {
        secret = secret.scope(scope);
    }
    Ok(secret)
}

fn parse_attachment(entry: AttachOption) -> Attachment {
    let mut attachment = Attachment::new(entry.path, entry.alias);
    if let Some(kind) = entry.kind {
        attachment = attachment.kind(kind);
    }
    if entry.read_only {
        attachment = attachment.read_only();
    }
    if let Some(data_path) = entry.data_path {
        attachment = attachment.data_path(data_path);
    }
    attachment
}

fn check_name(what: &str, name: &str) -> DriverResult<()> {
    bare_name(name)
        .map(|_| ())
        .map_err(|e| DriverError::config(format!("{} name: {}", what, e)))
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
    pool_size: Option<usize>,
}

impl ConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database path. See [`DatabasePath::parse`].
    pub fn path(mut self, path: &str) -> Self {
        self.config.path = DatabasePath::parse(path);
        self
    }

    /// Use an in-memory database.
    pub fn in_memory(mut self) -> Self {
        self.config.path = DatabasePath::InMemory;
        self
    }

    /// Set the pool size. Only honoured in lakehouse mode.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn extension(mut self, extension: Extension) -> Self {
        self.config.extensions.push(extension);
        self
    }

    pub fn secret(mut self, secret: Secret) -> Self {
        self.config.secrets.push(secret);
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.config.attachments.push(attachment);
        self
    }

    /// Set the lakehouse data location.
    pub fn data_path(mut self, data_path: impl Into<String>) -> Self {
        self.config.data_path = Some(data_path.into());
        self
    }

    /// Set the lakehouse alias.
    pub fn lake_alias(mut self, alias: impl Into<String>) -> Self {
        self.config.lake_alias = Some(alias.into());
        self
    }

    /// Set the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.config.access_mode = mode;
        self
    }

    /// Set read-only mode.
    pub fn read_only(mut self) -> Self {
        self.config.access_mode = AccessMode::ReadOnly;
        self
    }

    /// Set the number of threads.
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = Some(threads);
        self
    }

    /// Set the memory limit.
    pub fn memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.config.memory_limit = Some(limit.into());
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> DriverResult<Config> {
        let mut config = self.config;

        config.pool_size = if config.is_lake() {
            match self.pool_size {
                Some(0) => return Err(DriverError::config("pool_size must be at least 1")),
                Some(size) => size,
                None => DEFAULT_LAKE_POOL_SIZE,
            }
        } else {
            if let Some(size) = self.pool_size.filter(|size| *size != 1) {
                warn!(
                    requested = size,
                    "Ignoring pool_size outside lakehouse mode, using a single connection"
                );
            }
            1
        };

        if let DatabasePath::Lake(path) = &config.path {
            if path.len() == LAKE_PREFIX.len() {
                return Err(DriverError::config("lakehouse path has nothing after ducklake:"));
            }
            if !config.extensions.iter().any(|e| e.name == LAKE_EXTENSION) {
                config.extensions.push(Extension::new(LAKE_EXTENSION));
            }
        } else if config.data_path.is_some() || config.lake_alias.is_some() {
            return Err(DriverError::config(
                "data_path and lake_alias require a ducklake: path",
            ));
        }

        if config.path == DatabasePath::InMemory && config.is_read_only() {
            return Err(DriverError::config("an in-memory database cannot be read-only"));
        }

        if config.threads == Some(0) {
            return Err(DriverError::config("threads must be at least 1"));
        }

        for extension in &config.extensions {
            check_name("extension", &extension.name)?;
        }
        for secret in &config.secrets {
            check_name("secret", &secret.name)?;
        }
        for attachment in &config.attachments {
            check_name("attachment", &attachment.alias)?;
            if let Some(kind) = &attachment.kind {
                check_name("attachment type", kind)?;
            }
        }
        if let Some(alias) = &config.lake_alias {
            check_name("lakehouse", alias)?;
        }

        Ok(config)
    }
}
