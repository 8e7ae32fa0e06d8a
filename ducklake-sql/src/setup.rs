//! Setup statements: extensions, secrets, attachments and transaction
//! control.
//!
//! Names emitted without quotes (extension names, secret names, attachment
//! aliases) must be plain words; anything else is rejected.

use serde::{Deserialize, Serialize};

use crate::error::CompileResult;
use crate::sql::{bare_name, quote_string};

/// `BEGIN TRANSACTION`.
pub const BEGIN: &str = "BEGIN TRANSACTION";
/// `COMMIT`.
pub const COMMIT: &str = "COMMIT";
/// `ROLLBACK`.
pub const ROLLBACK: &str = "ROLLBACK";

/// Where an extension is installed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionSource {
    /// The engine's default repository.
    #[default]
    Default,
    /// The core extension repository.
    Core,
    /// The community extension repository.
    Community,
    /// A custom repository URL.
    Url(String),
}

/// An engine extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub source: ExtensionSource,
    pub install: bool,
    pub load: bool,
}

impl Extension {
    /// An extension that is installed and loaded from the default source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ExtensionSource::Default,
            install: true,
            load: true,
        }
    }

    pub fn source(mut self, source: ExtensionSource) -> Self {
        self.source = source;
        self
    }

    pub fn install(mut self, install: bool) -> Self {
        self.install = install;
        self
    }

    pub fn load(mut self, load: bool) -> Self {
        self.load = load;
        self
    }

    /// `INSTALL <name>[ FROM ...]`.
    pub fn install_sql(&self) -> CompileResult<String> {
        let name = bare_name(&self.name)?;
        Ok(match &self.source {
            ExtensionSource::Default => format!("INSTALL {}", name),
            ExtensionSource::Core => format!("INSTALL {} FROM core", name),
            ExtensionSource::Community => format!("INSTALL {} FROM community", name),
            ExtensionSource::Url(url) => format!("INSTALL {} FROM {}", name, quote_string(url)),
        })
    }

    /// `LOAD <name>`.
    pub fn load_sql(&self) -> CompileResult<String> {
        Ok(format!("LOAD {}", bare_name(&self.name)?))
    }
}

/// Credential provider of a secret, with its provider-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretProvider {
    /// S3 or any S3-compatible store.
    S3 {
        key_id: String,
        secret: String,
        region: String,
        endpoint: Option<String>,
        use_ssl: Option<bool>,
        url_style: Option<String>,
        session_token: Option<String>,
    },
    /// Google Cloud Storage HMAC keys.
    Gcs { key_id: String, secret: String },
    /// Cloudflare R2.
    R2 {
        key_id: String,
        secret: String,
        account_id: String,
    },
    /// Azure Blob Storage.
    Azure { connection_string: String },
}

impl SecretProvider {
    /// The `TYPE` keyword.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "S3",
            Self::Gcs { .. } => "GCS",
            Self::R2 { .. } => "R2",
            Self::Azure { .. } => "AZURE",
        }
    }
}

/// A named credential set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub provider: SecretProvider,
    /// Restrict the secret to paths under this prefix.
    pub scope: Option<String>,
}

impl Secret {
    pub fn new(name: impl Into<String>, provider: SecretProvider) -> Self {
        Self {
            name: name.into(),
            provider,
            scope: None,
        }
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// `CREATE SECRET <name> (TYPE <T>, ...)`. Field order is fixed per
    /// provider, with `SCOPE` always last.
    pub fn create_sql(&self) -> CompileResult<String> {
        let name = bare_name(&self.name)?;
        let mut fields = vec![format!("TYPE {}", self.provider.type_name())];

        match &self.provider {
            SecretProvider::S3 {
                key_id,
                secret,
                region,
                endpoint,
                use_ssl,
                url_style,
                session_token,
            } => {
                fields.push(format!("KEY_ID {}", quote_string(key_id)));
                fields.push(format!("SECRET {}", quote_string(secret)));
                fields.push(format!("REGION {}", quote_string(region)));
                if let Some(endpoint) = endpoint {
                    fields.push(format!("ENDPOINT {}", quote_string(endpoint)));
                }
                if let Some(use_ssl) = use_ssl {
                    fields.push(format!("USE_SSL {}", use_ssl));
                }
                if let Some(url_style) = url_style {
                    fields.push(format!("URL_STYLE {}", quote_string(url_style)));
                }
                if let Some(token) = session_token {
                    fields.push(format!("SESSION_TOKEN {}", quote_string(token)));
                }
            }
            SecretProvider::Gcs { key_id, secret } => {
                fields.push(format!("KEY_ID {}", quote_string(key_id)));
                fields.push(format!("SECRET {}", quote_string(secret)));
            }
            SecretProvider::R2 {
                key_id,
                secret,
                account_id,
            } => {
                fields.push(format!("KEY_ID {}", quote_string(key_id)));
                fields.push(format!("SECRET {}", quote_string(secret)));
                fields.push(format!("ACCOUNT_ID {}", quote_string(account_id)));
            }
            SecretProvider::Azure { connection_string } => {
                fields.push(format!(
                    "CONNECTION_STRING {}",
                    quote_string(connection_string)
                ));
            }
        }

        if let Some(scope) = &self.scope {
            fields.push(format!("SCOPE {}", quote_string(scope)));
        }

        Ok(format!("CREATE SECRET {} ({})", name, fields.join(", ")))
    }

    /// `DROP SECRET <name>`.
    pub fn drop_sql(&self) -> CompileResult<String> {
        Ok(format!("DROP SECRET {}", bare_name(&self.name)?))
    }
}

/// An external database attached under a local alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File path or connection string.
    pub path: String,
    pub alias: String,
    /// External system type, e.g. `ducklake`, `postgres`, `sqlite`.
    pub kind: Option<String>,
    pub read_only: bool,
    /// Data location override.
    pub data_path: Option<String>,
}

impl Attachment {
    pub fn new(path: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: alias.into(),
            kind: None,
            read_only: false,
            data_path: None,
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn data_path(mut self, data_path: impl Into<String>) -> Self {
        self.data_path = Some(data_path.into());
        self
    }

    /// `ATTACH '<path>' AS <alias> [(TYPE T, READ_ONLY, DATA_PATH '<p>')]`.
    pub fn attach_sql(&self) -> CompileResult<String> {
        let alias = bare_name(&self.alias)?;
        let mut sql = format!("ATTACH {} AS {}", quote_string(&self.path), alias);

        let mut options = Vec::new();
        if let Some(kind) = &self.kind {
            options.push(format!("TYPE {}", bare_name(kind)?));
        }
        if self.read_only {
            options.push("READ_ONLY".to_string());
        }
        if let Some(data_path) = &self.data_path {
            options.push(format!("DATA_PATH {}", quote_string(data_path)));
        }

        if !options.is_empty() {
            sql.push_str(" (");
            sql.push_str(&options.join(", "));
            sql.push(')');
        }
        Ok(sql)
    }

    /// `DETACH <alias>`.
    pub fn detach_sql(&self) -> CompileResult<String> {
        detach_sql(&self.alias)
    }
}

/// `DETACH <alias>`.
pub fn detach_sql(alias: &str) -> CompileResult<String> {
    Ok(format!("DETACH {}", bare_name(alias)?))
}

/// `USE <alias>`.
pub fn use_sql(alias: &str) -> CompileResult<String> {
    Ok(format!("USE {}", bare_name(alias)?))
}
