//! Initialization pipeline: the setup statements run once when a connection
//! is established.
//!
//! Extensions come first, each installed then loaded, followed by secrets,
//! user attachments and finally the lakehouse attachment. The first failure
//! stops the run and is reported with its stage and component.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{DriverError, DriverResult};
use crate::handle::EngineHandle;

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtensionInstall,
    ExtensionLoad,
    SecretCreate,
    Attach,
    LakeAttach,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtensionInstall => "extension_install",
            Self::ExtensionLoad => "extension_load",
            Self::SecretCreate => "secret_create",
            Self::Attach => "attach",
            Self::LakeAttach => "lake_attach",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One setup statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub stage: Stage,
    /// Extension name, secret name or attachment alias.
    pub component: String,
    pub sql: String,
}

impl Step {
    fn new(stage: Stage, component: &str, sql: String) -> Self {
        Self {
            stage,
            component: component.to_string(),
            sql,
        }
    }
}

/// Build the ordered setup statements for a config.
pub fn plan(config: &Config) -> DriverResult<Vec<Step>> {
    let mut steps = Vec::new();

    for extension in &config.extensions {
        if extension.install {
            steps.push(Step::new(
                Stage::ExtensionInstall,
                &extension.name,
                extension.install_sql()?,
            ));
        }
        if extension.load {
            steps.push(Step::new(
                Stage::ExtensionLoad,
                &extension.name,
                extension.load_sql()?,
            ));
        }
    }

    for secret in &config.secrets {
        steps.push(Step::new(Stage::SecretCreate, &secret.name, secret.create_sql()?));
    }

    for attachment in &config.attachments {
        steps.push(Step::new(Stage::Attach, &attachment.alias, attachment.attach_sql()?));
    }

    if let Some(lake) = config.lake_attachment() {
        steps.push(Step::new(Stage::LakeAttach, &lake.alias, lake.attach_sql()?));
    }

    Ok(steps)
}

/// Execute steps in order, stopping at the first failure.
pub fn run<E: EngineHandle + ?Sized>(handle: &mut E, steps: &[Step]) -> DriverResult<()> {
    for step in steps {
        // Secret statements carry credentials and are never logged.
        if step.stage == Stage::SecretCreate {
            debug!(stage = %step.stage, component = %step.component, "Running setup step");
        } else {
            debug!(stage = %step.stage, component = %step.component, sql = %step.sql, "Running setup step");
        }
        handle
            .execute(&step.sql, &[])
            .map_err(|cause| DriverError::Initialization {
                stage: step.stage,
                component: step.component.clone(),
                cause,
            })?;
    }
    Ok(())
}
