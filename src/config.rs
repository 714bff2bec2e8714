//! Repository configuration.
//!
//! Every field can be given as a flag, through an `APT_*` environment
//! variable, or in a JSON file loaded with [`RepositoryConfig::from_file`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::storage::ObjectRef;

/// Static description of the repository being published.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RepositoryConfig {
    /// Path inside the destination bucket under which `dists/` and `pool/` live.
    #[arg(long, env = "APT_BASE_DIR", default_value = "")]
    pub base_dir: String,

    /// Distribution name, e.g. `stable`.
    #[arg(long, env = "APT_DISTRIBUTION", default_value = "")]
    pub distribution: String,

    #[arg(long, env = "APT_ORIGIN", default_value = "")]
    pub origin: String,

    #[arg(long, env = "APT_LABEL", default_value = "")]
    pub label: String,

    #[arg(long, env = "APT_SUITE", default_value = "")]
    pub suite: String,

    #[arg(long, env = "APT_CODENAME", default_value = "")]
    pub codename: String,

    /// Components, space separated. Uploads are placed in the first one.
    #[arg(long, env = "APT_COMPONENTS", value_delimiter = ' ', num_args = 1..)]
    pub components: Vec<String>,

    #[arg(long, env = "APT_DESCRIPTION", default_value = "")]
    pub description: String,

    /// Bucket holding the repository tree.
    #[arg(long, env = "APT_BUCKET", default_value = "")]
    pub bucket: String,

    /// Locator of the armoured private signing key, `<scheme>://<bucket>/<key>`.
    #[arg(long, env = "APT_PRIVATE_KEY_URL", default_value = "")]
    pub private_key_url: String,

    /// Passphrase protecting the signing key.
    #[arg(long, env = "APT_PRIVATE_KEY_PASSPHRASE", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub private_key_passphrase: Option<String>,

    /// Locator of the lock object, `<scheme>://<bucket>/<key>`.
    #[arg(long, env = "APT_LOCK_URL", default_value = "")]
    pub lock_url: String,
}

impl RepositoryConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Check that the configuration describes a usable repository.
    pub fn validate(&self) -> Result<()> {
        if self.distribution.trim().is_empty() {
            return Err(Error::Config("distribution must be set".to_string()));
        }
        if self.distribution.contains('/') {
            return Err(Error::Config(format!(
                "distribution {:?} must not contain '/'",
                self.distribution
            )));
        }
        if self.bucket.trim().is_empty() {
            return Err(Error::Config("bucket must be set".to_string()));
        }
        if self.components.is_empty() {
            return Err(Error::Config(
                "at least one component must be set".to_string(),
            ));
        }
        if let Some(component) = self
            .components
            .iter()
            .find(|c| c.is_empty() || c.contains('/'))
        {
            return Err(Error::Config(format!("invalid component {:?}", component)));
        }
        self.private_key_locator()?;
        self.lock_locator()?;
        Ok(())
    }

    /// The component new uploads are indexed under.
    pub fn default_component(&self) -> Result<&str> {
        self.components
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::Config("no components configured".to_string()))
    }

    /// `dists/<distribution>`, relative to the base path.
    pub fn distribution_dir(&self) -> String {
        format!("dists/{}", self.distribution)
    }

    /// Path of the Packages index for one component and architecture.
    pub fn packages_path(&self, component: &str, architecture: &str) -> String {
        format!(
            "{}/{}/binary-{}/Packages",
            self.distribution_dir(),
            component,
            architecture
        )
    }

    /// Path of a file at the distribution root, e.g. `Release`.
    pub fn dist_file(&self, name: &str) -> String {
        format!("{}/{}", self.distribution_dir(), name)
    }

    pub fn private_key_locator(&self) -> Result<ObjectRef> {
        ObjectRef::from_url(&self.private_key_url)
    }

    pub fn lock_locator(&self) -> Result<ObjectRef> {
        ObjectRef::from_url(&self.lock_url)
    }
}
