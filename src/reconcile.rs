//! Rebuilding every index from the pool contents.

use apt_repository::packages::join_stanzas;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::extract::{extract, PackageParser};
use crate::index::{IndexBuilder, WriteMode};
use crate::storage::Tree;

/// The component a pool path belongs to, e.g. `main` for
/// `pool/main/h/hello/hello_1.0_amd64.deb`.
pub fn pool_component(path: &str) -> Option<&str> {
    lazy_regex::regex_captures!(r"^pool/([^/]+)/.", path).map(|(_, component)| component)
}

/// Recomputes all Packages indices from the package files in the pool.
pub struct Reconciler {
    tree: Tree,
    parser: Arc<dyn PackageParser>,
    index: IndexBuilder,
    config: Arc<RepositoryConfig>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("tree", &self.tree)
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        tree: Tree,
        parser: Arc<dyn PackageParser>,
        index: IndexBuilder,
        config: Arc<RepositoryConfig>,
    ) -> Self {
        Self {
            tree,
            parser,
            index,
            config,
        }
    }

    /// Re-extract every pool package and overwrite the index of each
    /// architecture found. Returns the rebuilt architectures.
    ///
    /// Stanzas are grouped by architecture only and written to the first
    /// configured component, whichever pool component they came from.
    pub async fn reconcile(&self) -> Result<Vec<String>> {
        let target_component = self.config.default_component()?;
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        let mut paths = self.tree.list("pool/").await?;
        paths.sort();
        for path in paths {
            let Some(component) = pool_component(&path) else {
                warn!(path = %path, "Skipping object outside a pool component");
                continue;
            };
            if !path.ends_with(".deb") {
                continue;
            }

            let scratch = self.tree.download_path(&path).await?;
            let data = tokio::fs::read(scratch.path()).await?;
            let filename = path.rsplit('/').next().unwrap_or(&path);
            let metadata = extract(self.parser.as_ref(), &data, component, filename)?;
            if metadata.destination_path != path {
                warn!(
                    path = %path,
                    expected = %metadata.destination_path,
                    "Package is not at its canonical pool location"
                );
            }
            groups
                .entry(metadata.architecture)
                .or_default()
                .push(metadata.control_stanza);
        }

        if groups.is_empty() {
            info!("Pool holds no packages, refreshing Release only");
            self.index.write_release().await?;
            return Ok(Vec::new());
        }

        for (architecture, stanzas) in &groups {
            info!(
                architecture = %architecture,
                packages = stanzas.len(),
                "Regenerating index"
            );
            self.index
                .rebuild(
                    target_component,
                    architecture,
                    &join_stanzas(stanzas),
                    WriteMode::Overwrite,
                )
                .await?;
        }

        Ok(groups.into_keys().collect())
    }
}
