//! Moving one uploaded package into the pool.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::extract::{extract, PackageMetadata, PackageParser};
use crate::storage::{ObjectRef, Tree};

/// Result of ingesting one uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub metadata: PackageMetadata,
    /// The pool already held a file at the destination; nothing was copied
    /// and the index must not be touched.
    pub duplicate: bool,
}

/// Places uploaded packages into the pool of one component.
#[derive(Clone)]
pub struct IngestProcessor {
    tree: Tree,
    parser: Arc<dyn PackageParser>,
    component: String,
}

impl std::fmt::Debug for IngestProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestProcessor")
            .field("tree", &self.tree)
            .field("component", &self.component)
            .finish()
    }
}

impl IngestProcessor {
    pub fn new<S: Into<String>>(tree: Tree, parser: Arc<dyn PackageParser>, component: S) -> Self {
        Self {
            tree,
            parser,
            component: component.into(),
        }
    }

    /// Ingest the package stored at `source`.
    pub async fn process(&self, source: &ObjectRef) -> Result<IngestOutcome> {
        let metadata = {
            // The scratch copy is removed when `scratch` drops, on every path.
            let scratch = self.tree.download(source).await?;
            let data = tokio::fs::read(scratch.path()).await?;
            extract(
                self.parser.as_ref(),
                &data,
                &self.component,
                source.file_name(),
            )?
        };

        if self.tree.exists(&metadata.destination_path).await? {
            warn!(
                source = %source,
                destination = %metadata.destination_path,
                "Package already in pool, skipping"
            );
            return Ok(IngestOutcome {
                metadata,
                duplicate: true,
            });
        }

        self.tree
            .copy_from(&metadata.destination_path, source)
            .await?;
        info!(
            source = %source,
            destination = %metadata.destination_path,
            package = %metadata.package,
            architecture = %metadata.architecture,
            "Package added to pool"
        );

        Ok(IngestOutcome {
            metadata,
            duplicate: false,
        })
    }
}
