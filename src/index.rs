//! Packages indices and the Release manifest.
//!
//! Each (component, architecture) pair has a `Packages` index plus a gzip
//! copy. After any index change the Release manifest is regenerated from
//! every `Packages*` artifact under the distribution root, so it always
//! describes the whole tree rather than just the index that changed.

use apt_repository::packages::append_stanzas;
use apt_repository::{Compression, HashedFile, Release, ReleaseBuilder};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::storage::Tree;

/// How new stanza text is combined with an existing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Add the stanzas after whatever the index already holds.
    Append,
    /// Replace the index with exactly the given stanzas.
    Overwrite,
}

/// The architecture encoded in an index path such as
/// `main/binary-amd64/Packages.gz`.
pub fn architecture_of(path: &str) -> Option<&str> {
    lazy_regex::regex_captures!(r"(?:^|/)binary-([^/]+)/Packages", path).map(|(_, arch)| arch)
}

/// Writes Packages indices and the Release manifest of one distribution.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    tree: Tree,
    config: Arc<RepositoryConfig>,
}

impl IndexBuilder {
    pub fn new(tree: Tree, config: Arc<RepositoryConfig>) -> Self {
        Self { tree, config }
    }

    /// Update the index for `component`/`architecture` and regenerate the
    /// Release manifest.
    pub async fn rebuild(
        &self,
        component: &str,
        architecture: &str,
        stanza_text: &str,
        mode: WriteMode,
    ) -> Result<Release> {
        let packages_path = self.config.packages_path(component, architecture);

        let content = if mode == WriteMode::Append && self.tree.exists(&packages_path).await? {
            let existing = self.tree.read(&packages_path).await?;
            append_stanzas(&existing, stanza_text.as_bytes())
        } else {
            stanza_text.as_bytes().to_vec()
        };

        for compression in Compression::all() {
            let path = format!("{}{}", packages_path, compression.extension());
            let data = compression.compress(&content)?;
            debug!(path = %path, %compression, size = data.len(), "Writing index artifact");
            self.tree.write(&path, data).await?;
        }
        info!(path = %packages_path, ?mode, "Packages index written");

        self.write_release().await
    }

    /// Regenerate `Release` from the Packages artifacts currently in the tree.
    pub async fn write_release(&self) -> Result<Release> {
        let dist_dir = self.config.distribution_dir();
        let prefix = format!("{}/", dist_dir);

        let mut builder = ReleaseBuilder::new()
            .origin(&self.config.origin)
            .label(&self.config.label)
            .suite(&self.config.suite)
            .codename(&self.config.codename)
            .date(Utc::now())
            .components(self.config.components.clone())
            .description(&self.config.description);

        for path in self.tree.list(&prefix).await? {
            let Some(relative) = path.strip_prefix(&prefix) else {
                continue;
            };
            let is_index = relative
                .rsplit('/')
                .next()
                .is_some_and(|name| name.starts_with("Packages"));
            if !is_index {
                continue;
            }

            let data = self.tree.read(&path).await?;
            let file = HashedFile::from_data(relative, &data);
            debug!(path = %relative, size = file.size(), md5 = %file.digests.md5, "Hashed index artifact");
            if let Some(architecture) = architecture_of(relative) {
                builder = builder.architecture(architecture);
            }
            builder = builder.add_file(file);
        }

        let release = builder.build();
        let release_path = self.config.dist_file("Release");
        self.tree
            .write(&release_path, release.render().into_bytes())
            .await?;
        info!(
            path = %release_path,
            architectures = %release.architectures.join(" "),
            files = release.files.len(),
            "Release written"
        );
        Ok(release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{memory_tree, sample_config};
    use apt_repository::hash_data;

    const AMD64: &str = "Package: a\nArchitecture: amd64\n";
    const ARM64: &str = "Package: b\nArchitecture: arm64\n";

    fn builder() -> (Tree, IndexBuilder) {
        let (_store, tree) = memory_tree();
        let builder = IndexBuilder::new(tree.clone(), Arc::new(sample_config()));
        (tree, builder)
    }

    #[test]
    fn test_architecture_of() {
        assert_eq!(architecture_of("main/binary-amd64/Packages"), Some("amd64"));
        assert_eq!(architecture_of("main/binary-arm64/Packages.gz"), Some("arm64"));
        assert_eq!(architecture_of("binary-i386/Packages"), Some("i386"));
        assert_eq!(architecture_of("main/source/Sources"), None);
    }

    #[tokio::test]
    async fn test_first_write_and_append() {
        let (tree, builder) = builder();
        let path = "dists/stable/main/binary-amd64/Packages";

        builder
            .rebuild("main", "amd64", AMD64, WriteMode::Append)
            .await
            .unwrap();
        assert_eq!(tree.read(path).await.unwrap(), AMD64.as_bytes());

        builder
            .rebuild("main", "amd64", "Package: c\n", WriteMode::Append)
            .await
            .unwrap();
        let expected = format!("{}\r\nPackage: c\n", AMD64);
        assert_eq!(tree.read(path).await.unwrap(), expected.as_bytes());

        let gz = tree.read(&format!("{}.gz", path)).await.unwrap();
        assert_eq!(
            Compression::Gzip.decompress(&gz).unwrap(),
            expected.as_bytes()
        );
    }

    #[tokio::test]
    async fn test_overwrite_replaces_index() {
        let (tree, builder) = builder();
        builder
            .rebuild("main", "amd64", AMD64, WriteMode::Append)
            .await
            .unwrap();
        builder
            .rebuild("main", "amd64", "Package: z\n", WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(
            tree.read("dists/stable/main/binary-amd64/Packages")
                .await
                .unwrap(),
            b"Package: z\n"
        );
    }

    #[tokio::test]
    async fn test_release_covers_all_architectures() {
        let (tree, builder) = builder();
        builder
            .rebuild("main", "arm64", ARM64, WriteMode::Append)
            .await
            .unwrap();
        let release = builder
            .rebuild("main", "amd64", AMD64, WriteMode::Append)
            .await
            .unwrap();

        assert_eq!(release.architectures, vec!["amd64", "arm64"]);
        let paths: Vec<_> = release.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "main/binary-amd64/Packages",
                "main/binary-amd64/Packages.gz",
                "main/binary-arm64/Packages",
                "main/binary-arm64/Packages.gz",
            ]
        );

        let stored = tree.read("dists/stable/Release").await.unwrap();
        let text = String::from_utf8(stored).unwrap();
        assert!(text.contains("\nArchitectures: amd64 arm64\n"));
        assert!(text.contains("\nComponents: main\n"));

        let plain = hash_data(AMD64.as_bytes());
        assert!(text.contains(&format!(
            " {} {} main/binary-amd64/Packages\n",
            plain.sha256, plain.size
        )));
        let gz = tree
            .read("dists/stable/main/binary-amd64/Packages.gz")
            .await
            .unwrap();
        let gz_digests = hash_data(&gz);
        assert!(text.contains(&format!(
            " {} {} main/binary-amd64/Packages.gz\n",
            gz_digests.md5, gz_digests.size
        )));
    }

    #[tokio::test]
    async fn test_release_ignores_other_files() {
        let (tree, builder) = builder();
        tree.write("dists/stable/main/i18n/Translation-en", b"x".to_vec())
            .await
            .unwrap();
        tree.write("dists/stable/InRelease", b"old".to_vec())
            .await
            .unwrap();
        let release = builder.write_release().await.unwrap();
        assert!(release.files.is_empty());
        assert!(release.architectures.is_empty());
    }
}
