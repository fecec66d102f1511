//! Run-scoped persistence of uploaded files.

use super::types::{FileHandlerArtifact, StoreError, StoredFile, UploadedFile};
use crate::config::Config;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;

const LOGS_DIR_NAME: &str = "logs";

/// Locations used by [`FileStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandlerConfig {
    /// Root directory containing one directory per run.
    pub artifact_dir: PathBuf,
    /// Name of the sub-directory that receives the uploaded files.
    pub file_storage_dir_name: String,
}

impl FileHandlerConfig {
    /// Extract the store settings from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            artifact_dir: config.artifact_dir.clone(),
            file_storage_dir_name: config.file_storage_dir_name.clone(),
        }
    }
}

/// Persists uploads under `<artifact>/<timestamp>/<storage>/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: FileHandlerConfig,
}

impl FileStore {
    /// Create a store rooted at the configured artifact directory.
    pub fn new(config: FileHandlerConfig) -> Self {
        Self { config }
    }

    /// Settings the store was built with.
    pub fn config(&self) -> &FileHandlerConfig {
        &self.config
    }

    /// Create a fresh run directory and write every upload into it.
    pub async fn ingest(&self, files: &[UploadedFile]) -> Result<FileHandlerArtifact, StoreError> {
        let artifact = self.create_run(&run_timestamp()?).await?;
        for file in files {
            let stored = write_upload(artifact.file_storage_dir(), file).await?;
            tracing::debug!(name = %stored.name, path = %stored.path.display(), "Stored upload");
        }
        tracing::info!(
            run_dir = %artifact.run_dir().display(),
            file_count = files.len(),
            "Stored uploaded files"
        );
        Ok(artifact)
    }

    /// Create `<artifact>/<timestamp>/<storage>`, suffixing the run name when it already exists.
    pub async fn create_run(&self, timestamp: &str) -> Result<FileHandlerArtifact, StoreError> {
        let root = &self.config.artifact_dir;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: root.clone(),
                source,
            })?;

        let mut attempt = 0u32;
        let run_dir = loop {
            let name = if attempt == 0 {
                timestamp.to_string()
            } else {
                format!("{timestamp}-{attempt}")
            };
            let candidate = root.join(name);
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => break candidate,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => {
                    return Err(StoreError::CreateDir {
                        path: candidate,
                        source,
                    });
                }
            }
        };

        let storage_dir = run_dir.join(&self.config.file_storage_dir_name);
        tokio::fs::create_dir_all(&storage_dir)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: storage_dir.clone(),
                source,
            })?;
        Ok(FileHandlerArtifact::new(run_dir, storage_dir))
    }

    /// Remove the run directory owned by `artifact`.
    pub async fn cleanup(&self, artifact: &FileHandlerArtifact) -> Result<(), StoreError> {
        remove_dir(artifact.run_dir()).await?;
        tracing::debug!(run_dir = %artifact.run_dir().display(), "Removed run directory");
        Ok(())
    }

    /// Remove every run directory under the artifact root, returning how many were deleted.
    ///
    /// The log directory is left in place.
    pub async fn purge(&self) -> Result<usize, StoreError> {
        let root = &self.config.artifact_dir;
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(StoreError::Remove {
                    path: root.clone(),
                    source,
                });
            }
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::Remove {
                path: root.clone(),
                source,
            })?
        {
            let path = entry.path();
            if !path.is_dir() || entry.file_name() == LOGS_DIR_NAME {
                continue;
            }
            remove_dir(&path).await?;
            removed += 1;
        }
        tracing::info!(removed, root = %root.display(), "Purged run directories");
        Ok(removed)
    }
}

/// Lowercase the declared name, replace spaces with hyphens and drop any directory part.
pub fn normalize_file_name(name: &str) -> Result<String, StoreError> {
    let base = Path::new(name.trim())
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or_default();
    let normalized = base.trim().to_lowercase().replace(' ', "-");
    if normalized.is_empty() || normalized == "." || normalized == ".." {
        return Err(StoreError::InvalidFileName(name.to_string()));
    }
    Ok(normalized)
}

/// Current local time rendered as `MM_DD_YYYY_HH_MM_SS`.
pub fn run_timestamp() -> Result<String, StoreError> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format_timestamp(now)
}

fn format_timestamp(moment: OffsetDateTime) -> Result<String, StoreError> {
    let format =
        format_description!("[month]_[day]_[year]_[hour]_[minute]_[second]");
    Ok(moment.format(format)?)
}

async fn write_upload(dir: &Path, file: &UploadedFile) -> Result<StoredFile, StoreError> {
    let name = normalize_file_name(&file.name)?;
    let path = dir.join(&name);
    tokio::fs::write(&path, &file.bytes)
        .await
        .map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(StoredFile { name, path })
}

async fn remove_dir(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn store_in(root: &Path) -> FileStore {
        FileStore::new(FileHandlerConfig {
            artifact_dir: root.to_path_buf(),
            file_storage_dir_name: "file_storage".into(),
        })
    }

    #[test]
    fn normalizes_declared_names() {
        assert_eq!(normalize_file_name("My Report.PDF").unwrap(), "my-report.pdf");
        assert_eq!(normalize_file_name("  notes.txt ").unwrap(), "notes.txt");
        assert_eq!(normalize_file_name("../../etc/Passwd").unwrap(), "passwd");
        assert!(normalize_file_name("   ").is_err());
        assert!(normalize_file_name("..").is_err());
    }

    #[test]
    fn formats_run_timestamp() {
        let moment = datetime!(2024-03-07 09:05:02 UTC);
        assert_eq!(format_timestamp(moment).unwrap(), "03_07_2024_09_05_02");
    }

    #[tokio::test]
    async fn ingest_writes_normalized_files() {
        let root = tempfile::tempdir().unwrap();
        let store = store_in(root.path());
        let files = vec![UploadedFile::new("My Report.PDF", b"%PDF".to_vec())];

        let artifact = store.ingest(&files).await.unwrap();

        assert!(artifact.file_storage_dir().ends_with("file_storage"));
        assert_eq!(artifact.file_storage_dir().parent(), Some(artifact.run_dir()));
        let stored = artifact.file_storage_dir().join("my-report.pdf");
        assert_eq!(std::fs::read(stored).unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn colliding_runs_get_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let store = store_in(root.path());

        let first = store.create_run("01_01_2024_00_00_00").await.unwrap();
        let second = store.create_run("01_01_2024_00_00_00").await.unwrap();
        let third = store.create_run("01_01_2024_00_00_00").await.unwrap();

        assert_ne!(first.run_dir(), second.run_dir());
        assert!(second.run_dir().ends_with("01_01_2024_00_00_00-1"));
        assert!(third.run_dir().ends_with("01_01_2024_00_00_00-2"));
    }

    #[tokio::test]
    async fn cleanup_and_purge_remove_runs_but_keep_logs() {
        let root = tempfile::tempdir().unwrap();
        let store = store_in(root.path());
        std::fs::create_dir_all(root.path().join("logs")).unwrap();

        let first = store.create_run("a").await.unwrap();
        store.create_run("b").await.unwrap();
        store.create_run("c").await.unwrap();

        store.cleanup(&first).await.unwrap();
        assert!(!first.run_dir().exists());

        let removed = store.purge().await.unwrap();
        assert_eq!(removed, 2);
        assert!(root.path().join("logs").exists());
    }

    #[tokio::test]
    async fn purge_of_missing_root_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let store = store_in(&root.path().join("missing"));
        assert_eq!(store.purge().await.unwrap(), 0);
    }
}
