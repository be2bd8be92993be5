//! Persistence of the finalized result set
//!
//! A sink is invoked at most once per run, and only after every stage
//! succeeded. The JSON file sink writes an array of `{id, code}` objects.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{PersistError, Result};

use super::record::DecodedRecord;

/// Destination of a successful run's result set.
#[async_trait]
pub trait PersistenceSink: Send {
    /// Persist the full result set
    ///
    /// # Returns
    /// * `Result<u64>` - Number of bytes written
    async fn write(&mut self, records: &[DecodedRecord]) -> Result<u64>;
}

/// Writes the result set as one JSON array to a file.
///
/// Output goes to a temporary sibling first and is renamed over the target
/// once complete, so a failed write never leaves a partial artifact behind.
pub struct JsonFileSink {
    /// Path to the output file
    path: PathBuf,
    /// Pretty-print with two-space indentation
    pretty: bool,
}

impl JsonFileSink {
    /// Create a new JSON file sink
    ///
    /// Fails early when the parent directory does not exist.
    pub fn new(path: impl Into<PathBuf>, pretty: bool) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;
        debug!("Created JSON sink for: {}", path.display());
        Ok(Self { path, pretty })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn serialize(&self, records: &[DecodedRecord]) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(records)
        } else {
            serde_json::to_vec(records)
        };
        encoded.map_err(|e| PersistError::Serialize(e.to_string()).into())
    }

    async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut writer = create_writer(path).await?;
        writer
            .write_all(bytes)
            .await
            .map_err(|e| PersistError::WriteFailed(format!("{}: {e}", path.display())))?;
        writer
            .flush()
            .await
            .map_err(|e| PersistError::WriteFailed(format!("{}: {e}", path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for JsonFileSink {
    async fn write(&mut self, records: &[DecodedRecord]) -> Result<u64> {
        let bytes = self.serialize(records)?;
        let tmp = self.tmp_path();

        if let Err(e) = Self::write_file(&tmp, &bytes).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(PersistError::WriteFailed(format!(
                "rename to {}: {e}",
                self.path.display()
            ))
            .into());
        }

        debug!(
            "Wrote {} records ({} bytes) to {}",
            records.len(),
            bytes.len(),
            self.path.display()
        );
        Ok(bytes.len() as u64)
    }
}

/// Create a buffered file writer, replacing any existing file
async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).await.map_err(|e| {
        PersistError::WriteFailed(format!("Failed to create {}: {e}", path.display()))
    })?;
    Ok(BufWriter::with_capacity(1024 * 1024, file))
}

/// Check that the output's parent directory exists and the path names a file
fn validate_path(path: &Path) -> Result<()> {
    if path.file_name().is_none() {
        return Err(PersistError::InvalidPath(format!(
            "Not a file path: {}",
            path.display()
        ))
        .into());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(PersistError::InvalidPath(format!(
                "Directory does not exist: {}",
                parent.display()
            ))
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use tokio::fs;

    fn record(id: &str, code: &str) -> DecodedRecord {
        DecodedRecord {
            id: id.to_string(),
            code: code.to_string(),
        }
    }

    #[tokio::test]
    async fn test_json_sink_writes_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let mut sink = JsonFileSink::new(&path, false).unwrap();

        let written = sink
            .write(&[record("1", "a"), record("2", "b")])
            .await
            .unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, r#"[{"id":"1","code":"a"},{"id":"2","code":"b"}]"#);
        assert_eq!(written, content.len() as u64);
        assert!(!dir.path().join("data.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_sink_empty_result_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        let mut sink = JsonFileSink::new(&path, false).unwrap();

        sink.write(&[]).await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_json_sink_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pretty.json");
        let mut sink = JsonFileSink::new(&path, true).unwrap();

        sink.write(&[record("1", "a")]).await.unwrap();
        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("\n  {"));
        let parsed: Vec<DecodedRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, vec![record("1", "a")]);
    }

    #[tokio::test]
    async fn test_json_sink_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "stale content that is longer than the new one")
            .await
            .unwrap();

        let mut sink = JsonFileSink::new(&path, false).unwrap();
        sink.write(&[]).await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "[]");
    }

    #[test]
    fn test_json_sink_invalid_directory() {
        let result = JsonFileSink::new("/nonexistent/directory/data.json", false);
        assert!(matches!(
            result,
            Err(ExtractError::Persist(PersistError::InvalidPath(_)))
        ));
    }
}
