//! Local JSON file task source, same envelope rules as the HTTP endpoint.

use std::path::{Path, PathBuf};

use super::{parse_task_list, SourceError, TaskRecord, TaskSource};

pub struct FileTaskSource {
    path: PathBuf,
}

impl FileTaskSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl TaskSource for FileTaskSource {
    async fn fetch(&self) -> Result<Vec<TaskRecord>, SourceError> {
        tracing::info!(path = %self.path.display(), "Reading task list");
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let body = serde_json::from_str(&content)?;
        parse_task_list(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TaskId;

    #[tokio::test]
    async fn test_reads_wrapped_list_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"{"result":[{"id":3,"script":"echo 3","frequency_type":"specific_date","specific_date":"2024-05-01"}]}"#,
        )
        .unwrap();

        let records = FileTaskSource::new(&path).fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, TaskId::Number(3.into()));
        assert_eq!(records[0].specific_date.as_deref(), Some("2024-05-01"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = FileTaskSource::new("/definitely/not/here.json")
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "[{").unwrap();
        let err = FileTaskSource::new(&path).fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Json(_)));
    }
}
