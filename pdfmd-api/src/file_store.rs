use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub original_filename: String,
    pub storage_filename: String,
    pub file_size: u64,
    pub file_type: String,
    pub upload_time: chrono::DateTime<Utc>,
}

/// Only `.pdf` uploads are accepted, mirroring the source service's
/// `is_allowed_file` check — this is a conversion pipeline, not a general
/// file host.
pub fn is_allowed_file(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf")
}

/// Generates a file id in the `file-{YYYYMMDDHHMMSS}-{8 random alnum}`
/// shape the original service uses, so ids sort roughly by upload time.
pub fn generate_file_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("file-{timestamp}-{suffix}")
}

pub struct FileStore {
    upload_dir: PathBuf,
    index: RwLock<std::collections::HashMap<String, FileMetadata>>,
}

impl FileStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let upload_dir = upload_dir.into();
        std::fs::create_dir_all(&upload_dir)?;
        Ok(Self {
            upload_dir,
            index: RwLock::new(std::collections::HashMap::new()),
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn save(&self, original_filename: &str, data: &[u8]) -> std::io::Result<FileMetadata> {
        let file_id = generate_file_id();
        let storage_filename = format!("{file_id}.pdf");
        let path = self.upload_dir.join(&storage_filename);
        std::fs::write(&path, data)?;

        let metadata = FileMetadata {
            file_id: file_id.clone(),
            original_filename: original_filename.to_string(),
            storage_filename,
            file_size: data.len() as u64,
            file_type: "pdf".to_string(),
            upload_time: Utc::now(),
        };
        self.index
            .write()
            .unwrap()
            .insert(file_id, metadata.clone());
        Ok(metadata)
    }

    pub fn get_info(&self, file_id: &str) -> Option<FileMetadata> {
        self.index.read().unwrap().get(file_id).cloned()
    }

    pub fn path_for(&self, file_id: &str) -> Option<PathBuf> {
        self.get_info(file_id)
            .map(|m| self.upload_dir.join(m.storage_filename))
    }

    pub fn delete(&self, file_id: &str) -> std::io::Result<bool> {
        let Some(metadata) = self.index.write().unwrap().remove(file_id) else {
            return Ok(false);
        };
        let path = self.upload_dir.join(metadata.storage_filename);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(true)
    }

    pub fn list(&self) -> Vec<FileMetadata> {
        let mut files: Vec<_> = self.index.read().unwrap().values().cloned().collect();
        files.sort_by(|a, b| b.upload_time.cmp(&a.upload_time));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_allowed_file() {
        assert!(is_allowed_file("doc.pdf"));
        assert!(is_allowed_file("DOC.PDF"));
        assert!(!is_allowed_file("doc.docx"));
        assert!(!is_allowed_file("doc"));
    }

    #[test]
    fn test_file_id_shape() {
        let id = generate_file_id();
        assert!(id.starts_with("file-"));
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 14);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_save_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let meta = store.save("report.pdf", b"%PDF-1.4 fake").unwrap();
        assert_eq!(meta.original_filename, "report.pdf");
        assert!(store.get_info(&meta.file_id).is_some());
        assert_eq!(store.list().len(), 1);
        assert!(store.delete(&meta.file_id).unwrap());
        assert!(store.get_info(&meta.file_id).is_none());
    }

    #[test]
    fn test_delete_missing_file_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(!store.delete("file-does-not-exist").unwrap());
    }
}
