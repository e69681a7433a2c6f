use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Directory of files replaced atomically: write to a temp file, fsync,
/// rename over the target.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// `Ok(None)` if the file does not exist.
    pub fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.resolve_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn put(&self, key: &str, value: &[u8]) -> io::Result<()> {
        let path = self.resolve_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        let result = (|| -> io::Result<()> {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(value)?;
            f.flush()?;
            f.sync_all()?;
            fs::rename(&tmp_path, &path)?;
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    pub fn exists(&self, key: &str) -> bool {
        self.resolve_path(key).exists()
    }
}
