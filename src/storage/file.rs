//! Filesystem storage backend.
//!
//! Each key maps to one file under a root directory: slash-separated key
//! segments become directories, and the final segment becomes a file whose
//! name is prefixed with `_` so files and sub-trees cannot collide. Writes
//! go to a temporary file first and are renamed into place after fsync.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{children_of, StorageBackend, StorageError};

/// One-file-per-key storage rooted at a directory.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Opens (and creates if needed) a storage root.
    ///
    /// # Errors
    ///
    /// Returns an error when the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| io_err("creating storage root", &root, &e))?;
        Ok(Self { root })
    }

    /// The root directory of this backend.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to (containing directory, file name).
    fn location(&self, key: &str) -> Result<(PathBuf, String), StorageError> {
        validate_key(key, false)?;
        let (dirs, leaf) = match key.rfind('/') {
            Some(idx) => (&key[..idx], &key[idx + 1..]),
            None => ("", key),
        };
        let mut path = self.root.clone();
        for segment in dirs.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        Ok((path, format!("_{leaf}")))
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let (dir, file) = self.location(key)?;
        let path = dir.join(file);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("reading", &path, &e)),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let (dir, file) = self.location(key)?;
        fs::create_dir_all(&dir).map_err(|e| io_err("creating directory", &dir, &e))?;

        // Dot-prefixed so a crash-leftover temp file is invisible to list().
        let temp = dir.join(format!(".{file}.tmp.{}", Uuid::new_v4()));
        let final_path = dir.join(file);

        let result = (|| {
            let mut f = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            f.write_all(value)?;
            f.sync_all()?;
            fs::rename(&temp, &final_path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(io_err("writing", &final_path, &e));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let (dir, file) = self.location(key)?;
        let path = dir.join(file);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_err("deleting", &path, &e)),
        }

        // Prune directories the removal emptied. remove_dir refuses
        // non-empty directories, which ends the walk.
        let mut current = path.parent();
        while let Some(d) = current {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            current = d.parent();
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        validate_key(prefix, true)?;
        let mut dir = self.root.clone();
        for segment in prefix.split('/').filter(|s| !s.is_empty()) {
            dir.push(segment);
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err("listing", &dir, &e)),
        };

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err("listing", &dir, &e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let file_type = entry.file_type().map_err(|e| io_err("listing", &dir, &e))?;
            if file_type.is_dir() {
                children.push(format!("{prefix}{name}/"));
            } else if let Some(leaf) = name.strip_prefix('_') {
                children.push(format!("{prefix}{leaf}"));
            }
            // Anything else (stray temp files) is ignored.
        }

        Ok(children_of(prefix, children.iter().map(String::as_str)))
    }
}

fn validate_key(key: &str, is_prefix: bool) -> Result<(), StorageError> {
    if !is_prefix && (key.is_empty() || key.ends_with('/')) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let segments: Vec<&str> = key.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        if segment.is_empty() && !(is_prefix && last) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        if *segment == "." || *segment == ".." {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
    }
    Ok(())
}

fn io_err(action: &str, path: &Path, e: &io::Error) -> StorageError {
    StorageError::Backend(format!("{action} {}: {e}", path.display()))
}
