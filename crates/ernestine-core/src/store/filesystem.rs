use super::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, ListResult, Result, Store, StoreError,
};
use async_trait::async_trait;
use std::{
    fs::{create_dir_all, read_dir, remove_dir_all, remove_file, File, OpenOptions},
    io::{self, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

/// Stores one file per key directly under `base_path`.
///
/// Keys are used verbatim as file names; callers must supply keys that are
/// valid file names. Values are written in place: a failed write removes the
/// new file, but a crash during `create` can leave a truncated one behind.
pub struct FileSystemStore {
    base_path: PathBuf,
}

impl FileSystemStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl Store for FileSystemStore {
    async fn create_with(
        &self,
        key: &str,
        value: Vec<u8>,
        _options: &CreateOptions,
    ) -> Result<()> {
        // The base directory is gone after a cleanup.
        create_dir_all(&self.base_path)?;

        let path = self.base_path.join(key);
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(key.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        write_or_remove(file, &path, &value)?;
        tracing::debug!(key, size = value.len(), "Wrote file");
        Ok(())
    }

    async fn get_with(&self, key: &str, options: &GetOptions) -> Result<Vec<u8>> {
        let path = self.base_path.join(key);
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::DoesNotExist(key.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata()?;
        // Directories are not items; list skips them too.
        if !metadata.is_file() {
            return Err(StoreError::DoesNotExist(key.to_owned()));
        }

        // The hint never reserves more than the file holds.
        let len = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        let mut contents = Vec::with_capacity(options.size_hint.unwrap_or_default().min(len));
        file.read_to_end(&mut contents)?;
        Ok(contents)
    }

    async fn delete_with(&self, key: &str, _options: &DeleteOptions) -> Result<()> {
        let path = self.base_path.join(key);
        match path.symlink_metadata() {
            Ok(metadata) if metadata.is_dir() => {
                return Err(StoreError::DoesNotExist(key.to_owned()))
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::DoesNotExist(key.to_owned()))
            }
            Err(e) => return Err(e.into()),
        }
        match remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::DoesNotExist(key.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_with(&self, prefix: &str, _options: &ListOptions) -> Result<ListResult> {
        let entries = match read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ListResult::default()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // Non UTF-8 names cannot have been written through this store.
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(prefix) {
                keys.push(name);
            }
        }
        Ok(ListResult::new(keys))
    }

    async fn cleanup(&self) -> Result<()> {
        match remove_dir_all(&self.base_path) {
            Ok(()) => {
                tracing::info!(path = ?self.base_path, "Removed store directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `value` to a freshly created file, removing the file again if the
/// write fails so no partial item is left behind.
fn write_or_remove(mut out: impl Write, path: &Path, value: &[u8]) -> io::Result<()> {
    let Err(e) = out.write_all(value) else {
        return Ok(());
    };
    drop(out);
    if let Err(remove_err) = remove_file(path) {
        tracing::debug!(?path, error = %remove_err, "Could not remove partially written file");
    }
    Err(e)
}
