//! File storage collaborator
//!
//! The ledger never touches files directly. It asks a [`FileStorage`] to read
//! and write evidence bytes, so the same service runs against a local
//! directory, an in-memory map, or anything else implementing the trait.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Byte-level access to stored evidence copies
pub trait FileStorage: Send + Sync {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Write a file that must not exist yet; fails with `AlreadyExists`
    /// instead of replacing it
    fn write_new(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Where a stored file with this name lives
    fn resolve(&self, file_name: &str) -> PathBuf;
}

/// Evidence copies kept in a local directory
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Open the storage directory, creating it (owner-only on unix) if needed
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&root, fs::Permissions::from_mode(0o700))?;
        }

        tracing::info!("Evidence storage at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileStorage for LocalFileStorage {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        write_with(options, path, bytes)
    }

    fn write_new(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        write_with(options, path, bytes)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn resolve(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

fn write_with(mut options: OpenOptions, path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file: File = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Evidence copies held in memory
#[derive(Debug, Default)]
pub struct MemoryFileStorage {
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileStorage for MemoryFileStorage {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no stored file at {}", path.display()),
                )
            })
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn write_new(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        match self
            .files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_path_buf())
        {
            Entry::Occupied(_) => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("stored file already exists at {}", path.display()),
            )),
            Entry::Vacant(slot) => {
                slot.insert(bytes.to_vec());
                Ok(())
            }
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no stored file at {}", path.display()),
                )
            })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    fn resolve(&self, file_name: &str) -> PathBuf {
        PathBuf::from(file_name)
    }
}
