//! Client Facade: filesystem-style operations over a remote WebDAV tree.
//!
//! The facade is stateless apart from a working directory used to resolve
//! relative paths. Every operation maps onto one or two protocol round
//! trips; nothing is cached between calls.

use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use log::debug;

use crate::client::WebdavClient;
use crate::config::{Config, DEFAULT_TEMP_DIR};
use crate::errors::{FsError, FsResult};
use crate::file::WebdavFile;
use crate::fs::{File, FileSystem, Metadata, OpenOptions};
use crate::fspath;

/// A remote WebDAV tree presented as a filesystem.
pub struct WebdavFs {
    client: Arc<WebdavClient>,
    cwd: Mutex<String>,
    temp_dir: String,
}

fn lock<'a>(m: &'a Mutex<String>) -> MutexGuard<'a, String> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl WebdavFs {
    /// Connect to the server described by `config`. Fails fast on invalid
    /// settings; no network traffic happens here.
    pub fn new(config: Config) -> FsResult<WebdavFs> {
        config.validate()?;
        let client = WebdavClient::new(&config)?;
        Ok(WebdavFs {
            client: Arc::new(client),
            cwd: Mutex::new("/".to_string()),
            temp_dir: config
                .temp_dir
                .unwrap_or_else(|| DEFAULT_TEMP_DIR.to_string()),
        })
    }

    fn resolve(&self, path: &str) -> String {
        fspath::resolve(&lock(&self.cwd), path)
    }

    /// Open for reading.
    pub fn open(&self, path: &str) -> FsResult<WebdavFile> {
        self.open_with(path, OpenOptions::read())
    }

    /// Create (or truncate) for reading and writing.
    pub fn create(&self, path: &str) -> FsResult<WebdavFile> {
        self.open_with(path, OpenOptions::create())
    }

    /// Open with explicit flags.
    pub fn open_with(&self, path: &str, opts: OpenOptions) -> FsResult<WebdavFile> {
        let full = self.resolve(path);
        debug!("open {} ({:?})", full, opts);

        let existing = match self.client.stat(&full) {
            Ok(meta) => Some(meta),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        match &existing {
            Some(meta) => {
                if opts.create_new {
                    return Err(FsError::Exists(full));
                }
                if meta.is_dir && opts.write {
                    return Err(FsError::invalid("open", &full));
                }
                if opts.write && opts.truncate {
                    // Truncation happens at open, not at flush; other
                    // readers must see the empty file right away.
                    return self.create_empty(full, opts);
                }
                let (initial, dirty) = if !opts.write || meta.is_dir {
                    (None, false)
                } else {
                    // In-place or appending writes need the current content
                    // so the eventual whole-body upload loses nothing.
                    (Some(self.fetch_content(&full)?), false)
                };
                Ok(WebdavFile::new(
                    self.client.clone(),
                    full,
                    opts,
                    existing,
                    initial,
                    dirty,
                ))
            }
            None => {
                if !opts.create && !opts.create_new {
                    return Err(FsError::NotFound(full));
                }
                if !opts.write {
                    return Err(FsError::invalid("open", &full));
                }
                // The file materializes on the server at open time; a
                // concurrent stat on the path must already see it.
                self.create_empty(full, opts)
            }
        }
    }

    /// Upload an empty body, then re-stat so the handle starts from the
    /// server's view of the fresh file.
    fn create_empty(&self, full: String, opts: OpenOptions) -> FsResult<WebdavFile> {
        self.client.put(&full, Vec::new())?;
        let meta = self.client.stat(&full)?;
        Ok(WebdavFile::new(
            self.client.clone(),
            full,
            opts,
            Some(meta),
            Some(Vec::new()),
            false,
        ))
    }

    fn fetch_content(&self, full: &str) -> FsResult<Vec<u8>> {
        let mut resp = self.client.get(full, 0)?;
        let mut buf = Vec::new();
        resp.read_to_end(&mut buf)
            .map_err(|e| FsError::from_io(e, full))?;
        Ok(buf)
    }

    /// Create one directory. The parent must already exist.
    pub fn mkdir(&self, path: &str) -> FsResult<()> {
        self.client.mkcol(&self.resolve(path))
    }

    /// Create a directory and any missing parents. Idempotent.
    pub fn mkdir_all(&self, path: &str) -> FsResult<()> {
        let full = self.resolve(path);
        let mut prefix = String::new();
        for seg in full.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(seg);
            match self.client.stat(&prefix) {
                Ok(meta) if meta.is_dir => {}
                Ok(_) => return Err(FsError::invalid("mkdir", &prefix)),
                Err(e) if e.is_not_found() => self.client.mkcol(&prefix)?,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Remove a file or directory. Removing a collection removes its whole
    /// subtree; WebDAV has no non-recursive collection delete.
    pub fn remove(&self, path: &str) -> FsResult<()> {
        self.client.delete(&self.resolve(path))
    }

    /// Like [`remove`](WebdavFs::remove), but a missing target is not an
    /// error.
    pub fn remove_all(&self, path: &str) -> FsResult<()> {
        match self.client.delete(&self.resolve(path)) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Rename/move a resource. Fails if the destination exists.
    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.client.mv(&self.resolve(from), &self.resolve(to))
    }

    /// Metadata for one resource.
    pub fn stat(&self, path: &str) -> FsResult<Metadata> {
        self.client.stat(&self.resolve(path))
    }

    /// Truncate a file by path. Only truncation to empty is expressible
    /// over WebDAV.
    pub fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let full = self.resolve(path);
        if size != 0 {
            return Err(FsError::invalid("truncate", &full));
        }
        self.client.put(&full, Vec::new())
    }

    /// Best-effort modified-time update via PROPPATCH.
    pub fn chtimes(&self, path: &str, mod_time: SystemTime) -> FsResult<()> {
        self.client.proppatch(&self.resolve(path), mod_time)
    }

    /// Read a whole file into memory.
    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let full = self.resolve(path);
        self.fetch_content(&full)
    }

    /// Write a whole file in one upload.
    pub fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        self.client.put(&self.resolve(path), data.to_vec())
    }

    /// List a directory in one call.
    pub fn read_dir(&self, path: &str) -> FsResult<Vec<Metadata>> {
        let mut f = self.open(path)?;
        let entries = f.read_dir(0);
        f.close()?;
        entries
    }

    /// The working directory used to resolve relative paths.
    pub fn getwd(&self) -> String {
        lock(&self.cwd).clone()
    }

    /// Change the working directory. The target must exist and be a
    /// directory.
    pub fn chdir(&self, path: &str) -> FsResult<()> {
        let full = self.resolve(path);
        let meta = self.client.stat(&full)?;
        if !meta.is_dir {
            return Err(FsError::invalid("chdir", &full));
        }
        *lock(&self.cwd) = full;
        Ok(())
    }

    /// Scratch directory path on the server.
    pub fn temp_dir(&self) -> &str {
        &self.temp_dir
    }
}

impl FileSystem for WebdavFs {
    fn open_file(&self, path: &str, opts: OpenOptions) -> FsResult<Box<dyn File>> {
        Ok(Box::new(self.open_with(path, opts)?))
    }

    fn mkdir(&self, path: &str) -> FsResult<()> {
        WebdavFs::mkdir(self, path)
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        WebdavFs::remove_all(self, path)
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        WebdavFs::rename(self, from, to)
    }

    fn stat(&self, path: &str) -> FsResult<Metadata> {
        WebdavFs::stat(self, path)
    }
}
