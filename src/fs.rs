//! The filesystem vocabulary shared by the client facade, the local
//! filesystem, and the serving-side adapter: metadata records, open flags,
//! and the `File`/`FileSystem` contracts.

use std::fmt::Debug;
use std::io::{Read, Seek, Write};
use std::time::SystemTime;

use crate::errors::{FsError, FsResult};

/// Metadata for one resource.
///
/// Constructed fresh from each PROPFIND response (or local stat); never
/// cached beyond a single operation except transiently on an open handle.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub name: String,
    pub len: u64,
    pub is_dir: bool,
    pub modified: SystemTime,
    /// Entity tag, verbatim from the server if it sent one.
    pub etag: Option<String>,
    pub content_type: Option<String>,
    /// Raw creation date string; format varies per server.
    pub created: Option<String>,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// Synthesized permission bits. WebDAV carries no mode information;
    /// directories get a fixed readable/listable pattern, files a fixed
    /// readable/writable pattern.
    pub fn mode(&self) -> u32 {
        if self.is_dir {
            0o755
        } else {
            0o644
        }
    }
}

/// Open mode flags, mirroring the usual open(2) set.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub create_new: bool,
}

impl OpenOptions {
    pub fn new() -> OpenOptions {
        OpenOptions::default()
    }

    /// Read-only.
    pub fn read() -> OpenOptions {
        OpenOptions {
            read: true,
            ..OpenOptions::default()
        }
    }

    /// Read-write, creating and truncating as needed. The flag set used by
    /// `create()` on the facades.
    pub fn create() -> OpenOptions {
        OpenOptions {
            read: true,
            write: true,
            create: true,
            truncate: true,
            ..OpenOptions::default()
        }
    }

    /// A handle opened with these flags may not be read from.
    pub(crate) fn write_only(&self) -> bool {
        self.write && !self.read
    }
}

/// An open file handle.
///
/// Handles are single-owner: an open handle's buffer and cached metadata
/// are not safe for concurrent use without external synchronization.
pub trait File: Read + Write + Seek + Send + Debug {
    /// The cleaned path this handle was opened with.
    fn name(&self) -> &str;

    /// Metadata for the open resource, cached on the handle.
    fn stat(&mut self) -> FsResult<Metadata>;

    /// Read directory entries. `count == 0` returns all remaining entries;
    /// `count > 0` returns at most that many. An empty vector signals the
    /// end of the listing and repeats idempotently.
    fn read_dir(&mut self, count: usize) -> FsResult<Vec<Metadata>>;

    /// Like [`read_dir`](File::read_dir), but only the entry names.
    fn read_dir_names(&mut self, count: usize) -> FsResult<Vec<String>> {
        Ok(self.read_dir(count)?.into_iter().map(|m| m.name).collect())
    }

    /// Write a string at the current offset.
    fn write_str(&mut self, s: &str) -> FsResult<usize> {
        let path = self.name().to_string();
        self.write(s.as_bytes())
            .map_err(|e| FsError::from_io(e, &path))
    }

    /// Positioned read. Does not move the handle's offset.
    fn read_at(&mut self, out: &mut [u8], offset: u64) -> FsResult<usize>;

    /// Positioned write, issued immediately. Does not move the handle's
    /// offset and does not go through the write buffer.
    fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize>;

    /// Truncate to `size` bytes. Remote handles only support `size == 0`.
    fn truncate(&mut self, size: u64) -> FsResult<()>;

    /// Flush buffered writes without closing the handle.
    fn sync(&mut self) -> FsResult<()>;

    /// Flush and close. Idempotent: later calls are no-ops returning `Ok`.
    fn close(&mut self) -> FsResult<()>;
}

/// The filesystem operation set required of a local filesystem on the
/// serving side and provided by the remote facade on the client side.
pub trait FileSystem: Send + Sync {
    fn open_file(&self, path: &str, opts: OpenOptions) -> FsResult<Box<dyn File>>;
    fn mkdir(&self, path: &str) -> FsResult<()>;
    /// Remove a file or a whole directory tree.
    fn remove_all(&self, path: &str) -> FsResult<()>;
    fn rename(&self, from: &str, to: &str) -> FsResult<()>;
    fn stat(&self, path: &str) -> FsResult<Metadata>;
}
