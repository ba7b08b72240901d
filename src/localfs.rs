//! Local Filesystem: the `FileSystem` contract over a directory tree on
//! disk, rooted so logical paths cannot escape it.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::trace;

use crate::errors::{FsError, FsResult};
use crate::fs::{File, FileSystem, Metadata, OpenOptions};
use crate::fspath;

/// A directory on the local disk served as a filesystem. All logical paths
/// are cleaned and joined under the root.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

fn metadata_from_std(name: &str, meta: &fs::Metadata) -> Metadata {
    Metadata {
        name: name.to_string(),
        len: meta.len(),
        is_dir: meta.is_dir(),
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        etag: None,
        content_type: None,
        created: None,
    }
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> LocalFs {
        LocalFs { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical path into the root. Cleaning first means `..` cannot
    /// climb out of the jail.
    fn full_path(&self, path: &str) -> PathBuf {
        let cleaned = fspath::clean(path);
        self.root.join(cleaned.trim_start_matches('/'))
    }
}

impl FileSystem for LocalFs {
    fn open_file(&self, path: &str, opts: OpenOptions) -> FsResult<Box<dyn File>> {
        let full = self.full_path(path);
        trace!("local open {:?} ({:?})", full, opts);

        let existing = match fs::metadata(&full) {
            Ok(m) => Some(m),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(FsError::from_io(e, path)),
        };
        let is_dir = existing.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        if is_dir && opts.write {
            return Err(FsError::invalid("open", path));
        }

        let mut std_opts = fs::OpenOptions::new();
        std_opts
            .read(opts.read || is_dir)
            .write(opts.write)
            .append(opts.append)
            .truncate(opts.truncate)
            .create(opts.create)
            .create_new(opts.create_new);
        let inner = std_opts.open(&full).map_err(|e| FsError::from_io(e, path))?;

        Ok(Box::new(LocalFile {
            inner: Some(inner),
            path: fspath::clean(path),
            fs_path: full,
            dir_entries: None,
            dir_pos: 0,
            is_dir,
        }))
    }

    fn mkdir(&self, path: &str) -> FsResult<()> {
        fs::create_dir(self.full_path(path)).map_err(|e| FsError::from_io(e, path))
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        let full = self.full_path(path);
        let result = match fs::metadata(&full) {
            Ok(m) if m.is_dir() => fs::remove_dir_all(&full),
            Ok(_) => fs::remove_file(&full),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::from_io(e, path)),
        }
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        fs::rename(self.full_path(from), self.full_path(to))
            .map_err(|e| FsError::from_io(e, from))
    }

    fn stat(&self, path: &str) -> FsResult<Metadata> {
        let full = self.full_path(path);
        let meta = fs::metadata(&full).map_err(|e| FsError::from_io(e, path))?;
        Ok(metadata_from_std(
            fspath::base_name(&fspath::clean(path)),
            &meta,
        ))
    }
}

/// An open handle on a local file or directory.
#[derive(Debug)]
pub struct LocalFile {
    /// `None` once closed.
    inner: Option<fs::File>,
    path: String,
    fs_path: PathBuf,
    dir_entries: Option<Vec<Metadata>>,
    dir_pos: usize,
    is_dir: bool,
}

impl LocalFile {
    fn inner(&mut self) -> FsResult<&mut fs::File> {
        match self.inner.as_mut() {
            Some(f) => Ok(f),
            None => Err(FsError::Closed(self.path.clone())),
        }
    }

    fn load_dir_entries(&mut self) -> FsResult<()> {
        if self.dir_entries.is_some() {
            return Ok(());
        }
        let mut entries = Vec::new();
        let iter = fs::read_dir(&self.fs_path).map_err(|e| FsError::from_io(e, &self.path))?;
        for entry in iter {
            let entry = entry.map_err(|e| FsError::from_io(e, &self.path))?;
            let meta = match entry.metadata() {
                Ok(m) => m,
                // Raced with a concurrent delete; skip the entry.
                Err(_) => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(metadata_from_std(&name, &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.dir_entries = Some(entries);
        self.dir_pos = 0;
        Ok(())
    }
}

impl Read for LocalFile {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.is_dir {
            return Err(FsError::invalid("read", &self.path).into());
        }
        Ok(self.inner()?.read(out)?)
    }
}

impl Write for LocalFile {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(self.inner()?.write(data)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.inner()?.flush()?)
    }
}

impl Seek for LocalFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner()?.seek(pos)
    }
}

impl File for LocalFile {
    fn name(&self) -> &str {
        &self.path
    }

    fn stat(&mut self) -> FsResult<Metadata> {
        let name = fspath::base_name(&self.path).to_string();
        let meta = self
            .inner()?
            .metadata()
            .map_err(|e| FsError::from_io(e, &self.path))?;
        Ok(metadata_from_std(&name, &meta))
    }

    fn read_dir(&mut self, count: usize) -> FsResult<Vec<Metadata>> {
        self.inner()?;
        if !self.is_dir {
            return Err(FsError::invalid("readdir", &self.path));
        }
        self.load_dir_entries()?;
        let entries = match self.dir_entries.as_ref() {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };
        let remaining = entries.len().saturating_sub(self.dir_pos);
        let take = if count == 0 {
            remaining
        } else {
            count.min(remaining)
        };
        let page = entries[self.dir_pos..self.dir_pos + take].to_vec();
        self.dir_pos += take;
        Ok(page)
    }

    fn read_at(&mut self, out: &mut [u8], offset: u64) -> FsResult<usize> {
        let path = self.path.clone();
        let f = self.inner()?;
        let saved = f
            .stream_position()
            .map_err(|e| FsError::from_io(e, &path))?;
        f.seek(SeekFrom::Start(offset))
            .map_err(|e| FsError::from_io(e, &path))?;
        let mut n = 0;
        loop {
            let r = f
                .read(&mut out[n..])
                .map_err(|e| FsError::from_io(e, &path))?;
            if r == 0 || n + r == out.len() {
                n += r;
                break;
            }
            n += r;
        }
        f.seek(SeekFrom::Start(saved))
            .map_err(|e| FsError::from_io(e, &path))?;
        Ok(n)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        let path = self.path.clone();
        let f = self.inner()?;
        let saved = f
            .stream_position()
            .map_err(|e| FsError::from_io(e, &path))?;
        f.seek(SeekFrom::Start(offset))
            .map_err(|e| FsError::from_io(e, &path))?;
        f.write_all(data).map_err(|e| FsError::from_io(e, &path))?;
        f.seek(SeekFrom::Start(saved))
            .map_err(|e| FsError::from_io(e, &path))?;
        Ok(data.len())
    }

    fn truncate(&mut self, size: u64) -> FsResult<()> {
        let path = self.path.clone();
        self.inner()?
            .set_len(size)
            .map_err(|e| FsError::from_io(e, &path))
    }

    fn sync(&mut self) -> FsResult<()> {
        let path = self.path.clone();
        self.inner()?
            .sync_all()
            .map_err(|e| FsError::from_io(e, &path))
    }

    fn close(&mut self) -> FsResult<()> {
        self.inner = None;
        self.dir_entries = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jail_cannot_be_escaped() {
        let fs = LocalFs::new("/srv/dav");
        assert_eq!(fs.full_path("/../../etc/passwd"), Path::new("/srv/dav/etc/passwd"));
        assert_eq!(fs.full_path("a/../b"), Path::new("/srv/dav/b"));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());

        let mut f = fs.open_file("/hello.txt", OpenOptions::create()).unwrap();
        f.write_all(b"hello world").unwrap();
        f.close().unwrap();

        let mut f = fs.open_file("/hello.txt", OpenOptions::read()).unwrap();
        let mut out = String::new();
        f.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");

        let meta = fs.stat("/hello.txt").unwrap();
        assert_eq!(meta.len, 11);
        assert_eq!(meta.name, "hello.txt");
        assert!(meta.is_file());
    }

    #[test]
    fn directory_listing_pages_and_ends() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        for name in ["a.txt", "b.txt", "c.txt"] {
            let mut f = fs
                .open_file(&format!("/{}", name), OpenOptions::create())
                .unwrap();
            f.close().unwrap();
        }

        let mut d = fs.open_file("/", OpenOptions::read()).unwrap();
        let first = d.read_dir(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, "a.txt");
        let rest = d.read_dir(0).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "c.txt");
        assert!(d.read_dir(0).unwrap().is_empty());
        assert!(d.read_dir(5).unwrap().is_empty());
    }

    #[test]
    fn positioned_io_leaves_offset_alone() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let mut f = fs.open_file("/f.bin", OpenOptions::create()).unwrap();
        f.write_all(b"0123456789").unwrap();
        f.seek(SeekFrom::Start(2)).unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(f.read_at(&mut buf, 5).unwrap(), 3);
        assert_eq!(&buf, b"567");
        assert_eq!(f.stream_position().unwrap(), 2);

        f.write_at(b"XY", 0).unwrap();
        assert_eq!(f.stream_position().unwrap(), 2);
        f.close().unwrap();

        let mut f = fs.open_file("/f.bin", OpenOptions::read()).unwrap();
        let mut all = Vec::new();
        f.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"XY23456789");
    }

    #[test]
    fn remove_all_tolerates_missing_targets() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        assert!(fs.remove_all("/not-there").is_ok());

        fs.mkdir("/d").unwrap();
        let mut f = fs.open_file("/d/x", OpenOptions::create()).unwrap();
        f.close().unwrap();
        fs.remove_all("/d").unwrap();
        assert!(fs.stat("/d").unwrap_err().is_not_found());
    }

    #[test]
    fn closed_handle_rejects_io() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let mut f = fs.open_file("/x", OpenOptions::create()).unwrap();
        f.close().unwrap();
        f.close().unwrap();
        assert!(matches!(f.stat(), Err(FsError::Closed(_))));
    }
}
