//! Open Handle: stateful reads, buffered writes, and directory paging for
//! one remote resource.
//!
//! Reads stream lazily from a ranged GET opened at the current offset;
//! seeking drops the stream so the next read reopens at the new position.
//! Writes accumulate in an in-memory buffer that is uploaded as a whole
//! body on `sync` or `close`. Positioned writes bypass the buffer and go
//! out immediately as partial PUTs.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::SystemTime;

use log::trace;

use crate::client::WebdavClient;
use crate::errors::{FsError, FsResult};
use crate::fs::{File, Metadata, OpenOptions};
use crate::fspath;

/// An open handle to a remote file or collection.
///
/// Single-owner: no internal locking. The buffer, the read stream, and the
/// listing cursor all live on the handle itself.
#[derive(Debug)]
pub struct WebdavFile {
    client: Arc<WebdavClient>,
    path: String,
    opts: OpenOptions,
    offset: u64,
    /// Whole-file content for writable handles; absent on read-only ones.
    buf: Option<Vec<u8>>,
    dirty: bool,
    stream: Option<reqwest::blocking::Response>,
    meta: Option<Metadata>,
    dir_entries: Option<Vec<Metadata>>,
    dir_pos: usize,
    closed: bool,
}

/// Copy `data` into `buf` at `offset`, zero-filling any gap and growing
/// the buffer as needed.
fn write_into(buf: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if buf.len() < end {
        buf.resize(end, 0);
    }
    buf[offset..end].copy_from_slice(data);
}

impl WebdavFile {
    pub(crate) fn new(
        client: Arc<WebdavClient>,
        path: String,
        opts: OpenOptions,
        meta: Option<Metadata>,
        initial: Option<Vec<u8>>,
        dirty: bool,
    ) -> WebdavFile {
        let buf = if opts.write {
            Some(initial.unwrap_or_default())
        } else {
            None
        };
        let offset = if opts.append {
            buf.as_ref().map(|b| b.len() as u64).unwrap_or(0)
        } else {
            0
        };
        WebdavFile {
            client,
            path,
            opts,
            offset,
            buf,
            dirty,
            stream: None,
            meta,
            dir_entries: None,
            dir_pos: 0,
            closed: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn check_open(&self) -> FsResult<()> {
        if self.closed {
            Err(FsError::Closed(self.path.clone()))
        } else {
            Ok(())
        }
    }

    fn handle_stat(&mut self) -> FsResult<Metadata> {
        self.check_open()?;
        // A dirty buffer is the truth about size until it is flushed.
        if self.dirty {
            if let Some(buf) = &self.buf {
                return Ok(Metadata {
                    name: fspath::base_name(&self.path).to_string(),
                    len: buf.len() as u64,
                    is_dir: false,
                    modified: SystemTime::now(),
                    etag: None,
                    content_type: None,
                    created: None,
                });
            }
        }
        if let Some(meta) = &self.meta {
            return Ok(meta.clone());
        }
        let meta = self.client.stat(&self.path)?;
        self.meta = Some(meta.clone());
        Ok(meta)
    }

    fn flush_buffer(&mut self) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(buf) = &self.buf {
            trace!("flush {} ({} bytes)", self.path, buf.len());
            self.client.put(&self.path, buf.clone())?;
        }
        self.dirty = false;
        self.meta = None;
        Ok(())
    }

    /// Logical length for end-relative seeks: the local buffer when the
    /// handle is writable, the server's size otherwise.
    fn seek_len(&mut self) -> FsResult<u64> {
        match &self.buf {
            Some(buf) => Ok(buf.len() as u64),
            None => Ok(self.handle_stat()?.len),
        }
    }
}

impl Read for WebdavFile {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        if self.opts.write_only() {
            return Err(FsError::invalid("read", &self.path).into());
        }
        if let Some(meta) = &self.meta {
            if meta.is_dir {
                return Err(FsError::invalid("read", &self.path).into());
            }
        }
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => {
                let resp = self.client.get(&self.path, self.offset)?;
                self.stream.insert(resp)
            }
        };
        let n = stream.read(out)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl Write for WebdavFile {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        if !self.opts.write {
            return Err(FsError::invalid("write", &self.path).into());
        }
        // Offsets past usize::MAX cannot be buffered in memory.
        let offset = usize::try_from(self.offset)
            .map_err(|_| FsError::invalid("write", &self.path))?;
        match self.buf.as_mut() {
            Some(buf) => write_into(buf, offset, data),
            None => return Err(FsError::invalid("write", &self.path).into()),
        }
        self.offset += data.len() as u64;
        self.dirty = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.flush_buffer()?;
        Ok(())
    }
}

impl Seek for WebdavFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_open()?;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(d) => self.offset as i128 + d as i128,
            SeekFrom::End(d) => self.seek_len()? as i128 + d as i128,
        };
        // A negative target is an error and must leave the offset alone.
        if target < 0 {
            return Err(FsError::invalid("seek", &self.path).into());
        }
        let target = target as u64;
        if target != self.offset {
            // The open GET stream is positioned at the old offset.
            self.stream = None;
            self.offset = target;
        }
        Ok(self.offset)
    }
}

impl File for WebdavFile {
    fn name(&self) -> &str {
        &self.path
    }

    fn stat(&mut self) -> FsResult<Metadata> {
        self.handle_stat()
    }

    fn read_dir(&mut self, count: usize) -> FsResult<Vec<Metadata>> {
        self.check_open()?;
        if self.dir_entries.is_none() {
            let meta = self.handle_stat()?;
            if !meta.is_dir {
                return Err(FsError::invalid("readdir", &self.path));
            }
            self.dir_entries = Some(self.client.read_dir(&self.path)?);
            self.dir_pos = 0;
        }
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
        self.check_open()?;
        if self.opts.write_only() {
            return Err(FsError::invalid("read", &self.path));
        }
        // Independent request; handle offset and stream are untouched.
        let mut resp = self.client.get(&self.path, offset)?;
        let mut n = 0;
        while n < out.len() {
            let r = resp
                .read(&mut out[n..])
                .map_err(|e| FsError::from_io(e, &self.path))?;
            if r == 0 {
                break;
            }
            n += r;
        }
        Ok(n)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        self.check_open()?;
        if !self.opts.write {
            return Err(FsError::invalid("write", &self.path));
        }
        self.client.put_range(&self.path, data, offset)?;
        self.meta = None;
        Ok(data.len())
    }

    fn truncate(&mut self, size: u64) -> FsResult<()> {
        self.check_open()?;
        if !self.opts.write {
            return Err(FsError::invalid("truncate", &self.path));
        }
        // There is no WebDAV primitive for shortening a resource in place;
        // only truncation to empty is expressible.
        if size != 0 {
            return Err(FsError::invalid("truncate", &self.path));
        }
        self.buf = Some(Vec::new());
        self.dirty = true;
        Ok(())
    }

    fn sync(&mut self) -> FsResult<()> {
        self.check_open()?;
        self.flush_buffer()
    }

    fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_buffer()?;
        self.stream = None;
        self.dir_entries = None;
        self.closed = true;
        Ok(())
    }
}

impl Drop for WebdavFile {
    fn drop(&mut self) {
        if !self.closed && self.dirty {
            // Last-resort flush; errors here have nowhere to go.
            if let Err(e) = self.flush_buffer() {
                log::warn!("dropping dirty handle {}: flush failed: {}", self.path, e);
            }
        }
    }
}
