//! WebDAV as a filesystem, in both directions.
//!
//! The client side turns a remote WebDAV tree into filesystem-style calls:
//! [`WebdavFs`] speaks PROPFIND/GET/PUT/MKCOL/DELETE/MOVE under the hood
//! and hands back [`Metadata`] records and open [`WebdavFile`] handles.
//!
//! The serving side goes the other way: [`DavServer`] adapts anything that
//! implements [`FileSystem`] (such as [`LocalFs`], a directory on disk)
//! into a WebDAV protocol handler, with pluggable authentication from the
//! [`auth`] module in front.
//!
//! # Client example
//!
//! ```no_run
//! use webdav_fs::{Config, WebdavFs};
//!
//! fn main() -> Result<(), webdav_fs::FsError> {
//!     let fs = WebdavFs::new(
//!         Config::new("https://dav.example.com/remote.php/dav/")
//!             .basic_auth("user", "secret"),
//!     )?;
//!     fs.write_file("/notes/todo.txt", b"buy milk")?;
//!     let meta = fs.stat("/notes/todo.txt")?;
//!     assert_eq!(meta.len, 8);
//!     Ok(())
//! }
//! ```
//!
//! # Server example
//!
//! ```no_run
//! use webdav_fs::auth::BasicAuth;
//! use webdav_fs::{DavServer, LocalFs};
//!
//! let dav = DavServer::builder(LocalFs::new("/srv/files"))
//!     .auth(BasicAuth::new("user", "secret"))
//!     .build();
//! // Feed `dav.handle(request).await` from any http server stack.
//! ```

pub mod auth;
mod client;
mod config;
mod errors;
mod file;
mod fs;
pub mod fspath;
mod localfs;
mod props;
mod server;
mod webdavfs;

pub use crate::config::{Config, DEFAULT_TEMP_DIR, DEFAULT_TIMEOUT};
pub use crate::errors::{status_to_error, FsError, FsResult};
pub use crate::file::WebdavFile;
pub use crate::fs::{File, FileSystem, Metadata, OpenOptions};
pub use crate::localfs::{LocalFile, LocalFs};
pub use crate::server::{DavAdapter, DavServer, DavServerBuilder, RequestHook};
pub use crate::webdavfs::WebdavFs;
