//! Protocol Client: one authenticated blocking HTTP round trip per WebDAV
//! primitive.
//!
//! Path-to-URL resolution is defensive: logical paths are cleaned before
//! they are joined onto the base URL's path, so a request can never escape
//! the configured base.

use std::time::SystemTime;

use http::{Method, StatusCode};
use log::{debug, trace};
use url::Url;

use crate::config::Config;
use crate::errors::{status_to_error, FsError, FsResult};
use crate::fs::Metadata;
use crate::fspath;
use crate::props::{self, Multistatus};

#[derive(Debug, Clone)]
enum Credentials {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

/// Blocking HTTP client speaking the WebDAV verb set against one server.
#[derive(Debug)]
pub(crate) struct WebdavClient {
    http: reqwest::blocking::Client,
    base_url: Url,
    creds: Credentials,
}

fn dav_method(name: &'static str) -> Method {
    // Only called with static, known-valid method names.
    Method::from_bytes(name.as_bytes()).expect("valid HTTP method name")
}

impl WebdavClient {
    pub(crate) fn new(config: &Config) -> FsResult<WebdavClient> {
        let mut base_url = Url::parse(&config.url).map_err(|e| FsError::Config {
            field: "url".to_string(),
            reason: format!("invalid url: {}", e),
        })?;
        // The base path always ends in a separator so joins are unambiguous.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = match &config.http_client {
            Some(client) => client.clone(),
            None => reqwest::blocking::Client::builder()
                .timeout(config.timeout.unwrap_or(crate::config::DEFAULT_TIMEOUT))
                .build()
                .map_err(|e| FsError::Config {
                    field: "http_client".to_string(),
                    reason: e.to_string(),
                })?,
        };

        // Bearer takes priority; validation has already rejected configs
        // that set both.
        let creds = if let Some(token) = config.bearer_token.as_deref().filter(|s| !s.is_empty()) {
            Credentials::Bearer(token.to_string())
        } else if config.username.is_some() || config.password.is_some() {
            Credentials::Basic {
                username: config.username.clone().unwrap_or_default(),
                password: config.password.clone().unwrap_or_default(),
            }
        } else {
            Credentials::None
        };

        Ok(WebdavClient {
            http,
            base_url,
            creds,
        })
    }

    /// Clean the logical path and join it under the base URL's path.
    pub(crate) fn build_url(&self, path: &str) -> Url {
        let cleaned = fspath::clean(path);
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        let full = if cleaned == "/" {
            if base_path.is_empty() {
                "/".to_string()
            } else {
                base_path
            }
        } else {
            format!("{}{}", base_path, fspath::encode(&cleaned))
        };
        url.set_path(&full);
        url
    }

    fn request(&self, method: Method, path: &str) -> reqwest::blocking::RequestBuilder {
        let req = self.http.request(method, self.build_url(path));
        match &self.creds {
            Credentials::None => req,
            Credentials::Basic { username, password } => req.basic_auth(username, Some(password)),
            Credentials::Bearer(token) => req.bearer_auth(token),
        }
    }

    fn send(
        &self,
        req: reqwest::blocking::RequestBuilder,
        path: &str,
    ) -> FsResult<reqwest::blocking::Response> {
        req.send().map_err(|e| FsError::Transport {
            path: path.to_string(),
            source: e,
        })
    }

    /// PROPFIND at the given depth: 0 for the resource itself, 1 for the
    /// resource plus its immediate children.
    ///
    /// A 404 short-circuits straight to not-exist (PROPFIND is the
    /// canonical existence check); anything other than 207 is a protocol
    /// error carrying the response body as diagnostic text.
    pub(crate) fn propfind(&self, path: &str, depth: u32) -> FsResult<Multistatus> {
        let req = self
            .request(dav_method("PROPFIND"), path)
            .header("Content-Type", "application/xml")
            .header("Depth", depth.to_string())
            .body(props::PROPFIND_BODY);
        let resp = self.send(req, path)?;
        let status = resp.status();
        trace!("PROPFIND {} depth {} -> {}", path, depth, status);

        if status == StatusCode::NOT_FOUND {
            return Err(FsError::NotFound(path.to_string()));
        }
        if status != StatusCode::MULTI_STATUS {
            let message = resp.text().unwrap_or_default();
            return Err(FsError::Protocol {
                status: status.as_u16(),
                method: "PROPFIND".to_string(),
                path: path.to_string(),
                message,
            });
        }

        let body = resp.bytes().map_err(|e| FsError::Transport {
            path: path.to_string(),
            source: e,
        })?;
        props::parse_multistatus(&body)
    }

    /// Stat one resource via a depth-0 PROPFIND. An empty multistatus
    /// means the resource does not exist.
    pub(crate) fn stat(&self, path: &str) -> FsResult<Metadata> {
        let ms = self.propfind(path, 0)?;
        match ms.responses.first() {
            Some(resp) => Ok(props::metadata_from_response(resp, path)),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// List the children of a collection via a depth-1 PROPFIND. The first
    /// entry is the collection itself and is skipped.
    pub(crate) fn read_dir(&self, path: &str) -> FsResult<Vec<Metadata>> {
        let mut dir_path = path.to_string();
        if !dir_path.ends_with('/') {
            dir_path.push('/');
        }
        let ms = self.propfind(&dir_path, 1)?;
        Ok(ms
            .responses
            .iter()
            .skip(1)
            .map(|resp| props::metadata_from_response(resp, &dir_path))
            .collect())
    }

    /// Ranged download. The response body is the (possibly partial)
    /// content stream, positioned at `offset`.
    pub(crate) fn get(&self, path: &str, offset: u64) -> FsResult<reqwest::blocking::Response> {
        let mut req = self.request(Method::GET, path);
        if offset > 0 {
            req = req.header("Range", format!("bytes={}-", offset));
        }
        let resp = self.send(req, path)?;
        let status = resp.status();
        trace!("GET {} offset {} -> {}", path, offset, status);
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(status_to_error(status, path));
        }
        Ok(resp)
    }

    /// Whole-body upload.
    pub(crate) fn put(&self, path: &str, data: Vec<u8>) -> FsResult<()> {
        let len = data.len();
        let req = self
            .request(Method::PUT, path)
            .header("Content-Type", "application/octet-stream")
            .body(data);
        let resp = self.send(req, path)?;
        let status = resp.status();
        debug!("PUT {} ({} bytes) -> {}", path, len, status);
        if status != StatusCode::CREATED && status != StatusCode::NO_CONTENT {
            return Err(status_to_error(status, path));
        }
        Ok(())
    }

    /// Partial upload with a Content-Range header. Depends on server
    /// support for partial PUT; not guaranteed by the WebDAV core spec.
    pub(crate) fn put_range(&self, path: &str, data: &[u8], offset: u64) -> FsResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset + data.len() as u64 - 1;
        let req = self
            .request(Method::PUT, path)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Range", format!("bytes {}-{}/*", offset, end))
            .body(data.to_vec());
        let resp = self.send(req, path)?;
        let status = resp.status();
        debug!("PUT {} range {}-{} -> {}", path, offset, end, status);
        if status != StatusCode::CREATED && status != StatusCode::NO_CONTENT {
            return Err(status_to_error(status, path));
        }
        Ok(())
    }

    /// Create a collection. Only 201 is success; "already exists" is an
    /// error here, callers that want idempotence stat first.
    pub(crate) fn mkcol(&self, path: &str) -> FsResult<()> {
        let resp = self.send(self.request(dav_method("MKCOL"), path), path)?;
        let status = resp.status();
        debug!("MKCOL {} -> {}", path, status);
        if status != StatusCode::CREATED {
            return Err(status_to_error(status, path));
        }
        Ok(())
    }

    /// Delete a resource. Deleting a collection removes the whole tree
    /// server-side; no client-side iteration.
    pub(crate) fn delete(&self, path: &str) -> FsResult<()> {
        let resp = self.send(self.request(Method::DELETE, path), path)?;
        let status = resp.status();
        debug!("DELETE {} -> {}", path, status);
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(status_to_error(status, path));
        }
        Ok(())
    }

    /// Rename/move. The destination goes in a Destination header as an
    /// absolute URL; Overwrite: F makes the server refuse to clobber an
    /// existing destination.
    pub(crate) fn mv(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let dest = self.build_url(new_path);
        let req = self
            .request(dav_method("MOVE"), old_path)
            .header("Destination", dest.as_str())
            .header("Overwrite", "F");
        let resp = self.send(req, old_path)?;
        let status = resp.status();
        debug!("MOVE {} -> {} : {}", old_path, new_path, status);
        if status != StatusCode::CREATED && status != StatusCode::NO_CONTENT {
            return Err(status_to_error(status, old_path));
        }
        Ok(())
    }

    /// Best-effort modified-time update. Many servers do not support
    /// PROPPATCH, so a non-207 response is swallowed; only transport-level
    /// failures surface.
    pub(crate) fn proppatch(&self, path: &str, mod_time: SystemTime) -> FsResult<()> {
        let req = self
            .request(dav_method("PROPPATCH"), path)
            .header("Content-Type", "application/xml")
            .body(props::proppatch_body(mod_time));
        let resp = self.send(req, path)?;
        let status = resp.status();
        if status != StatusCode::MULTI_STATUS {
            debug!("PROPPATCH {} unsupported by server ({}), ignoring", path, status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> WebdavClient {
        WebdavClient::new(&Config::new(base)).unwrap()
    }

    #[test]
    fn build_url_joins_under_base() {
        let c = client("http://example.com/dav");
        assert_eq!(c.build_url("/a/b.txt").as_str(), "http://example.com/dav/a/b.txt");
        assert_eq!(c.build_url("a/./b.txt").as_str(), "http://example.com/dav/a/b.txt");
        assert_eq!(c.build_url("/").as_str(), "http://example.com/dav");
    }

    #[test]
    fn build_url_cannot_escape_base() {
        let c = client("http://example.com/dav/");
        assert_eq!(
            c.build_url("/../../etc/passwd").as_str(),
            "http://example.com/dav/etc/passwd"
        );
    }

    #[test]
    fn build_url_encodes_reserved_characters() {
        let c = client("http://example.com/");
        assert_eq!(
            c.build_url("/with space/f.txt").as_str(),
            "http://example.com/with%20space/f.txt"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = WebdavClient::new(&Config::new("not a url")).unwrap_err();
        assert!(matches!(err, FsError::Config { .. }));
    }

    #[test]
    fn bearer_token_takes_priority() {
        let cfg = Config {
            url: "http://example.com/".to_string(),
            username: Some("u".to_string()),
            password: Some("p".to_string()),
            bearer_token: Some("tok".to_string()),
            ..Config::default()
        };
        let c = WebdavClient::new(&cfg).unwrap();
        assert!(matches!(c.creds, Credentials::Bearer(_)));
    }
}
