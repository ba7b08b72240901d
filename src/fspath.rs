//! Utility module for slash-separated logical paths.
//!
//! All remote paths in this crate are absolute, `/`-separated, and cleaned:
//! no empty segments, no `.` or `..`. Cleaning never lets a path escape the
//! root, so joining a cleaned path onto a base prefix is safe.

use percent_encoding as pct;
use percent_encoding::AsciiSet;

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const PATH_ENCODE_SET: &AsciiSet = &pct::NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Clean a path: collapse repeated separators and `.`/`..` segments, and
/// anchor the result at `/`. `..` at the root is dropped, so the result
/// can never climb above the root.
pub fn clean(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    if out.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", out.join("/"))
    }
}

/// Resolve `path` against the working directory `cwd`: absolute paths are
/// cleaned as-is, relative paths are joined onto `cwd` first.
pub fn resolve(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        clean(path)
    } else {
        clean(&format!("{}/{}", cwd, path))
    }
}

/// Last element of a cleaned path. The root maps to `/`.
pub fn base_name(path: &str) -> &str {
    let p = path.trim_end_matches('/');
    if p.is_empty() {
        return "/";
    }
    match p.rfind('/') {
        Some(idx) => &p[idx + 1..],
        None => p,
    }
}

/// Parent of a cleaned path. The root is its own parent.
pub fn parent(path: &str) -> String {
    let p = path.trim_end_matches('/');
    match p.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => p[..idx].to_string(),
    }
}

/// Percent-encode a path for use in a request URL, leaving `/` intact.
pub fn encode(path: &str) -> String {
    pct::utf8_percent_encode(path, PATH_ENCODE_SET).to_string()
}

/// Decode a percent-encoded URL path back into a logical path.
pub fn decode(path: &str) -> String {
    pct::percent_decode_str(path)
        .decode_utf8_lossy()
        .into_owned()
}
