//! Property Codec: translation between WebDAV multistatus XML bodies and
//! `Metadata` records, plus the fixed PROPFIND/PROPPATCH request bodies.
//!
//! Parsing is tolerant by design: unknown elements are ignored, a missing
//! or malformed size becomes 0, and an unparseable timestamp degrades to
//! "now". Only malformed XML itself is an error.

use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use xmltree::Element;

use crate::errors::{FsError, FsResult};
use crate::fs::Metadata;
use crate::fspath;

/// One `<response>` element of a multistatus body.
#[derive(Debug, Clone, Default)]
pub(crate) struct MsResponse {
    pub href: String,
    pub status: Option<String>,
    pub display_name: Option<String>,
    pub content_length: Option<String>,
    pub last_modified: Option<String>,
    pub is_collection: bool,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub creation_date: Option<String>,
}

/// A parsed multistatus body: an ordered sequence of per-resource entries.
///
/// An empty sequence is valid; for a PROPFIND it means "not found" and the
/// caller is responsible for turning it into a not-exist error.
#[derive(Debug, Default)]
pub(crate) struct Multistatus {
    pub responses: Vec<MsResponse>,
}

/// Decode a multistatus document. Fails with `FsError::Xml` on malformed
/// XML; the caller decides whether that is a protocol error.
pub(crate) fn parse_multistatus(body: &[u8]) -> FsResult<Multistatus> {
    let root = Element::parse(body).map_err(|e| FsError::Xml(e.to_string()))?;
    let mut ms = Multistatus::default();
    for resp in children_named(&root, "response") {
        ms.responses.push(parse_response(resp));
    }
    Ok(ms)
}

fn children_named<'a>(el: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    el.children
        .iter()
        .filter_map(|node| node.as_element())
        .filter(move |child| child.name == name)
}

fn text_of(el: &Element, name: &str) -> Option<String> {
    let child = el.get_child(name)?;
    let text = child.get_text()?.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_response(resp: &Element) -> MsResponse {
    let mut out = MsResponse {
        href: text_of(resp, "href").unwrap_or_default(),
        ..MsResponse::default()
    };
    // Take the first propstat's property block; extra propstats (404 blocks
    // for absent properties) are ignored.
    if let Some(propstat) = resp.get_child("propstat") {
        out.status = text_of(propstat, "status");
        if let Some(prop) = propstat.get_child("prop") {
            out.display_name = text_of(prop, "displayname");
            out.content_length = text_of(prop, "getcontentlength");
            out.last_modified = text_of(prop, "getlastmodified");
            out.etag = text_of(prop, "getetag");
            out.content_type = text_of(prop, "getcontenttype");
            out.creation_date = text_of(prop, "creationdate");
            out.is_collection = prop
                .get_child("resourcetype")
                .map(|rt| rt.get_child("collection").is_some())
                .unwrap_or(false);
        }
    }
    out
}

/// Derive a `Metadata` record from one multistatus entry.
///
/// The display name comes from the entry's href, falling back to the base
/// name of the requested path when the href yields an empty or root name.
/// Directory-ness is determined solely by the collection marker.
pub(crate) fn metadata_from_response(resp: &MsResponse, requested_path: &str) -> Metadata {
    let href = fspath::decode(&resp.href);
    let mut name = fspath::base_name(&href).to_string();
    if name.is_empty() || name == "/" {
        name = fspath::base_name(requested_path).to_string();
    }

    // Size parse failures deliberately degrade to 0.
    let len = resp
        .content_length
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    // Lossy on purpose: servers with nonstandard date formats get a
    // best-effort "now" timestamp.
    let modified = resp
        .last_modified
        .as_deref()
        .and_then(parse_webdav_time)
        .unwrap_or_else(SystemTime::now);

    Metadata {
        name,
        len,
        is_dir: resp.is_collection,
        modified,
        etag: resp.etag.clone(),
        content_type: resp.content_type.clone(),
        created: resp.creation_date.clone(),
    }
}

/// Parse the timestamp formats seen in the wild, in order: RFC 1123 with a
/// zone name (via RFC 2822), RFC 3339, then a few explicit fallbacks
/// (RFC 850, asctime, zoneless ISO 8601).
pub(crate) fn parse_webdav_time(s: &str) -> Option<SystemTime> {
    if let Ok(t) = DateTime::parse_from_rfc2822(s) {
        return Some(t.into());
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.into());
    }
    const FALLBACK_LAYOUTS: &[&str] = &[
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%SZ",
    ];
    for layout in FALLBACK_LAYOUTS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(Utc.from_utc_datetime(&t).into());
        }
    }
    None
}

/// Fixed PROPFIND body requesting the property set this crate understands.
/// Custom/extended property sets are not supported.
pub(crate) const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:displayname/>
    <D:getcontentlength/>
    <D:getlastmodified/>
    <D:resourcetype/>
    <D:getetag/>
    <D:getcontenttype/>
    <D:creationdate/>
  </D:prop>
</D:propfind>"#;

/// PROPPATCH body setting only the modified-time property, RFC 1123
/// formatted.
pub(crate) fn proppatch_body(mod_time: SystemTime) -> String {
    let stamp = DateTime::<Utc>::from(mod_time).format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<D:propertyupdate xmlns:D="DAV:">
  <D:set>
    <D:prop>
      <D:getlastmodified>{}</D:getlastmodified>
    </D:prop>
  </D:set>
</D:propertyupdate>"#,
        stamp
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dir/</D:href>
    <D:propstat>
      <D:prop>
        <D:displayname>dir</D:displayname>
        <D:resourcetype><D:collection/></D:resourcetype>
        <D:getlastmodified>Fri, 14 Mar 2025 10:30:00 GMT</D:getlastmodified>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/dir/test.txt</D:href>
    <D:propstat>
      <D:prop>
        <D:getcontentlength>11</D:getcontentlength>
        <D:getlastmodified>Fri, 14 Mar 2025 10:30:00 GMT</D:getlastmodified>
        <D:resourcetype/>
        <D:getetag>"abc-123"</D:getetag>
        <D:getcontenttype>text/plain</D:getcontenttype>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn parses_listing() {
        let ms = parse_multistatus(LISTING.as_bytes()).unwrap();
        assert_eq!(ms.responses.len(), 2);

        let dir = metadata_from_response(&ms.responses[0], "/dir");
        assert!(dir.is_dir);
        assert_eq!(dir.name, "dir");
        assert_eq!(dir.len, 0);

        let file = metadata_from_response(&ms.responses[1], "/dir");
        assert!(file.is_file());
        assert_eq!(file.name, "test.txt");
        assert_eq!(file.len, 11);
        assert_eq!(file.etag.as_deref(), Some("\"abc-123\""));
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn stat_entry_with_size_11_is_a_file() {
        // A stat on /test.txt against a server reporting size 11 and no
        // collection marker yields a file named test.txt with size 11.
        let body = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/test.txt</D:href>
    <D:propstat>
      <D:prop>
        <D:getcontentlength>11</D:getcontentlength>
        <D:resourcetype/>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;
        let ms = parse_multistatus(body.as_bytes()).unwrap();
        let meta = metadata_from_response(&ms.responses[0], "/test.txt");
        assert!(!meta.is_dir);
        assert_eq!(meta.len, 11);
        assert_eq!(meta.name, "test.txt");
    }

    #[test]
    fn root_href_falls_back_to_requested_path() {
        let resp = MsResponse {
            href: "/".to_string(),
            ..MsResponse::default()
        };
        let meta = metadata_from_response(&resp, "/backup/photos");
        assert_eq!(meta.name, "photos");
    }

    #[test]
    fn malformed_size_defaults_to_zero() {
        let resp = MsResponse {
            href: "/f".to_string(),
            content_length: Some("not-a-number".to_string()),
            ..MsResponse::default()
        };
        assert_eq!(metadata_from_response(&resp, "/f").len, 0);
    }

    #[test]
    fn malformed_xml_is_an_error_not_a_panic() {
        assert!(matches!(
            parse_multistatus(b"<D:multistatus>"),
            Err(FsError::Xml(_))
        ));
    }

    #[test]
    fn empty_multistatus_is_valid() {
        let body = r#"<?xml version="1.0"?><D:multistatus xmlns:D="DAV:"></D:multistatus>"#;
        let ms = parse_multistatus(body.as_bytes()).unwrap();
        assert!(ms.responses.is_empty());
    }

    #[test]
    fn unknown_elements_are_ignored() {
        let body = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/x</D:href>
    <D:vendorjunk>whatever</D:vendorjunk>
    <D:propstat>
      <D:prop>
        <D:getcontentlength>3</D:getcontentlength>
        <D:quota-used-bytes>9000</D:quota-used-bytes>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;
        let ms = parse_multistatus(body.as_bytes()).unwrap();
        assert_eq!(ms.responses.len(), 1);
        assert_eq!(metadata_from_response(&ms.responses[0], "/x").len, 3);
    }

    #[test]
    fn time_formats() {
        assert!(parse_webdav_time("Fri, 14 Mar 2025 10:30:00 GMT").is_some());
        assert!(parse_webdav_time("2025-03-14T10:30:00Z").is_some());
        assert!(parse_webdav_time("2025-03-14T10:30:00+02:00").is_some());
        assert!(parse_webdav_time("Friday, 14-Mar-25 10:30:00 GMT").is_some());
        assert!(parse_webdav_time("Fri Mar 14 10:30:00 2025").is_some());
        assert!(parse_webdav_time("definitely not a date").is_none());
    }

    #[test]
    fn proppatch_body_uses_rfc1123() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let body = proppatch_body(t);
        assert!(body.contains("<D:getlastmodified>Tue, 14 Nov 2023 22:13:20 GMT</D:getlastmodified>"));
        assert!(body.contains("propertyupdate"));
    }
}
