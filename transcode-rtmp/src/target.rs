//! Session target resolution from RTMP URLs.
//!
//! An RTMP URL `rtmp://host[:port]/app/stream` is split into the
//! application path sent in `connect` and the stream path sent in
//! `play`/`publish`. Applications may span two path segments, so paths with
//! more than two segments put the first two in the application.

use crate::error::{Result, RtmpError};
use serde::{Deserialize, Serialize};
use url::Url;

fn request_uri(u: &Url) -> String {
    let mut uri = match u.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    };
    if let Some(query) = u.query().filter(|q| !q.is_empty()) {
        uri.push('?');
        uri.push_str(query);
    }
    // restore the '#' escaped by create_url
    uri.replace("%23", "#")
}

/// Split a URL into application and stream paths.
pub fn split_path(u: &Url) -> (String, String) {
    let uri = request_uri(u);
    let segments: Vec<&str> = uri.split('/').collect();

    match segments.len() {
        2 => (segments[1].to_string(), String::new()),
        3 => (segments[1].to_string(), segments[2].to_string()),
        n if n > 3 => (segments[1..3].join("/"), segments[3..].join("/")),
        _ => (String::new(), String::new()),
    }
}

/// The `tcUrl` sent in `connect`: the URL without query, with the path
/// replaced by the application.
pub fn tc_url(u: &Url) -> String {
    let (app, _) = split_path(u);
    let mut base = u.clone();
    base.set_query(None);
    base.set_path("/");
    format!("{}{}", base, app)
}

/// Build the URL of a session from the `tcUrl` received in `connect` and
/// the application and stream paths.
pub fn create_url(tc_url: &str, app: &str, stream: &str) -> Result<Url> {
    let base = match Url::parse(tc_url) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) if tc_url.starts_with("//") => {
            return Err(RtmpError::InvalidUrl("invalid scheme".into()))
        }
        Err(url::ParseError::RelativeUrlWithoutBase | url::ParseError::EmptyHost) => {
            return Err(RtmpError::InvalidUrl("invalid host".into()))
        }
        Err(e) => return Err(e.into()),
    };

    let host = match base.host_str() {
        Some(h) if !h.is_empty() => h,
        _ => return Err(RtmpError::InvalidUrl("invalid host".into())),
    };
    let authority = match base.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    // a stream may contain '#', which must stay in the path
    Ok(Url::parse(&format!(
        "{}://{}/{}/{}",
        base.scheme(),
        authority,
        app.replace('#', "%23"),
        stream.replace('#', "%23")
    ))?)
}

/// Whether the peer plays or publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    /// The peer reads the stream.
    Playing,
    /// The peer writes the stream.
    Publishing,
}

/// What a session reads or writes, resolved during initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    /// Full URL of the stream.
    pub url: Url,
    /// Direction of the session.
    pub role: SessionRole,
}

impl SessionTarget {
    /// Application path.
    pub fn app(&self) -> String {
        split_path(&self.url).0
    }

    /// Stream path, query string included.
    pub fn stream(&self) -> String {
        split_path(&self.url).1
    }
}
