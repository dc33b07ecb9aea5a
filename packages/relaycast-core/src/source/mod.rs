//! Source resolution: channel locators to playable source descriptors.
//!
//! Resolution is pure and total. Every locator yields a descriptor; whether
//! the descriptor actually plays is decided by the playback layer.
//!
//! - `relay://<id>` locators expand into one candidate per relay endpoint,
//!   in table priority order.
//! - Everything else is a direct URL with a MIME hint sniffed from its
//!   extension.

mod endpoints;

pub use endpoints::{default_endpoint_templates, RelayEndpoint, RELAY_ENDPOINTS};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    LEGACY_RELAY_SCHEME, MIME_DASH, MIME_HLS, MIME_MP4, RELAY_ID_PARAM, RELAY_SCHEME,
};

/// One playable source option for a match, as returned by the directory.
///
/// Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelLocator {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// Raw locator: an HTTP(S) media URL or a `relay://` identifier.
    #[serde(rename = "url")]
    pub raw_url: String,
}

impl ChannelLocator {
    pub fn new(id: u64, title: impl Into<String>, raw_url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            raw_url: raw_url.into(),
        }
    }
}

/// How a source is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// Plain HTTP(S) media URL, loaded as-is.
    Direct,
    /// Peer-relay stream, reached through one of the relay endpoints.
    Relay,
}

/// Playable description of a channel, derived from its locator.
///
/// Never mutated; a new descriptor is produced per locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub mime_type_hint: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_id: Option<String>,
    /// Concrete URLs to attempt, in order. Direct sources have exactly one.
    pub candidate_endpoints: Vec<String>,
}

impl SourceDescriptor {
    /// Number of candidates the state machine may attempt.
    pub fn candidate_count(&self) -> usize {
        self.candidate_endpoints.len()
    }

    /// Candidate URL at `index`, if in range.
    pub fn candidate(&self, index: usize) -> Option<&str> {
        self.candidate_endpoints.get(index).map(String::as_str)
    }

    pub fn is_relay(&self) -> bool {
        self.kind == SourceKind::Relay
    }

    /// Short label for display: `relay`, `mp4`, `hls`, `dash` or `web`.
    pub fn label(&self) -> &'static str {
        match (self.kind, self.mime_type_hint) {
            (SourceKind::Relay, _) => "relay",
            (SourceKind::Direct, MIME_MP4) => "mp4",
            (SourceKind::Direct, MIME_DASH) => "dash",
            (SourceKind::Direct, _) => match self.direct_url.as_deref() {
                Some(url) if path_of(url).contains(".m3u8") => "hls",
                _ => "web",
            },
        }
    }
}

/// Returns `true` if `raw_url` uses the relay scheme (or its legacy alias).
pub fn is_relay_locator(raw_url: &str) -> bool {
    raw_url.starts_with(RELAY_SCHEME) || raw_url.starts_with(LEGACY_RELAY_SCHEME)
}

/// Extracts the opaque relay id: everything after the scheme, cut at the first `?`.
///
/// Returns `None` for non-relay locators.
pub fn extract_relay_id(raw_url: &str) -> Option<&str> {
    let rest = raw_url
        .strip_prefix(RELAY_SCHEME)
        .or_else(|| raw_url.strip_prefix(LEGACY_RELAY_SCHEME))?;
    Some(rest.split('?').next().unwrap_or(rest))
}

/// Builds the proxied URL for `relay_id` through `template`.
fn relay_url(template: &str, relay_id: &str) -> String {
    format!("{}?{}={}", template, RELAY_ID_PARAM, relay_id)
}

/// URL without query string or fragment, lower-cased for extension sniffing.
fn path_of(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase()
}

/// Picks a MIME hint from the URL's extension.
///
/// Unrecognised URLs default to HLS: most live mirrors serve adaptive
/// playlists behind extension-less paths.
fn sniff_mime(url: &str) -> &'static str {
    let path = path_of(url);
    if path.contains(".mp4") {
        MIME_MP4
    } else if path.contains(".m3u8") {
        MIME_HLS
    } else if path.contains(".mpd") {
        MIME_DASH
    } else {
        MIME_HLS
    }
}

/// Resolves locators against a relay endpoint table.
///
/// Cheap to clone; the table is shared.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    endpoints: Arc<[String]>,
}

impl SourceResolver {
    /// Creates a resolver over the given endpoint templates (priority order).
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints: endpoints.into(),
        }
    }

    /// Endpoint templates in priority order.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Resolves a locator into a source descriptor. Never fails.
    pub fn resolve(&self, locator: &ChannelLocator) -> SourceDescriptor {
        self.resolve_url(&locator.raw_url)
    }

    /// Resolves a raw locator string.
    pub fn resolve_url(&self, raw_url: &str) -> SourceDescriptor {
        if let Some(relay_id) = extract_relay_id(raw_url) {
            let candidate_endpoints = self
                .endpoints
                .iter()
                .map(|template| relay_url(template, relay_id))
                .collect();
            return SourceDescriptor {
                kind: SourceKind::Relay,
                mime_type_hint: MIME_MP4,
                direct_url: None,
                relay_id: Some(relay_id.to_string()),
                candidate_endpoints,
            };
        }

        let mime_type_hint = if raw_url.starts_with("http://") || raw_url.starts_with("https://") {
            sniff_mime(raw_url)
        } else {
            log::debug!("[Resolver] Unrecognised locator scheme: {}", raw_url);
            MIME_HLS
        };

        SourceDescriptor {
            kind: SourceKind::Direct,
            mime_type_hint,
            direct_url: Some(raw_url.to_string()),
            relay_id: None,
            candidate_endpoints: vec![raw_url.to_string()],
        }
    }

    /// Proxied URL for `relay_id` through the endpoint at `index`.
    ///
    /// The index wraps around the table, so callers can rotate endpoints
    /// without bounds checks. Returns `None` only for an empty table.
    pub fn relay_candidate_url(&self, relay_id: &str, index: usize) -> Option<String> {
        if self.endpoints.is_empty() {
            return None;
        }
        let template = &self.endpoints[index % self.endpoints.len()];
        Some(relay_url(template, relay_id))
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new(default_endpoint_templates())
    }
}

/// Resolves a locator against the built-in endpoint table.
pub fn resolve(locator: &ChannelLocator) -> SourceDescriptor {
    SourceResolver::default().resolve(locator)
}
