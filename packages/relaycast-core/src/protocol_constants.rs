//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the locator scheme, the render engine's error
//! codes and the media MIME registry. Tunable timings live in
//! [`crate::state::Config`] instead.

// ─────────────────────────────────────────────────────────────────────────────
// Locator Scheme
// ─────────────────────────────────────────────────────────────────────────────

/// Scheme prefix identifying a peer-relay locator (`relay://<opaque-id>`).
pub const RELAY_SCHEME: &str = "relay://";

/// Legacy scheme emitted by older directory scrapers; treated as an alias of
/// [`RELAY_SCHEME`].
pub const LEGACY_RELAY_SCHEME: &str = "acestream://";

/// Query parameter name used when substituting a relay id into an endpoint.
pub const RELAY_ID_PARAM: &str = "id";

/// Fewest relay endpoints a configuration may list.
pub const MIN_RELAY_ENDPOINTS: usize = 3;

// ─────────────────────────────────────────────────────────────────────────────
// MIME Types
// ─────────────────────────────────────────────────────────────────────────────

/// Progressive MP4. Also used for every relay candidate, since relay
/// endpoints always proxy the stream over plain HTTP.
pub const MIME_MP4: &str = "video/mp4";

/// HLS playlist. Default for unrecognised HTTP(S) URLs and unknown schemes.
pub const MIME_HLS: &str = "application/x-mpegURL";

/// MPEG-DASH manifest.
pub const MIME_DASH: &str = "application/dash+xml";

// ─────────────────────────────────────────────────────────────────────────────
// Render Engine Error Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Load was aborted before completion.
pub const ENGINE_ERR_ABORTED: u16 = 1;

/// Network failure while fetching media.
pub const ENGINE_ERR_NETWORK: u16 = 2;

/// Media was fetched but could not be decoded.
pub const ENGINE_ERR_DECODE: u16 = 3;

/// Source format or location not supported.
pub const ENGINE_ERR_SRC_NOT_SUPPORTED: u16 = 4;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for directory API requests (seconds).
pub const DIRECTORY_TIMEOUT_SECS: u64 = 10;

/// Capacity of the broadcast channel for real-time events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "relaycast";

/// User agent sent with directory and probe requests.
pub const USER_AGENT: &str = concat!("relaycast/", env!("CARGO_PKG_VERSION"));
