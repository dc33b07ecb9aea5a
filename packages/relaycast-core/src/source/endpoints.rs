//! Static relay endpoint table.
//!
//! Relay locators cannot be played directly; each one is proxied through an
//! HTTP endpoint that accepts the opaque id as a query parameter. Entries
//! are tried in priority order.

/// A single HTTP proxy endpoint for relay streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayEndpoint {
    /// Human-readable host name, used in logs and events.
    pub name: &'static str,
    /// URL template; the relay id is appended as `?id=<relay-id>`.
    pub url: &'static str,
    /// Lower values are tried first.
    pub priority: u8,
}

/// Built-in endpoint table, already sorted by priority.
pub const RELAY_ENDPOINTS: &[RelayEndpoint] = &[
    RelayEndpoint {
        name: "ace.as-proxy.com",
        url: "https://ace.as-proxy.com/play",
        priority: 1,
    },
    RelayEndpoint {
        name: "acestream.proxy.manus.space",
        url: "https://acestream.proxy.manus.space/play",
        priority: 2,
    },
    RelayEndpoint {
        name: "aceplay.net",
        url: "https://aceplay.net/play",
        priority: 3,
    },
    RelayEndpoint {
        name: "acestream.online",
        url: "https://acestream.online/play",
        priority: 4,
    },
];

/// Returns the built-in endpoint templates in priority order.
pub fn default_endpoint_templates() -> Vec<String> {
    let mut endpoints: Vec<&RelayEndpoint> = RELAY_ENDPOINTS.iter().collect();
    endpoints.sort_by_key(|e| e.priority);
    endpoints.into_iter().map(|e| e.url.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_at_least_three_entries() {
        assert!(RELAY_ENDPOINTS.len() >= 3);
    }

    #[test]
    fn templates_follow_priority_order() {
        let templates = default_endpoint_templates();
        assert_eq!(templates.len(), RELAY_ENDPOINTS.len());
        assert_eq!(templates[0], "https://ace.as-proxy.com/play");
        assert_eq!(templates.last().unwrap(), "https://acestream.online/play");
    }
}
