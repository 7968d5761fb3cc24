use crate::api::compat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A peer node as recorded in the local `nodes` table or served by
/// `get_nodes_list`. `reputation_score` is clamped to `[0, 100]` and only
/// ever written through the store gateway's serialized RMW.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, deserialize_with = "compat::u16_lenient")]
    pub port: u16,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, deserialize_with = "compat::u64_lenient")]
    pub last_seen: u64,
    #[serde(default = "default_reputation", deserialize_with = "compat::u64_lenient")]
    pub reputation_score: u64,
    #[serde(default)]
    pub metadata: Value,
}

fn default_status() -> String {
    "active".to_string()
}

fn default_reputation() -> u64 {
    50
}

impl NodeRecord {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Base URL for this peer: `scheme://host[:port]`, preferring the
    /// advertised domain over the raw IP and omitting scheme-default ports.
    pub fn endpoint(&self) -> Option<String> {
        let protocol = if !self.protocol.is_empty() {
            self.protocol.as_str()
        } else {
            self.metadata_str("protocol").unwrap_or("http")
        };

        let host = self
            .domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| self.metadata_str("domain"))
            .unwrap_or(self.ip.as_str());
        if host.is_empty() {
            return None;
        }

        let default_port = match protocol {
            "https" => 443,
            _ => 80,
        };
        if self.port == 0 || self.port == default_port {
            Some(format!("{}://{}", protocol, host))
        } else {
            Some(format!("{}://{}:{}", protocol, host, self.port))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(ip: &str, port: u16, protocol: &str, metadata: Value) -> NodeRecord {
        NodeRecord {
            node_id: "node-1".to_string(),
            ip: ip.to_string(),
            port,
            protocol: protocol.to_string(),
            domain: None,
            public_key: String::new(),
            version: String::new(),
            status: "active".to_string(),
            last_seen: 0,
            reputation_score: 50,
            metadata,
        }
    }

    #[test]
    fn endpoint_from_ip_and_port() {
        let n = node("10.0.0.5", 8080, "http", Value::Null);
        assert_eq!(n.endpoint().unwrap(), "http://10.0.0.5:8080");
    }

    #[test]
    fn endpoint_prefers_metadata_domain_and_protocol() {
        let n = node(
            "10.0.0.5",
            443,
            "",
            json!({"domain": "node.example.org", "protocol": "https"}),
        );
        assert_eq!(n.endpoint().unwrap(), "https://node.example.org");
    }

    #[test]
    fn endpoint_omits_default_port() {
        let n = node("10.0.0.5", 80, "http", Value::Null);
        assert_eq!(n.endpoint().unwrap(), "http://10.0.0.5");
    }

    #[test]
    fn endpoint_missing_host() {
        let n = node("", 8080, "http", Value::Null);
        assert!(n.endpoint().is_none());
    }
}
