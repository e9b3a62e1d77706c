//! Recognized options per the external-interfaces contract: `listen.*`,
//! `peers.seed[]`, `network.*`, `limits.*`, `workers.count`. The format is a
//! flat `key = value` text file, one assignment per line, `#` comments,
//! repeatable keys collected into a list (used for `peers.seed`).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{PeerError, PeerResult};

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub listen_transport: String,
    pub listen_host: String,
    pub listen_port: u16,
    pub listen_tls_cert: Option<String>,
    pub listen_tls_key: Option<String>,
    pub peer_seeds: Vec<SocketAddr>,
    pub network_magic: u32,
    pub network_protocol_version: i32,
    pub network_user_agent: String,
    pub max_payload: u32,
    pub max_peers: usize,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub handshake_timeout: Duration,
    pub workers_count: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            listen_transport: "message".to_string(),
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8333,
            listen_tls_cert: None,
            listen_tls_key: None,
            peer_seeds: Vec::new(),
            network_magic: 0xDAB5_BFFA, // regtest, matches the teacher's default chain
            network_protocol_version: 70016,
            network_user_agent: "/rust-p2p-node:0.1/".to_string(),
            max_payload: 32 * 1024 * 1024,
            max_peers: 125,
            ping_interval: Duration::from_secs(120),
            pong_timeout: Duration::from_secs(20),
            handshake_timeout: Duration::from_secs(5),
            workers_count: num_cpus_hint(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> PeerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> PeerResult<Self> {
        let raw = parse_raw(text)?;
        let mut cfg = NodeConfig::default();

        if let Some(v) = raw.get_one("listen.transport") {
            cfg.listen_transport = v.clone();
        }
        if let Some(v) = raw.get_one("listen.host") {
            cfg.listen_host = v.clone();
        }
        if let Some(v) = raw.get_one("listen.port") {
            cfg.listen_port = parse_num(v, "listen.port")?;
        }
        cfg.listen_tls_cert = raw.get_one("listen.tls_cert").cloned();
        cfg.listen_tls_key = raw.get_one("listen.tls_key").cloned();

        for seed in raw.get_all("peers.seed") {
            let addr = seed
                .parse::<SocketAddr>()
                .map_err(|e| PeerError::protocol(format!("bad peers.seed '{seed}': {e}")))?;
            cfg.peer_seeds.push(addr);
        }

        if let Some(v) = raw.get_one("network.magic") {
            cfg.network_magic = parse_magic(v)?;
        }
        if let Some(v) = raw.get_one("network.protocol_version") {
            cfg.network_protocol_version = parse_num(v, "network.protocol_version")?;
        }
        if let Some(v) = raw.get_one("network.user_agent") {
            cfg.network_user_agent = v.clone();
        }
        if let Some(v) = raw.get_one("limits.max_payload") {
            cfg.max_payload = parse_num(v, "limits.max_payload")?;
        }
        if let Some(v) = raw.get_one("limits.max_peers") {
            cfg.max_peers = parse_num(v, "limits.max_peers")?;
        }
        if let Some(v) = raw.get_one("limits.ping_interval") {
            cfg.ping_interval = Duration::from_secs(parse_num(v, "limits.ping_interval")?);
        }
        if let Some(v) = raw.get_one("limits.pong_timeout") {
            cfg.pong_timeout = Duration::from_secs(parse_num(v, "limits.pong_timeout")?);
        }
        if let Some(v) = raw.get_one("limits.handshake_timeout") {
            cfg.handshake_timeout = Duration::from_secs(parse_num(v, "limits.handshake_timeout")?);
        }
        if let Some(v) = raw.get_one("workers.count") {
            cfg.workers_count = parse_num(v, "workers.count")?;
        }

        Ok(cfg)
    }
}

fn num_cpus_hint() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_num<T: std::str::FromStr>(raw: &str, key: &str) -> PeerResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| PeerError::protocol(format!("bad value for '{key}': '{raw}'")))
}

fn parse_magic(raw: &str) -> PeerResult<u32> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
            .map_err(|_| PeerError::protocol(format!("bad value for 'network.magic': '{raw}'")))
    } else {
        parse_num(raw, "network.magic")
    }
}

struct RawConfig {
    entries: HashMap<String, Vec<String>>,
}

impl RawConfig {
    fn get_one(&self, key: &str) -> Option<&String> {
        self.entries.get(key).and_then(|v| v.last())
    }

    fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn parse_raw(text: &str) -> PeerResult<RawConfig> {
    let mut entries: HashMap<String, Vec<String>> = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            PeerError::protocol(format!("line {}: expected 'key = value'", lineno + 1))
        })?;
        let key = key.trim().trim_end_matches("[]").to_string();
        let value = value.trim().to_string();
        entries.entry(key).or_default().push(value);
    }
    Ok(RawConfig { entries })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_recognized_keys() {
        let text = "
            # comment
            listen.transport = message
            listen.host = 127.0.0.1
            listen.port = 18444
            peers.seed[] = 127.0.0.1:18445
            peers.seed[] = 127.0.0.1:18446
            network.magic = 0xDAB5BFFA
            network.protocol_version = 70016
            limits.max_peers = 8
            limits.ping_interval = 30
            workers.count = 2
        ";
        let cfg = NodeConfig::from_str(text).unwrap();
        assert_eq!(cfg.listen_port, 18444);
        assert_eq!(cfg.peer_seeds.len(), 2);
        assert_eq!(cfg.network_magic, 0xDAB5_BFFA);
        assert_eq!(cfg.max_peers, 8);
        assert_eq!(cfg.ping_interval, Duration::from_secs(30));
        assert_eq!(cfg.workers_count, 2);
    }

    #[test]
    fn defaults_when_absent() {
        let cfg = NodeConfig::from_str("").unwrap();
        assert_eq!(cfg.listen_port, 8333);
        assert!(cfg.peer_seeds.is_empty());
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(NodeConfig::from_str("not-a-kv-pair").is_err());
    }
}
