use std::fs;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::Deserialize;

use crate::error::Result;
use crate::policy::PeerRole;
use crate::rib::{Family, RouterId, DEFAULT_BATCH_SIZE};

struct Defaults {}

impl Defaults {
    fn enabled() -> bool {
        true
    }

    fn aigp() -> bool {
        false
    }

    fn batch_size() -> usize {
        DEFAULT_BATCH_SIZE
    }

    fn disconnect_hold() -> u64 {
        30
    }

    fn families() -> Vec<Family> {
        vec![Family::ipv4_unicast(), Family::ipv6_unicast()]
    }
}

/// Route a peer is treated as having announced
#[derive(Clone, Debug, Deserialize)]
pub struct RouteSpec {
    pub prefix: IpNetwork,
    pub next_hop: IpAddr,
    pub origin: Option<String>,
    // ASNs, "65000.100" dotted notation accepted
    #[serde(default = "Vec::new")]
    pub as_path: Vec<String>,
    pub local_pref: Option<u32>,
    pub med: Option<u32>,
    // "65000:100" or a single u32 value
    #[serde(default = "Vec::new")]
    pub communities: Vec<String>,
    // Cost to reach the next hop
    pub igp_metric: Option<u32>,
}

/// Config (toml) representation of a Peer Config
#[derive(Clone, Debug, Deserialize)]
pub(super) struct PeerConfigSpec {
    pub(super) remote_ip: IpAddr,
    pub(super) remote_as: u32,
    // Defaults to remote_ip when it is an IPv4 address
    pub(super) router_id: Option<RouterId>,
    // Derived from remote_as when not provided
    pub(super) role: Option<PeerRole>,

    // AFI/SAFI Families exchanged with this peer
    #[serde(default = "Defaults::families")]
    pub(super) families: Vec<Family>,

    // Honor the AIGP attribute on routes from this peer
    #[serde(default = "Defaults::aigp")]
    pub(super) aigp: bool,

    #[serde(default = "Defaults::enabled")]
    pub(super) enabled: bool,

    #[serde(default = "Vec::new")]
    pub(super) static_routes: Vec<RouteSpec>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerConfigSpec {
    pub(super) router_id: RouterId,
    pub(super) default_as: u32,
    // Route reflector cluster, defaults to router_id
    pub(super) cluster_id: Option<RouterId>,
    // Most queued updates handled per best path selection batch
    #[serde(default = "Defaults::batch_size")]
    pub(super) batch_size: usize,
    // Seconds a peer that went down is skipped by exports
    #[serde(default = "Defaults::disconnect_hold")]
    pub(super) disconnect_hold: u64,
    #[serde(default = "Vec::new")]
    pub(super) peers: Vec<PeerConfigSpec>,
}

impl ServerConfigSpec {
    pub(super) fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub(super) fn from_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = ServerConfigSpec::from_file("./demos/config.toml").unwrap();
        assert_eq!(config.router_id, "1.1.1.1".parse().unwrap());
        assert_eq!(config.default_as, 65000);
        assert_eq!(config.cluster_id, None);
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.peers.len(), 3);

        let client = config
            .peers
            .iter()
            .find(|p| p.remote_ip == "10.0.0.3".parse::<IpAddr>().unwrap())
            .unwrap();
        assert_eq!(client.role, Some(PeerRole::RrClient));
        assert!(client.aigp);
        assert_eq!(client.families, vec![Family::ipv4_unicast()]);

        let v6_peer = config
            .peers
            .iter()
            .find(|p| p.remote_ip == "2001:db8::2".parse::<IpAddr>().unwrap())
            .unwrap();
        assert_eq!(v6_peer.router_id, Some("2.2.2.2".parse().unwrap()));
        assert_eq!(v6_peer.families.len(), 2);
        assert_eq!(v6_peer.static_routes.len(), 1);
    }

    #[test]
    fn test_missing_required_key() {
        let err = ServerConfigSpec::from_str("router_id = \"1.1.1.1\"");
        assert!(err.is_err());
    }
}
