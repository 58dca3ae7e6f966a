mod file;

pub use file::RouteSpec;

use std::convert::TryFrom;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, RibError};
use crate::policy::PeerRole;
use crate::rib::{ClusterId, Families, RouterId};

/// Parse a TOML config file and return a ServerConfig
pub fn from_file(path: &str) -> Result<ServerConfig> {
    let spec = file::ServerConfigSpec::from_file(path)?;
    ServerConfig::from_spec(spec)
}

/// Parse TOML config contents
pub fn from_str(contents: &str) -> Result<ServerConfig> {
    let spec = file::ServerConfigSpec::from_str(contents)?;
    ServerConfig::from_spec(spec)
}

#[derive(Debug)]
pub struct ServerConfig {
    pub router_id: RouterId,
    pub default_as: u32,
    pub cluster_id: ClusterId,
    pub batch_size: usize,
    pub disconnect_hold: Duration,
    pub peers: Vec<Arc<PeerConfig>>,
}

/// In-Memory Server representation of a Peer config
///   Has missing PeerConfigSpec items defaulted to Server values
#[derive(Debug)]
pub struct PeerConfig {
    pub remote_ip: IpAddr,
    pub remote_as: u32,
    pub local_as: u32,
    pub router_id: RouterId,
    pub role: PeerRole,
    pub families: Families,
    pub aigp: bool,
    pub enabled: bool,
    pub static_routes: Vec<RouteSpec>,
}

impl PeerConfig {
    // Is this an eBGP session
    pub fn is_ebgp(&self) -> bool {
        self.remote_as != self.local_as
    }
}

impl ServerConfig {
    fn from_spec(spec: file::ServerConfigSpec) -> Result<Self> {
        if spec.batch_size == 0 {
            return Err(RibError::config("batch_size must be at least 1"));
        }
        let peers = spec
            .peers
            .into_iter()
            .map(|p| -> Result<Arc<PeerConfig>> {
                let router_id = match p.router_id {
                    Some(router_id) => router_id,
                    None => RouterId::try_from(p.remote_ip).map_err(|addr| {
                        RibError::config(format!("Peer {} needs a router_id", addr))
                    })?,
                };
                let role = p.role.unwrap_or(if p.remote_as != spec.default_as {
                    PeerRole::Ebgp
                } else {
                    PeerRole::Ibgp
                });
                Ok(Arc::new(PeerConfig {
                    remote_ip: p.remote_ip,
                    remote_as: p.remote_as,
                    local_as: spec.default_as,
                    router_id,
                    role,
                    families: Families::new(p.families),
                    aigp: p.aigp,
                    enabled: p.enabled,
                    static_routes: p.static_routes,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            router_id: spec.router_id,
            default_as: spec.default_as,
            cluster_id: ClusterId::from(spec.cluster_id.unwrap_or(spec.router_id)),
            batch_size: spec.batch_size,
            disconnect_hold: Duration::from_secs(spec.disconnect_hold),
            peers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::Family;

    #[test]
    fn test_defaults_resolved() {
        let config = from_file("./demos/config.toml").unwrap();
        assert_eq!(config.cluster_id, ClusterId::from(config.router_id));
        assert_eq!(config.disconnect_hold, Duration::from_secs(30));

        let ebgp = &config.peers[0];
        assert_eq!(ebgp.router_id, "10.0.0.2".parse().unwrap());
        assert_eq!(ebgp.role, PeerRole::Ebgp);
        assert!(ebgp.is_ebgp());
        assert!(ebgp.families.contains(Family::ipv6_unicast()));
        assert!(ebgp.enabled);
        assert!(!ebgp.aigp);

        assert_eq!(config.peers[1].role, PeerRole::RrClient);
        assert_eq!(config.peers[2].role, PeerRole::Ibgp);
    }

    #[test]
    fn test_ipv6_peer_needs_router_id() {
        let config = r#"
            router_id = "1.1.1.1"
            default_as = 65000
            cluster_id = "9.9.9.9"

            [[peers]]
            remote_ip = "2001:db8::2"
            remote_as = 100
        "#;
        assert!(matches!(from_str(config), Err(RibError::Config(_))));
    }

    #[test]
    fn test_explicit_cluster_id() {
        let config = r#"
            router_id = "1.1.1.1"
            default_as = 65000
            cluster_id = "9.9.9.9"
            batch_size = 50
            disconnect_hold = 5
        "#;
        let config = from_str(config).unwrap();
        assert_eq!(config.cluster_id, ClusterId::new(0x0909_0909));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.disconnect_hold, Duration::from_secs(5));
        assert!(config.peers.is_empty());
    }

    #[test]
    fn test_zero_batch_size() {
        let config = r#"
            router_id = "1.1.1.1"
            default_as = 65000
            batch_size = 0
        "#;
        assert!(from_str(config).is_err());
    }
}
