use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::trace;

use super::RouterId;

/// Peers that went down recently
///
/// Exports to these peers are skipped until the hold time passes or the
/// peer registers again. Expired entries are dropped on lookup.
#[derive(Debug)]
pub struct DisconnectedPeers {
    hold: Duration,
    peers: Mutex<HashMap<RouterId, Instant>>,
}

impl DisconnectedPeers {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, peer: RouterId) {
        let mut peers = self.peers.lock().unwrap_or_else(|p| p.into_inner());
        peers.insert(peer, Instant::now());
        trace!("Peer {} marked disconnected for {:?}", peer, self.hold);
    }

    pub fn remove(&self, peer: RouterId) -> bool {
        let mut peers = self.peers.lock().unwrap_or_else(|p| p.into_inner());
        peers.remove(&peer).is_some()
    }

    pub fn contains(&self, peer: RouterId) -> bool {
        let mut peers = self.peers.lock().unwrap_or_else(|p| p.into_inner());
        match peers.get(&peer) {
            Some(since) if since.elapsed() < self.hold => true,
            Some(_) => {
                peers.remove(&peer);
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_held_peer() {
        let peers = DisconnectedPeers::new(Duration::from_secs(60));
        let peer = RouterId::new(1);
        assert!(!peers.contains(peer));
        peers.insert(peer);
        assert!(peers.contains(peer));
        assert!(peers.remove(peer));
        assert!(!peers.contains(peer));
    }

    #[test]
    fn test_expired_peer() {
        let peers = DisconnectedPeers::new(Duration::ZERO);
        let peer = RouterId::new(1);
        peers.insert(peer);
        assert!(!peers.contains(peer));
        // Dropped on lookup
        assert!(!peers.remove(peer));
    }
}
