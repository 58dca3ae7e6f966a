use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use super::{PeerExportGroup, PeerRole, PolicyDatabase, SessionImportPolicy};
use crate::rib::{Families, Family, RouterId};

/// Policy state of one registered peer
#[derive(Clone, Debug)]
pub struct PeerPolicy {
    pub role: PeerRole,
    pub import: SessionImportPolicy,
    pub families: Families,
}

/// Current role of every peer and the export group it belongs to
///
/// Role changes and removals take the write lock for the whole update
/// (peer map and group membership), so a lookup after `peer_removed`
/// never sees the old role.
#[derive(Debug)]
pub struct PolicyPeerTracker {
    database: Arc<PolicyDatabase>,
    peers: RwLock<HashMap<RouterId, PeerPolicy>>,
    groups: Vec<Arc<PeerExportGroup>>,
}

impl PolicyPeerTracker {
    pub fn new(database: Arc<PolicyDatabase>) -> Self {
        let groups = PeerRole::ALL
            .iter()
            .map(|role| {
                Arc::new(PeerExportGroup::new(
                    *role,
                    database.export_policy_for(*role),
                ))
            })
            .collect();
        Self {
            database,
            peers: RwLock::new(HashMap::new()),
            groups,
        }
    }

    fn read(&self) -> RwLockReadGuard<HashMap<RouterId, PeerPolicy>> {
        self.peers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<HashMap<RouterId, PeerPolicy>> {
        self.peers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn database(&self) -> &Arc<PolicyDatabase> {
        &self.database
    }

    /// Assign (or reassign) the role of a peer
    pub fn peer_role_changed(
        &self,
        peer: RouterId,
        role: PeerRole,
        aigp_session: bool,
        families: Families,
    ) {
        let mut peers = self.write();
        let import = SessionImportPolicy::new(self.database.import_policy_for(role), aigp_session);
        let previous = peers.insert(
            peer,
            PeerPolicy {
                role,
                import,
                families,
            },
        );
        if let Some(previous) = previous {
            if previous.role != role {
                debug!("Peer {} role changed {} -> {}", peer, previous.role, role);
                self.export_group(previous.role).deregister(peer);
            }
        }
        self.export_group(role).register_peer(peer);
        self.publish_roles(&peers);
    }

    /// Forget a peer; it receives no exports and its routes are not imported
    pub fn peer_removed(&self, peer: RouterId) -> Option<PeerRole> {
        let mut peers = self.write();
        let removed = peers.remove(&peer)?;
        self.export_group(removed.role).deregister(peer);
        self.publish_roles(&peers);
        debug!("Peer {} ({}) removed from policy tracker", peer, removed.role);
        Some(removed.role)
    }

    fn publish_roles(&self, peers: &HashMap<RouterId, PeerPolicy>) {
        let roles: Arc<HashMap<RouterId, PeerRole>> = Arc::new(
            peers
                .iter()
                .map(|(peer, policy)| (*peer, policy.role))
                .collect(),
        );
        for group in &self.groups {
            group.set_role_snapshot(roles.clone());
        }
    }

    pub fn policy_of(&self, peer: RouterId) -> Option<PeerPolicy> {
        self.read().get(&peer).cloned()
    }

    pub fn role_of(&self, peer: RouterId) -> Option<PeerRole> {
        self.read().get(&peer).map(|policy| policy.role)
    }

    pub fn import_policy_of(&self, peer: RouterId) -> Option<SessionImportPolicy> {
        self.read().get(&peer).map(|policy| policy.import)
    }

    pub fn export_group(&self, role: PeerRole) -> &Arc<PeerExportGroup> {
        &self.groups[role.index()]
    }

    pub fn groups(&self) -> &[Arc<PeerExportGroup>] {
        &self.groups
    }

    /// Whether a registered peer exchanges routes of a family
    pub fn supports(&self, peer: RouterId, family: Family) -> bool {
        self.read()
            .get(&peer)
            .map(|policy| policy.families.contains(family))
            .unwrap_or(false)
    }

    pub fn peers(&self) -> Vec<(RouterId, PeerRole)> {
        self.read()
            .iter()
            .map(|(peer, policy)| (*peer, policy.role))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::ClusterId;

    fn tracker() -> PolicyPeerTracker {
        PolicyPeerTracker::new(Arc::new(PolicyDatabase::new(
            65000,
            RouterId::new(1),
            ClusterId::new(1),
        )))
    }

    fn families() -> Families {
        Families::new(vec![Family::ipv4_unicast()])
    }

    #[test]
    fn test_role_change_moves_group() {
        let tracker = tracker();
        let peer = RouterId::new(2);
        tracker.peer_role_changed(peer, PeerRole::Ibgp, false, families());
        assert_eq!(*tracker.export_group(PeerRole::Ibgp).peers(), vec![peer]);
        assert_eq!(tracker.role_of(peer), Some(PeerRole::Ibgp));

        tracker.peer_role_changed(peer, PeerRole::RrClient, true, families());
        assert!(tracker.export_group(PeerRole::Ibgp).peers().is_empty());
        assert_eq!(*tracker.export_group(PeerRole::RrClient).peers(), vec![peer]);
        assert!(tracker.import_policy_of(peer).unwrap().is_aigp_session());
        assert_eq!(tracker.policy_of(peer).unwrap().families, families());
        for group in tracker.groups() {
            assert_eq!(group.role_snapshot().get(&peer), Some(&PeerRole::RrClient));
        }
    }

    #[test]
    fn test_removed_peer_is_forgotten() {
        let tracker = tracker();
        let peer = RouterId::new(2);
        tracker.peer_role_changed(peer, PeerRole::Ebgp, false, families());
        assert_eq!(tracker.peer_removed(peer), Some(PeerRole::Ebgp));
        assert_eq!(tracker.role_of(peer), None);
        assert!(tracker.import_policy_of(peer).is_none());
        assert!(tracker.export_group(PeerRole::Ebgp).peers().is_empty());
        assert!(tracker.groups()[0].role_snapshot().is_empty());
        assert_eq!(tracker.peer_removed(peer), None);
    }

    #[test]
    fn test_supports_family() {
        let tracker = tracker();
        let peer = RouterId::new(2);
        tracker.peer_role_changed(peer, PeerRole::Ebgp, false, families());
        assert!(tracker.supports(peer, Family::ipv4_unicast()));
        assert!(!tracker.supports(peer, Family::ipv6_unicast()));
        assert!(!tracker.supports(RouterId::new(3), Family::ipv4_unicast()));
    }
}
