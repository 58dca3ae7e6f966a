use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::{ExportPolicy, PeerRole};
use crate::rib::{PathAttributes, RouterId};

/// Peers sharing one export policy
///
/// Membership and the role snapshot are swapped whole on change, so the
/// fan-out can iterate a loaded snapshot without holding any lock.
#[derive(Debug)]
pub struct PeerExportGroup {
    role: PeerRole,
    policy: ExportPolicy,
    members: ArcSwap<Vec<RouterId>>,
    roles: ArcSwap<HashMap<RouterId, PeerRole>>,
}

impl PeerExportGroup {
    pub fn new(role: PeerRole, policy: ExportPolicy) -> Self {
        Self {
            role,
            policy,
            members: ArcSwap::from_pointee(Vec::new()),
            roles: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Role of the peers in this group
    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn policy(&self) -> ExportPolicy {
        self.policy
    }

    pub fn register_peer(&self, peer: RouterId) {
        self.members.rcu(|members| {
            let mut members = Vec::clone(members);
            if !members.contains(&peer) {
                members.push(peer);
            }
            members
        });
    }

    pub fn deregister(&self, peer: RouterId) {
        self.members.rcu(|members| {
            let mut members = Vec::clone(members);
            members.retain(|member| *member != peer);
            members
        });
    }

    /// Snapshot of the current members
    pub fn peers(&self) -> Arc<Vec<RouterId>> {
        self.members.load_full()
    }

    /// Roles of every known peer, used to classify route sources
    pub fn role_snapshot(&self) -> Arc<HashMap<RouterId, PeerRole>> {
        self.roles.load_full()
    }

    pub(super) fn set_role_snapshot(&self, roles: Arc<HashMap<RouterId, PeerRole>>) {
        self.roles.store(roles);
    }

    /// Attributes to advertise to this group for a route learned from
    /// `source`. Suppressed when there is no route or the source role is
    /// not known.
    pub fn effective_attributes(
        &self,
        source: RouterId,
        attributes: Option<&Arc<PathAttributes>>,
    ) -> Option<Arc<PathAttributes>> {
        let attributes = attributes?;
        let source_role = *self.roles.load().get(&source)?;
        self.policy
            .effective_attributes(source_role, source, attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::ClusterId;

    fn group() -> PeerExportGroup {
        PeerExportGroup::new(
            PeerRole::Ibgp,
            ExportPolicy::ToInternal {
                cluster_id: ClusterId::new(1),
            },
        )
    }

    #[test]
    fn test_membership() {
        let group = group();
        group.register_peer(RouterId::new(1));
        group.register_peer(RouterId::new(2));
        group.register_peer(RouterId::new(1));
        let before = group.peers();
        group.deregister(RouterId::new(1));
        // Loaded snapshots are unaffected by later changes
        assert_eq!(*before, vec![RouterId::new(1), RouterId::new(2)]);
        assert_eq!(*group.peers(), vec![RouterId::new(2)]);
    }

    #[test]
    fn test_unknown_source_role_is_suppressed() {
        let group = group();
        let attrs = Arc::new(PathAttributes::default());
        assert!(group
            .effective_attributes(RouterId::new(9), Some(&attrs))
            .is_none());

        let mut roles = HashMap::new();
        roles.insert(RouterId::new(9), PeerRole::Ebgp);
        group.set_role_snapshot(Arc::new(roles));
        assert!(group
            .effective_attributes(RouterId::new(9), Some(&attrs))
            .is_some());
        assert!(group.effective_attributes(RouterId::new(9), None).is_none());
    }
}
