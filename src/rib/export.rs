use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use log::{debug, trace};
use tokio::sync::mpsc;

use super::{BestPath, BestPathChange, DisconnectedPeers, Family, PathAttributes, RouterId};
use crate::policy::PolicyPeerTracker;
use crate::utils::format_time_as_elapsed;

/// Consumer of best path changes
///
/// Called from the selection task in the order changes were selected, so
/// a sink sees the changes of one destination in order.
pub trait RouteSink: Send + Sync {
    fn best_path_changed(&self, family: Family, change: &BestPathChange);

    /// A peer was registered; `state` holds the current best paths of a
    /// family it supports
    fn initialize_peer(
        &self,
        _peer: RouterId,
        _family: Family,
        _state: &HashMap<IpNetwork, BestPath>,
    ) {
    }
}

/// Selected route for a destination
#[derive(Clone, Debug)]
pub struct LocRibRoute {
    pub peer: RouterId,
    pub attributes: Arc<PathAttributes>,
    pub igp_metric: Option<u32>,
    // Time selected
    pub selected_at: DateTime<Utc>,
}

impl fmt::Display for LocRibRoute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<LocRibRoute peer={} age={}>",
            self.peer,
            format_time_as_elapsed(self.selected_at),
        )
    }
}

/// Best path of every destination, per family
#[derive(Debug, Default)]
pub struct LocRib {
    routes: RwLock<HashMap<Family, HashMap<IpNetwork, LocRibRoute>>>,
}

impl LocRib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, family: Family, destination: &IpNetwork) -> Option<LocRibRoute> {
        let routes = self.routes.read().unwrap_or_else(|p| p.into_inner());
        routes
            .get(&family)
            .and_then(|routes| routes.get(destination))
            .cloned()
    }

    pub fn routes(&self) -> Vec<(Family, IpNetwork, LocRibRoute)> {
        let routes = self.routes.read().unwrap_or_else(|p| p.into_inner());
        routes
            .iter()
            .flat_map(|(family, routes)| {
                routes
                    .iter()
                    .map(move |(destination, route)| (*family, *destination, route.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        let routes = self.routes.read().unwrap_or_else(|p| p.into_inner());
        routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RouteSink for LocRib {
    fn best_path_changed(&self, family: Family, change: &BestPathChange) {
        let mut routes = self.routes.write().unwrap_or_else(|p| p.into_inner());
        let table = routes.entry(family).or_insert_with(HashMap::new);
        match &change.new {
            Some(best) => {
                table.insert(
                    change.destination,
                    LocRibRoute {
                        peer: best.router_id,
                        attributes: best.route.attributes.clone(),
                        igp_metric: best.route.igp_metric,
                        selected_at: Utc::now(),
                    },
                );
            }
            None => {
                table.remove(&change.destination);
            }
        }
    }
}

/// Change to a peer's Adj-RIB-Out, as streamed to a subscriber
#[derive(Clone, Debug, PartialEq)]
pub enum Advertisement {
    Announce {
        peer: RouterId,
        family: Family,
        destination: IpNetwork,
        attributes: Arc<PathAttributes>,
    },
    Withdraw {
        peer: RouterId,
        family: Family,
        destination: IpNetwork,
    },
}

/// Route as advertised to one peer
#[derive(Clone, Debug)]
pub struct AdvertisedRoute {
    pub attributes: Arc<PathAttributes>,
    /// Peer the route was learned from
    pub source: RouterId,
    pub advertised_at: DateTime<Utc>,
}

type PeerRoutes = HashMap<Family, HashMap<IpNetwork, AdvertisedRoute>>;

/// Effective routes advertised to each peer
#[derive(Debug, Default)]
pub struct AdjRibsOut {
    peers: RwLock<HashMap<RouterId, PeerRoutes>>,
    subscriber: Mutex<Option<mpsc::UnboundedSender<Advertisement>>>,
}

impl AdjRibsOut {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream every later change; replaces any previous subscriber
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Advertisement> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscriber.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx);
        rx
    }

    fn publish(&self, advertisement: Advertisement) {
        let mut subscriber = self.subscriber.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(tx) = subscriber.as_ref() {
            if tx.send(advertisement).is_err() {
                trace!("Advertisement subscriber went away");
                *subscriber = None;
            }
        }
    }

    /// Start accepting advertisements for a registered peer
    pub fn open_peer(&self, peer: RouterId) {
        let mut peers = self.peers.write().unwrap_or_else(|p| p.into_inner());
        peers.entry(peer).or_insert_with(HashMap::new);
    }

    /// Record an advertisement; unchanged attributes are not re-announced.
    /// Peers that are not open (never registered, or cleared since) get
    /// nothing.
    pub fn advertise(
        &self,
        peer: RouterId,
        family: Family,
        destination: IpNetwork,
        attributes: Arc<PathAttributes>,
        source: RouterId,
    ) {
        {
            let mut peers = self.peers.write().unwrap_or_else(|p| p.into_inner());
            let routes = match peers.get_mut(&peer) {
                Some(routes) => routes.entry(family).or_insert_with(HashMap::new),
                None => {
                    trace!("Not advertising {} to closed peer {}", destination, peer);
                    return;
                }
            };
            if let Some(current) = routes.get(&destination) {
                if current.source == source && current.attributes == attributes {
                    return;
                }
            }
            routes.insert(
                destination,
                AdvertisedRoute {
                    attributes: attributes.clone(),
                    source,
                    advertised_at: Utc::now(),
                },
            );
        }
        trace!("Advertising {} to {}", destination, peer);
        self.publish(Advertisement::Announce {
            peer,
            family,
            destination,
            attributes,
        });
    }

    /// Remove an advertisement, if there is one
    pub fn withdraw(&self, peer: RouterId, family: Family, destination: IpNetwork) {
        let removed = {
            let mut peers = self.peers.write().unwrap_or_else(|p| p.into_inner());
            peers
                .get_mut(&peer)
                .and_then(|routes| routes.get_mut(&family))
                .and_then(|routes| routes.remove(&destination))
                .is_some()
        };
        if removed {
            trace!("Withdrawing {} from {}", destination, peer);
            self.publish(Advertisement::Withdraw {
                peer,
                family,
                destination,
            });
        }
    }

    /// Forget everything advertised to a peer whose session went down and
    /// close it until it is opened again
    pub fn clear_peer(&self, peer: RouterId) -> usize {
        let mut peers = self.peers.write().unwrap_or_else(|p| p.into_inner());
        peers
            .remove(&peer)
            .map(|routes| routes.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    pub fn get(
        &self,
        peer: RouterId,
        family: Family,
        destination: &IpNetwork,
    ) -> Option<AdvertisedRoute> {
        let peers = self.peers.read().unwrap_or_else(|p| p.into_inner());
        peers
            .get(&peer)
            .and_then(|routes| routes.get(&family))
            .and_then(|routes| routes.get(destination))
            .cloned()
    }

    /// Advertised routes, optionally only those sent to one peer
    pub fn routes(&self, peer: Option<RouterId>) -> Vec<(RouterId, Family, IpNetwork, AdvertisedRoute)> {
        let peers = self.peers.read().unwrap_or_else(|p| p.into_inner());
        peers
            .iter()
            .filter(|(id, _)| peer.map(|peer| peer == **id).unwrap_or(true))
            .flat_map(|(id, families)| {
                families.iter().flat_map(move |(family, routes)| {
                    routes.iter().map(move |(destination, route)| {
                        (*id, *family, *destination, route.clone())
                    })
                })
            })
            .collect()
    }
}

/// Applies export policy to best path changes and records the results in
/// every eligible peer's Adj-RIB-Out
pub struct ExportFanout {
    tracker: Arc<PolicyPeerTracker>,
    adj_ribs_out: Arc<AdjRibsOut>,
    disconnected: Arc<DisconnectedPeers>,
}

impl ExportFanout {
    pub fn new(
        tracker: Arc<PolicyPeerTracker>,
        adj_ribs_out: Arc<AdjRibsOut>,
        disconnected: Arc<DisconnectedPeers>,
    ) -> Self {
        Self {
            tracker,
            adj_ribs_out,
            disconnected,
        }
    }

    fn export_to(
        &self,
        peer: RouterId,
        family: Family,
        destination: IpNetwork,
        best: Option<&BestPath>,
        attributes: Option<Arc<PathAttributes>>,
    ) {
        match (best, attributes) {
            // Never send a route back to where it came from
            (Some(best), Some(attributes)) if best.router_id != peer => self
                .adj_ribs_out
                .advertise(peer, family, destination, attributes, best.router_id),
            _ => self.adj_ribs_out.withdraw(peer, family, destination),
        }
    }
}

impl RouteSink for ExportFanout {
    fn best_path_changed(&self, family: Family, change: &BestPathChange) {
        for group in self.tracker.groups() {
            let peers = group.peers();
            if peers.is_empty() {
                continue;
            }
            // Same policy for the whole group
            let attributes = change.new.as_ref().and_then(|best| {
                group.effective_attributes(best.router_id, Some(best.attributes()))
            });
            for peer in peers.iter() {
                if !self.tracker.supports(*peer, family) || self.disconnected.contains(*peer) {
                    continue;
                }
                self.export_to(
                    *peer,
                    family,
                    change.destination,
                    change.new.as_ref(),
                    attributes.clone(),
                );
            }
        }
    }

    fn initialize_peer(
        &self,
        peer: RouterId,
        family: Family,
        state: &HashMap<IpNetwork, BestPath>,
    ) {
        if !self.tracker.supports(peer, family) {
            return;
        }
        let role = match self.tracker.role_of(peer) {
            Some(role) => role,
            None => return,
        };
        let group = self.tracker.export_group(role);
        for (destination, best) in state {
            let attributes = group.effective_attributes(best.router_id, Some(best.attributes()));
            self.export_to(peer, family, *destination, Some(best), attributes);
        }
        debug!(
            "Initial export of {} {} routes to {}",
            state.len(),
            family,
            peer
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{PeerRole, PolicyDatabase};
    use crate::rib::{AsPath, BestPathState, ClusterId, Families, StoredRoute};
    use std::time::Duration;

    fn net(prefix: &str) -> IpNetwork {
        prefix.parse().unwrap()
    }

    fn best(router_id: u32) -> BestPath {
        let attributes = Arc::new(PathAttributes {
            as_path: AsPath::from_sequence(vec![100]),
            ..Default::default()
        });
        BestPath {
            router_id: RouterId::new(router_id),
            state: BestPathState::new(65000, &attributes),
            route: StoredRoute::new(attributes, true, None),
        }
    }

    fn fanout() -> (Arc<PolicyPeerTracker>, Arc<AdjRibsOut>, Arc<DisconnectedPeers>, ExportFanout) {
        let tracker = Arc::new(PolicyPeerTracker::new(Arc::new(PolicyDatabase::new(
            65000,
            RouterId::new(100),
            ClusterId::new(100),
        ))));
        let adj_ribs_out = Arc::new(AdjRibsOut::new());
        let disconnected = Arc::new(DisconnectedPeers::new(Duration::from_secs(60)));
        let fanout = ExportFanout::new(tracker.clone(), adj_ribs_out.clone(), disconnected.clone());
        (tracker, adj_ribs_out, disconnected, fanout)
    }

    fn v4() -> Families {
        Families::new(vec![Family::ipv4_unicast()])
    }

    #[test]
    fn test_loc_rib_tracks_changes() {
        let loc_rib = LocRib::new();
        let family = Family::ipv4_unicast();
        loc_rib.best_path_changed(
            family,
            &BestPathChange {
                destination: net("10.0.0.0/24"),
                old: None,
                new: Some(best(1)),
            },
        );
        assert_eq!(loc_rib.get(family, &net("10.0.0.0/24")).unwrap().peer, RouterId::new(1));
        loc_rib.best_path_changed(
            family,
            &BestPathChange {
                destination: net("10.0.0.0/24"),
                old: Some(best(1)),
                new: None,
            },
        );
        assert!(loc_rib.is_empty());
    }

    #[test]
    fn test_adj_rib_out_subscription() {
        let adj = AdjRibsOut::new();
        let mut rx = adj.subscribe();
        let family = Family::ipv4_unicast();
        let attrs = Arc::new(PathAttributes::default());
        adj.open_peer(RouterId::new(1));
        adj.advertise(RouterId::new(1), family, net("10.0.0.0/24"), attrs.clone(), RouterId::new(2));
        // Unchanged, not re-announced
        adj.advertise(RouterId::new(1), family, net("10.0.0.0/24"), attrs.clone(), RouterId::new(2));
        adj.withdraw(RouterId::new(1), family, net("10.0.0.0/24"));
        // Nothing left to withdraw
        adj.withdraw(RouterId::new(1), family, net("10.0.0.0/24"));

        assert!(matches!(rx.try_recv(), Ok(Advertisement::Announce { .. })));
        assert!(matches!(rx.try_recv(), Ok(Advertisement::Withdraw { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fanout_skips_source_and_disconnected() {
        let (tracker, adj, disconnected, fanout) = fanout();
        let family = Family::ipv4_unicast();
        for (peer, role) in [(1, PeerRole::Ebgp), (2, PeerRole::Ebgp), (3, PeerRole::Ibgp)] {
            tracker.peer_role_changed(RouterId::new(peer), role, false, v4());
            adj.open_peer(RouterId::new(peer));
        }
        tracker.peer_role_changed(
            RouterId::new(4),
            PeerRole::Ebgp,
            false,
            Families::new(vec![Family::ipv6_unicast()]),
        );
        adj.open_peer(RouterId::new(4));
        disconnected.insert(RouterId::new(2));

        fanout.best_path_changed(
            family,
            &BestPathChange {
                destination: net("10.0.0.0/24"),
                old: None,
                new: Some(best(1)),
            },
        );
        let dest = net("10.0.0.0/24");
        assert!(adj.get(RouterId::new(1), family, &dest).is_none());
        assert!(adj.get(RouterId::new(2), family, &dest).is_none());
        assert!(adj.get(RouterId::new(4), family, &dest).is_none());
        let to_ibgp = adj.get(RouterId::new(3), family, &dest).unwrap();
        assert_eq!(to_ibgp.source, RouterId::new(1));
        // eBGP learned route goes to iBGP unchanged
        assert_eq!(to_ibgp.attributes.as_path, AsPath::from_sequence(vec![100]));
    }

    #[test]
    fn test_suppressed_export_withdraws_previous() {
        let (tracker, adj, _, fanout) = fanout();
        let family = Family::ipv4_unicast();
        let dest = net("10.0.0.0/24");
        for (peer, role) in [(1, PeerRole::Ebgp), (2, PeerRole::Ibgp), (3, PeerRole::Ibgp)] {
            tracker.peer_role_changed(RouterId::new(peer), role, false, v4());
            adj.open_peer(RouterId::new(peer));
        }

        fanout.best_path_changed(
            family,
            &BestPathChange {
                destination: dest,
                old: None,
                new: Some(best(1)),
            },
        );
        assert!(adj.get(RouterId::new(3), family, &dest).is_some());

        // New best from iBGP peer 2: split horizon towards iBGP peer 3
        fanout.best_path_changed(
            family,
            &BestPathChange {
                destination: dest,
                old: Some(best(1)),
                new: Some(best(2)),
            },
        );
        assert!(adj.get(RouterId::new(3), family, &dest).is_none());
        let to_ebgp = adj.get(RouterId::new(1), family, &dest).unwrap();
        assert_eq!(to_ebgp.attributes.as_path, AsPath::from_sequence(vec![65000, 100]));
    }

    #[test]
    fn test_initialize_peer() {
        let (tracker, adj, _, fanout) = fanout();
        let family = Family::ipv4_unicast();
        tracker.peer_role_changed(RouterId::new(1), PeerRole::Ebgp, false, v4());
        tracker.peer_role_changed(RouterId::new(5), PeerRole::Ebgp, false, v4());
        adj.open_peer(RouterId::new(5));
        let mut state = HashMap::new();
        state.insert(net("10.0.0.0/24"), best(1));
        state.insert(net("10.0.1.0/24"), best(1));
        fanout.initialize_peer(RouterId::new(5), family, &state);
        assert_eq!(adj.routes(Some(RouterId::new(5))).len(), 2);
        assert!(adj.routes(Some(RouterId::new(1))).is_empty());
    }

    #[test]
    fn test_closed_peer_gets_no_advertisements() {
        let adj = AdjRibsOut::new();
        let family = Family::ipv4_unicast();
        let dest = net("10.0.0.0/24");
        let attrs = Arc::new(PathAttributes::default());
        let peer = RouterId::new(1);
        adj.advertise(peer, family, dest, attrs.clone(), RouterId::new(2));
        assert!(adj.get(peer, family, &dest).is_none());

        adj.open_peer(peer);
        adj.advertise(peer, family, dest, attrs.clone(), RouterId::new(2));
        assert_eq!(adj.clear_peer(peer), 1);
        // Late export for a peer that went down
        adj.advertise(peer, family, dest, attrs, RouterId::new(2));
        assert!(adj.get(peer, family, &dest).is_none());
        assert!(adj.routes(Some(peer)).is_empty());
    }
}
