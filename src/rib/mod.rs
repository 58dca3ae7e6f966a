mod attributes;
mod best_path;
mod community;
mod disconnected;
mod entry;
mod export;
mod families;
mod offset_map;
mod parse;
mod router_id;
mod selection;
mod table;

pub use attributes::{AsPath, Origin, PathAttributes, Segment, UnrecognizedAttribute};
pub use best_path::{
    BestPath, BestPathChange, BestPathSelector, BestPathState, DEFAULT_LOCAL_PREF,
};
pub use community::{Community, CommunityList, LLGR_STALE};
pub use disconnected::DisconnectedPeers;
pub use entry::{RouteEntry, StoredRoute};
pub use export::{
    AdjRibsOut, AdvertisedRoute, Advertisement, ExportFanout, LocRib, LocRibRoute, RouteSink,
};
pub use families::{Families, Family};
pub use offset_map::{OffsetMap, OffsetMaps};
pub use parse::{parse_update, RouteEvent};
pub use router_id::{ClusterId, RouterId};
pub use selection::{
    next_batch, BestPathSelectionProcess, SelectionHandle, SelectionStats, TableUpdate,
    DEFAULT_BATCH_SIZE,
};
pub use table::{RouteTable, UpdateDraft};

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use bgp_rs::Update;
use ipnetwork::IpNetwork;
use log::{debug, error, info, trace, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{Result, RibError};
use crate::policy::{PeerRole, PolicyDatabase, PolicyPeerTracker};

/// Cost of reaching a next hop, used as a best path tie breaker
pub trait IgpMetricSource: Send + Sync {
    fn metric(&self, next_hop: IpAddr) -> Option<u32>;
}

/// Fixed metrics per next hop
#[derive(Debug, Default)]
pub struct StaticIgpMetrics {
    metrics: HashMap<IpAddr, u32>,
}

impl StaticIgpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, next_hop: IpAddr, metric: u32) {
        self.metrics.insert(next_hop, metric);
    }

    /// Metrics of every configured static route that carries one
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut metrics = Self::new();
        for route in config.peers.iter().flat_map(|peer| peer.static_routes.iter()) {
            if let Some(metric) = route.igp_metric {
                metrics.insert(route.next_hop, metric);
            }
        }
        metrics
    }
}

impl IgpMetricSource for StaticIgpMetrics {
    fn metric(&self, next_hop: IpAddr) -> Option<u32> {
        self.metrics.get(&next_hop).copied()
    }
}

/// Route tables of every family, the peers' policies and the best path
/// selection task feeding Loc-RIB and the Adj-RIBs-Out
///
/// Mutations are applied to the tables synchronously; best path selection
/// and export happen on the selection task. Use [`Rib::flush`] to wait for
/// them.
pub struct Rib {
    tables: HashMap<Family, Arc<RouteTable>>,
    tracker: Arc<PolicyPeerTracker>,
    loc_rib: Arc<LocRib>,
    adj_ribs_out: Arc<AdjRibsOut>,
    disconnected: Arc<DisconnectedPeers>,
    igp: Arc<dyn IgpMetricSource>,
    handle: SelectionHandle,
    process: JoinHandle<SelectionStats>,
    cancel: CancellationToken,
}

impl Rib {
    /// Create the tables and spawn the selection task on the current
    /// tokio runtime
    pub fn new(
        config: &ServerConfig,
        igp: Arc<dyn IgpMetricSource>,
        cancel: CancellationToken,
    ) -> Self {
        let database = Arc::new(PolicyDatabase::new(
            config.default_as,
            config.router_id,
            config.cluster_id,
        ));
        let tracker = Arc::new(PolicyPeerTracker::new(database));
        let loc_rib = Arc::new(LocRib::new());
        let adj_ribs_out = Arc::new(AdjRibsOut::new());
        let disconnected = Arc::new(DisconnectedPeers::new(config.disconnect_hold));
        let fanout = Arc::new(ExportFanout::new(
            tracker.clone(),
            adj_ribs_out.clone(),
            disconnected.clone(),
        ));

        let tables = [Family::ipv4_unicast(), Family::ipv6_unicast()]
            .iter()
            .map(|family| {
                (
                    *family,
                    Arc::new(RouteTable::new(*family, config.default_as)),
                )
            })
            .collect();

        let sinks: Vec<Arc<dyn RouteSink>> = vec![loc_rib.clone(), fanout];
        let (process, handle) =
            BestPathSelectionProcess::new(sinks, config.batch_size, cancel.clone());
        let process = tokio::spawn(process.run());
        info!(
            "RIB started for AS {} (router id {}, cluster {})",
            config.default_as, config.router_id, config.cluster_id
        );

        Self {
            tables,
            tracker,
            loc_rib,
            adj_ribs_out,
            disconnected,
            igp,
            handle,
            process,
            cancel,
        }
    }

    /// Register (or re-register with a new role) a peer. It is sent the
    /// current best paths of every family it supports.
    ///
    /// Changing the role, AIGP setting or families of a registered peer
    /// restarts it: routes it announced were imported and exported under
    /// the old settings, so they are withdrawn like on a session reset and
    /// must be announced again.
    pub fn register_peer(
        &self,
        peer: RouterId,
        role: PeerRole,
        aigp_session: bool,
        families: Families,
    ) -> Result<()> {
        if let Some(current) = self.tracker.policy_of(peer) {
            if current.role != role
                || current.import.is_aigp_session() != aigp_session
                || current.families != families
            {
                info!(
                    "Peer {} re-registered as {} (was {}), resetting its routes",
                    peer, role, current.role
                );
                self.peer_down(peer)?;
            }
        }
        let tables: Vec<Arc<RouteTable>> = families
            .iter()
            .filter_map(|family| self.tables.get(family).cloned())
            .collect();
        self.tracker
            .peer_role_changed(peer, role, aigp_session, families);
        self.disconnected.remove(peer);
        self.adj_ribs_out.open_peer(peer);
        debug!("Registered peer {} as {}", peer, role);
        self.handle.sync_peer(peer, tables)
    }

    /// Session with a peer went down: drop everything learned from and
    /// advertised to it. Returns the number of routes removed.
    ///
    /// Every table is cleared even when the selection process has shut
    /// down; the first notification error is returned afterwards.
    pub fn peer_down(&self, peer: RouterId) -> Result<usize> {
        let role = self.tracker.peer_removed(peer);
        self.disconnected.insert(peer);
        let advertised = self.adj_ribs_out.clear_peer(peer);
        let cleared: Vec<TableUpdate> = self
            .tables
            .values()
            .map(|table| TableUpdate::new(table.clone(), table.clear(peer)))
            .collect();
        let removed: usize = cleared.iter().map(|update| update.destinations.len()).sum();
        info!(
            "Peer {} ({}) down: {} routes removed, {} advertisements dropped",
            peer,
            role.map(|role| role.to_string())
                .unwrap_or_else(|| "unregistered".to_string()),
            removed,
            advertised
        );
        let mut result = Ok(removed);
        for update in cleared {
            let family = update.table.family();
            if let Err(err) = self.handle.notify(update) {
                warn!("Withdrawals of {} for {} not selected: {}", peer, family, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Store a route announced by a peer.
    /// Returns whether import policy accepted it.
    pub fn announce(
        &self,
        peer: RouterId,
        family: Family,
        destination: IpNetwork,
        attributes: Arc<PathAttributes>,
    ) -> Result<bool> {
        let table = self.table_for(family)?;
        let mut draft = UpdateDraft::new();
        let accepted = self.import(&mut draft, table, peer, destination, attributes)?;
        self.notify(table, draft)?;
        Ok(accepted)
    }

    /// Remove the route a peer announced. Returns whether it had one.
    pub fn withdraw(&self, peer: RouterId, family: Family, destination: IpNetwork) -> Result<bool> {
        let table = self.table_for(family)?;
        let mut draft = UpdateDraft::new();
        let removed = self.remove(&mut draft, table, peer, destination)?;
        self.notify(table, draft)?;
        Ok(removed)
    }

    /// Apply every announcement and withdrawal of a decoded UPDATE.
    /// Returns the number of routes that changed.
    pub fn apply_update(&self, peer: RouterId, update: &Update) -> Result<usize> {
        let mut drafts: HashMap<Family, UpdateDraft> = HashMap::new();
        let mut changed = 0;
        for event in parse_update(update) {
            let (family, destination) = match &event {
                RouteEvent::Announce {
                    family,
                    destination,
                    ..
                }
                | RouteEvent::Withdraw {
                    family,
                    destination,
                } => (*family, *destination),
            };
            let table = match self.tables.get(&family) {
                Some(table) => table,
                None => {
                    debug!("Ignoring {} from {}: no {} table", destination, peer, family);
                    continue;
                }
            };
            let draft = drafts.entry(family).or_insert_with(UpdateDraft::new);
            let done = match event {
                RouteEvent::Announce { attributes, .. } => {
                    self.import(draft, table, peer, destination, attributes)?
                }
                RouteEvent::Withdraw { .. } => self.remove(draft, table, peer, destination)?,
            };
            if done {
                changed += 1;
            }
        }
        for (family, draft) in drafts {
            if let Some(table) = self.tables.get(&family) {
                self.notify(table, draft)?;
            }
        }
        Ok(changed)
    }

    fn import(
        &self,
        draft: &mut UpdateDraft,
        table: &Arc<RouteTable>,
        peer: RouterId,
        destination: IpNetwork,
        attributes: Arc<PathAttributes>,
    ) -> Result<bool> {
        let policy = match self.tracker.import_policy_of(peer) {
            Some(policy) => policy,
            None => {
                debug!("Ignoring {} from unregistered peer {}", destination, peer);
                return Ok(false);
            }
        };
        let attributes = if attributes.aigp.is_some() && !policy.is_aigp_session() {
            Arc::new(attributes.without_aigp())
        } else {
            attributes
        };
        match policy.effective_attributes(&attributes) {
            Some(effective) => {
                let ebgp = self.tracker.role_of(peer) == Some(PeerRole::Ebgp);
                let igp_metric = effective
                    .next_hop
                    .and_then(|next_hop| self.igp.metric(next_hop));
                table.add(
                    draft,
                    peer,
                    destination,
                    StoredRoute::new(effective, ebgp, igp_metric),
                )?;
                Ok(true)
            }
            None => {
                trace!("Import policy rejected {} from {}", destination, peer);
                // Replaces whatever the peer announced before
                if table.contains(peer, &destination) {
                    table.remove(draft, peer, destination)?;
                }
                Ok(false)
            }
        }
    }

    fn remove(
        &self,
        draft: &mut UpdateDraft,
        table: &Arc<RouteTable>,
        peer: RouterId,
        destination: IpNetwork,
    ) -> Result<bool> {
        // Withdrawing a route that import policy rejected is not an error
        if !table.contains(peer, &destination) {
            trace!("No route from {} for {} to withdraw", peer, destination);
            return Ok(false);
        }
        table.remove(draft, peer, destination)?;
        Ok(true)
    }

    fn notify(&self, table: &Arc<RouteTable>, draft: UpdateDraft) -> Result<()> {
        if draft.is_empty() {
            return Ok(());
        }
        self.handle
            .notify(TableUpdate::new(table.clone(), draft.into_destinations()))
    }

    fn table_for(&self, family: Family) -> Result<&Arc<RouteTable>> {
        self.tables
            .get(&family)
            .ok_or(RibError::UnknownTable(family))
    }

    pub fn table(&self, family: Family) -> Option<&Arc<RouteTable>> {
        self.tables.get(&family)
    }

    pub fn families(&self) -> impl Iterator<Item = &Family> {
        self.tables.keys()
    }

    /// Adj-RIB-In routes of every family, optionally only one peer's
    pub fn learned_routes(
        &self,
        peer: Option<RouterId>,
    ) -> Vec<(Family, IpNetwork, RouterId, StoredRoute)> {
        self.tables
            .iter()
            .flat_map(|(family, table)| {
                table
                    .routes(peer)
                    .into_iter()
                    .map(move |(destination, id, route)| (*family, destination, id, route))
            })
            .collect()
    }

    pub fn loc_rib(&self) -> &Arc<LocRib> {
        &self.loc_rib
    }

    pub fn adj_ribs_out(&self) -> &Arc<AdjRibsOut> {
        &self.adj_ribs_out
    }

    pub fn tracker(&self) -> &Arc<PolicyPeerTracker> {
        &self.tracker
    }

    /// Wait until every change made so far is selected and exported
    pub async fn flush(&self) -> Result<()> {
        self.handle.flush().await
    }

    /// Stop selection, dropping anything still queued
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Finish queued work and stop the selection task
    pub async fn shutdown(self) -> SelectionStats {
        let Rib {
            handle, process, ..
        } = self;
        drop(handle);
        match process.await {
            Ok(stats) => stats,
            Err(err) => {
                error!("Best path selection task failed: {}", err);
                SelectionStats::default()
            }
        }
    }
}
