use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use ipnetwork::IpNetwork;
use log::{debug, error, trace};

use super::best_path::{BestPath, BestPathChange};
use super::entry::{RouteEntry, StoredRoute};
use super::offset_map::OffsetMaps;
use super::{Family, RouterId};
use crate::error::{Result, RibError};

/// Destinations touched by a set of table mutations, awaiting best path
/// recomputation
#[derive(Debug, Default)]
pub struct UpdateDraft {
    destinations: Vec<IpNetwork>,
    seen: HashSet<IpNetwork>,
}

impl UpdateDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, destination: IpNetwork) {
        if self.seen.insert(destination) {
            self.destinations.push(destination);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    /// Touched destinations, in the order they were first marked
    pub fn into_destinations(self) -> Vec<IpNetwork> {
        self.destinations
    }
}

#[derive(Debug)]
struct TableState {
    entries: HashMap<IpNetwork, RouteEntry>,
    maps: OffsetMaps,
    // Best paths of entries removed before the withdrawal was reported
    pending_withdrawals: HashMap<IpNetwork, BestPath>,
}

/// Adj-RIB-In of every peer for one address family
///
/// All mutations hold the table lock for their whole duration, so
/// `clear` is never observed half done.
#[derive(Debug)]
pub struct RouteTable {
    family: Family,
    local_as: u32,
    state: Mutex<TableState>,
}

impl RouteTable {
    pub fn new(family: Family, local_as: u32) -> Self {
        Self {
            family,
            local_as,
            state: Mutex::new(TableState {
                entries: HashMap::with_capacity(64),
                maps: OffsetMaps::new(),
                pending_withdrawals: HashMap::new(),
            }),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    fn lock(&self) -> MutexGuard<TableState> {
        // State is consistent between statements that can panic
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the route a peer announced for a destination
    pub fn add(
        &self,
        draft: &mut UpdateDraft,
        peer: RouterId,
        destination: IpNetwork,
        route: StoredRoute,
    ) -> Result<()> {
        let mut guard = self.lock();
        let TableState {
            entries,
            maps,
            pending_withdrawals,
        } = &mut *guard;
        let entry = entries.entry(destination).or_insert_with(|| {
            let previous = pending_withdrawals.remove(&destination);
            RouteEntry::with_previous_best(destination, maps, previous)
        });
        if let Err(err) = entry.add_route(maps, peer, route) {
            error!(
                "Adding {} from {} to {}: {}",
                destination, peer, self.family, err
            );
            return Err(err);
        }
        trace!("Added {} from {} to {}", destination, peer, self.family);
        draft.mark(destination);
        Ok(())
    }

    /// Remove the route a peer announced for a destination.
    /// Returns whether the destination has no routes left.
    pub fn remove(
        &self,
        draft: &mut UpdateDraft,
        peer: RouterId,
        destination: IpNetwork,
    ) -> Result<bool> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let empty = match state.entries.get_mut(&destination) {
            Some(entry) => entry.remove_route(&mut state.maps, peer),
            None => Err(RibError::UnknownContributor { destination, peer }),
        };
        let empty = match empty {
            Ok(empty) => empty,
            Err(err) => {
                error!(
                    "Removing {} from {} in {}: {}",
                    destination, peer, self.family, err
                );
                return Err(err);
            }
        };
        if empty {
            Self::retire(state, destination);
        }
        trace!("Removed {} from {} in {}", destination, peer, self.family);
        draft.mark(destination);
        Ok(empty)
    }

    /// Remove every route of a peer.
    /// Returns the destinations that changed.
    pub fn clear(&self, peer: RouterId) -> Vec<IpNetwork> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let touched: Vec<IpNetwork> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.route(peer).is_some())
            .map(|(destination, _)| *destination)
            .collect();
        for destination in &touched {
            let empty = match state.entries.get_mut(destination) {
                Some(entry) => entry.remove_route(&mut state.maps, peer),
                None => continue,
            };
            match empty {
                Ok(true) => Self::retire(state, *destination),
                Ok(false) => (),
                // Length mismatch: leave the entry as it was
                Err(err) => error!(
                    "Clearing {} from {} in {}: {}",
                    destination, peer, self.family, err
                ),
            }
        }
        let pruned = state.maps.prune();
        debug!(
            "Cleared {} routes from {} in {} ({} offset maps pruned)",
            touched.len(),
            peer,
            self.family,
            pruned
        );
        touched
    }

    fn retire(state: &mut TableState, destination: IpNetwork) {
        if let Some(mut entry) = state.entries.remove(&destination) {
            if let Some(best) = entry.take_best_path() {
                state.pending_withdrawals.insert(destination, best);
            }
        }
    }

    /// Whether a peer currently has a route for a destination
    pub fn contains(&self, peer: RouterId, destination: &IpNetwork) -> bool {
        self.lock()
            .entries
            .get(destination)
            .map(|entry| entry.route(peer).is_some())
            .unwrap_or(false)
    }

    /// Recompute best paths for the given destinations and report those
    /// whose winner changed
    pub fn select_best(&self, destinations: &[IpNetwork]) -> Vec<BestPathChange> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut changes = Vec::new();
        for destination in destinations {
            match state.entries.get_mut(destination) {
                Some(entry) => {
                    if let Some(old) = entry.select_best(self.local_as) {
                        changes.push(BestPathChange {
                            destination: *destination,
                            old,
                            new: entry.best_path().cloned(),
                        });
                    }
                }
                None => {
                    if let Some(old) = state.pending_withdrawals.remove(destination) {
                        changes.push(BestPathChange {
                            destination: *destination,
                            old: Some(old),
                            new: None,
                        });
                    }
                }
            }
        }
        changes
    }

    /// Point in time view of the selected best path of every destination
    pub fn current_state(&self) -> HashMap<IpNetwork, BestPath> {
        self.lock()
            .entries
            .iter()
            .filter_map(|(destination, entry)| {
                entry.best_path().map(|best| (*destination, best.clone()))
            })
            .collect()
    }

    /// Adj-RIB-In routes, optionally only those of one peer
    pub fn routes(&self, peer: Option<RouterId>) -> Vec<(IpNetwork, RouterId, StoredRoute)> {
        self.lock()
            .entries
            .iter()
            .flat_map(|(destination, entry)| {
                entry
                    .live_routes()
                    .filter(|(id, _)| peer.map(|peer| peer == *id).unwrap_or(true))
                    .map(|(id, route)| (*destination, id, route.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Number of destinations with at least one route
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
