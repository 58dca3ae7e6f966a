use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use log::trace;

use super::best_path::{BestPath, BestPathSelector};
use super::offset_map::{OffsetMap, OffsetMaps};
use super::{PathAttributes, RouterId};
use crate::error::{Result, RibError};
use crate::utils::format_time_as_elapsed;

/// One contributor's route for a destination (an Adj-RIB-In slot)
#[derive(Clone, Debug)]
pub struct StoredRoute {
    pub attributes: Arc<PathAttributes>,
    /// Learned over an eBGP session
    pub ebgp: bool,
    /// Interior cost to reach the next hop, when known
    pub igp_metric: Option<u32>,
    // Time received
    pub received: DateTime<Utc>,
}

impl StoredRoute {
    pub fn new(attributes: Arc<PathAttributes>, ebgp: bool, igp_metric: Option<u32>) -> Self {
        Self {
            attributes,
            ebgp,
            igp_metric,
            received: Utc::now(),
        }
    }
}

impl fmt::Display for StoredRoute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<StoredRoute ebgp={} age={}>",
            self.ebgp,
            format_time_as_elapsed(self.received),
        )
    }
}

/// Routes for one destination from every contributing peer
///
/// `values[i]` holds the route of `offsets.router_id(i)`; an empty slot is a
/// contributor that withdrew while others remain. Slots are cleared in
/// place and the arrays compacted once at least half of them are empty.
#[derive(Debug)]
pub struct RouteEntry {
    destination: IpNetwork,
    offsets: Arc<OffsetMap>,
    values: Vec<Option<StoredRoute>>,
    best: Option<BestPath>,
}

impl RouteEntry {
    pub fn new(destination: IpNetwork, maps: &OffsetMaps) -> Self {
        Self {
            destination,
            offsets: maps.empty(),
            values: Vec::new(),
            best: None,
        }
    }

    /// Entry re-created for a destination whose previous best path was
    /// not reported as withdrawn yet
    pub(super) fn with_previous_best(
        destination: IpNetwork,
        maps: &OffsetMaps,
        best: Option<BestPath>,
    ) -> Self {
        Self {
            best,
            ..Self::new(destination, maps)
        }
    }

    pub fn destination(&self) -> IpNetwork {
        self.destination
    }

    pub fn offsets(&self) -> &Arc<OffsetMap> {
        &self.offsets
    }

    pub fn values(&self) -> &[Option<StoredRoute>] {
        &self.values
    }

    /// Best path as of the last `select_best`
    pub fn best_path(&self) -> Option<&BestPath> {
        self.best.as_ref()
    }

    pub(super) fn take_best_path(&mut self) -> Option<BestPath> {
        self.best.take()
    }

    pub fn live_routes(&self) -> impl Iterator<Item = (RouterId, &StoredRoute)> {
        self.offsets
            .ids()
            .iter()
            .zip(self.values.iter())
            .filter_map(|(id, value)| value.as_ref().map(|route| (*id, route)))
    }

    pub fn route(&self, router_id: RouterId) -> Option<&StoredRoute> {
        self.offsets.value(&self.values, router_id)
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Store (or replace) the route of a contributor
    pub fn add_route(
        &mut self,
        maps: &mut OffsetMaps,
        router_id: RouterId,
        route: StoredRoute,
    ) -> Result<()> {
        self.check_length()?;
        if self.offsets.offset_of(router_id).is_some() {
            self.offsets.set_value(&mut self.values, router_id, Some(route));
            return Ok(());
        }
        let expanded = maps.get(self.offsets.with(router_id));
        let new_offset = expanded.offset_of_unchecked(router_id);
        let mut values = expanded.expand(&self.offsets, self.values.clone(), new_offset)?;
        values[new_offset] = Some(route);
        trace!("Offset map grew to {} for {}", expanded, router_id);
        self.offsets = expanded;
        self.values = values;
        Ok(())
    }

    /// Clear the route of a contributor.
    /// Returns whether the entry holds no routes anymore.
    pub fn remove_route(&mut self, maps: &mut OffsetMaps, router_id: RouterId) -> Result<bool> {
        self.check_length()?;
        let offset = self
            .offsets
            .offset_of(router_id)
            .filter(|offset| self.values[*offset].is_some());
        let offset = match offset {
            Some(offset) => offset,
            None => {
                return Err(RibError::UnknownContributor {
                    destination: self.destination,
                    peer: router_id,
                })
            }
        };
        self.values[offset] = None;
        if self.is_empty() {
            return Ok(true);
        }
        self.compact(maps)?;
        Ok(false)
    }

    /// Drop empty slots once they make up half of the entry
    fn compact(&mut self, maps: &mut OffsetMaps) -> Result<()> {
        let empty = self.values.iter().filter(|v| v.is_none()).count();
        if empty * 2 < self.values.len() {
            return Ok(());
        }
        let mut offsets = OffsetMap::clone(&self.offsets);
        let mut values = self.values.clone();
        for offset in (0..values.len()).rev() {
            if values[offset].is_none() {
                let id = offsets.router_id(offset);
                values = offsets.remove_value(values, offset)?;
                offsets = offsets.without(id);
            }
        }
        trace!("Compacted offset map to {}", offsets);
        self.offsets = maps.get(offsets);
        self.values = values;
        Ok(())
    }

    /// Run best path selection over the live routes.
    /// Returns the previous best path when the winner changed.
    pub fn select_best(&mut self, local_as: u32) -> Option<Option<BestPath>> {
        let mut selector = BestPathSelector::new(local_as);
        for (router_id, route) in self.live_routes() {
            selector.process_path(router_id, route);
        }
        let best = selector.result();
        if best == self.best {
            return None;
        }
        Some(std::mem::replace(&mut self.best, best))
    }

    fn check_length(&self) -> Result<()> {
        if self.values.len() != self.offsets.size() {
            return Err(RibError::LengthMismatch {
                offsets: self.offsets.size(),
                values: self.values.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::AsPath;
    use std::sync::Mutex;
    use std::thread;

    fn route(local_pref: u32) -> StoredRoute {
        StoredRoute::new(
            Arc::new(PathAttributes {
                local_pref: Some(local_pref),
                as_path: AsPath::from_sequence(vec![100]),
                ..Default::default()
            }),
            false,
            None,
        )
    }

    fn id(raw: u32) -> RouterId {
        RouterId::from(raw)
    }

    fn prefix() -> IpNetwork {
        "10.0.0.0/24".parse().unwrap()
    }

    #[test]
    fn test_length_invariant_holds() {
        let mut maps = OffsetMaps::new();
        let mut entry = RouteEntry::new(prefix(), &maps);
        let ops: Vec<(bool, u32)> = vec![
            (true, 5),
            (true, 1),
            (true, 9),
            (true, 1),
            (false, 5),
            (true, 3),
            (false, 9),
            (false, 1),
            (true, 7),
            (false, 3),
        ];
        for (add, raw) in ops {
            if add {
                entry.add_route(&mut maps, id(raw), route(100)).unwrap();
            } else {
                entry.remove_route(&mut maps, id(raw)).unwrap();
            }
            assert_eq!(entry.values().len(), entry.offsets().size());
        }
        let live: Vec<_> = entry.live_routes().map(|(id, _)| id.value()).collect();
        assert_eq!(live, vec![7]);
    }

    #[test]
    fn test_add_overwrites_in_place() {
        let mut maps = OffsetMaps::new();
        let mut entry = RouteEntry::new(prefix(), &maps);
        entry.add_route(&mut maps, id(1), route(100)).unwrap();
        let offsets = entry.offsets().clone();
        entry.add_route(&mut maps, id(1), route(200)).unwrap();
        assert!(Arc::ptr_eq(&offsets, entry.offsets()));
        assert_eq!(entry.route(id(1)).unwrap().attributes.local_pref, Some(200));
    }

    #[test]
    fn test_remove_last_reports_empty() {
        let mut maps = OffsetMaps::new();
        let mut entry = RouteEntry::new(prefix(), &maps);
        entry.add_route(&mut maps, id(1), route(100)).unwrap();
        entry.add_route(&mut maps, id(2), route(100)).unwrap();
        assert!(!entry.remove_route(&mut maps, id(1)).unwrap());
        assert!(entry.remove_route(&mut maps, id(2)).unwrap());
        assert!(entry.is_empty());
    }

    #[test]
    fn test_remove_unknown_contributor() {
        let mut maps = OffsetMaps::new();
        let mut entry = RouteEntry::new(prefix(), &maps);
        entry.add_route(&mut maps, id(1), route(100)).unwrap();
        let err = entry.remove_route(&mut maps, id(2)).unwrap_err();
        assert!(matches!(err, RibError::UnknownContributor { .. }));
        // Entry untouched
        assert_eq!(entry.live_routes().count(), 1);
    }

    #[test]
    fn test_compaction_at_half_empty() {
        let mut maps = OffsetMaps::new();
        let mut entry = RouteEntry::new(prefix(), &maps);
        for raw in 1..=4 {
            entry.add_route(&mut maps, id(raw), route(100)).unwrap();
        }
        entry.remove_route(&mut maps, id(1)).unwrap();
        // One of four empty: slot kept
        assert_eq!(entry.offsets().size(), 4);
        entry.remove_route(&mut maps, id(3)).unwrap();
        // Two of four empty: compacted
        assert_eq!(entry.offsets().ids(), &[id(2), id(4)][..]);
        assert_eq!(entry.live_routes().count(), 2);
    }

    #[test]
    fn test_entries_share_offset_maps() {
        let mut maps = OffsetMaps::new();
        let mut a = RouteEntry::new(prefix(), &maps);
        let mut b = RouteEntry::new(prefix(), &maps);
        a.add_route(&mut maps, id(1), route(100)).unwrap();
        a.add_route(&mut maps, id(2), route(100)).unwrap();
        b.add_route(&mut maps, id(2), route(100)).unwrap();
        b.add_route(&mut maps, id(1), route(100)).unwrap();
        assert!(Arc::ptr_eq(a.offsets(), b.offsets()));
    }

    #[test]
    fn test_select_best_is_idempotent() {
        let mut maps = OffsetMaps::new();
        let mut entry = RouteEntry::new(prefix(), &maps);
        entry.add_route(&mut maps, id(1), route(100)).unwrap();
        entry.add_route(&mut maps, id(2), route(200)).unwrap();
        assert_eq!(entry.select_best(65000), Some(None));
        let first = entry.best_path().cloned().unwrap();
        assert_eq!(first.router_id, id(2));
        assert_eq!(entry.select_best(65000), None);
        assert_eq!(entry.best_path(), Some(&first));
    }

    #[test]
    fn test_select_best_reports_previous() {
        let mut maps = OffsetMaps::new();
        let mut entry = RouteEntry::new(prefix(), &maps);
        entry.add_route(&mut maps, id(1), route(100)).unwrap();
        entry.select_best(65000);
        entry.add_route(&mut maps, id(2), route(200)).unwrap();
        let previous = entry.select_best(65000).unwrap().unwrap();
        assert_eq!(previous.router_id, id(1));
        assert_eq!(entry.best_path().unwrap().router_id, id(2));
    }

    #[test]
    fn test_concurrent_adds() {
        const N: u32 = 32;
        let maps = OffsetMaps::new();
        let entry = Arc::new(Mutex::new((RouteEntry::new(prefix(), &maps), maps)));
        let handles: Vec<_> = (0..N)
            .rev()
            .map(|raw| {
                let entry = entry.clone();
                thread::spawn(move || {
                    let mut guard = entry.lock().unwrap();
                    let (entry, maps) = &mut *guard;
                    entry.add_route(maps, id(raw * 7 + 1), route(100)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let guard = entry.lock().unwrap();
        let (entry, _) = &*guard;
        assert_eq!(entry.offsets().size(), N as usize);
        assert_eq!(entry.live_routes().count(), N as usize);
        let ids: Vec<_> = entry.live_routes().map(|(id, _)| id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
