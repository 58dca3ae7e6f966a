use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use ipnetwork::IpNetwork;

use crate::rib::{Origin, PathAttributes, RouterId, StoredRoute};

/// LOCAL_PREF assumed for routes that do not carry one
pub const DEFAULT_LOCAL_PREF: u32 = 100;

/// Attribute values resolved for comparison
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BestPathState {
    pub depreferenced: bool,
    pub local_pref: u32,
    pub as_path_length: usize,
    pub origin: Origin,
    pub multi_exit_disc: u32,
    /// Neighbor AS; the local AS for locally originated (empty path) routes
    pub first_as: u32,
}

impl BestPathState {
    pub fn new(local_as: u32, attributes: &PathAttributes) -> Self {
        Self {
            depreferenced: attributes.is_llgr_stale(),
            local_pref: attributes.local_pref.unwrap_or(DEFAULT_LOCAL_PREF),
            as_path_length: attributes.as_path.path_length(),
            origin: attributes.origin,
            multi_exit_disc: attributes.multi_exit_disc.unwrap_or(0),
            first_as: attributes.as_path.first_as().unwrap_or(local_as),
        }
    }
}

/// Winner of best path selection for one destination
#[derive(Clone, Debug)]
pub struct BestPath {
    pub router_id: RouterId,
    pub route: StoredRoute,
    pub state: BestPathState,
}

impl BestPath {
    pub fn attributes(&self) -> &Arc<PathAttributes> {
        &self.route.attributes
    }
}

/// Two best paths are the same advertisement when the winner and what it
/// announced are unchanged; the receive time is ignored
impl PartialEq for BestPath {
    fn eq(&self, other: &Self) -> bool {
        self.router_id == other.router_id
            && self.route.ebgp == other.route.ebgp
            && self.route.igp_metric == other.route.igp_metric
            && (Arc::ptr_eq(&self.route.attributes, &other.route.attributes)
                || self.route.attributes == other.route.attributes)
    }
}

impl Eq for BestPath {}

impl fmt::Display for BestPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<BestPath from={} local_pref={} path_len={} origin={} med={}>",
            self.router_id,
            self.state.local_pref,
            self.state.as_path_length,
            self.state.origin,
            self.state.multi_exit_disc,
        )
    }
}

/// Outcome of recomputing one destination
#[derive(Clone, Debug, PartialEq)]
pub struct BestPathChange {
    pub destination: IpNetwork,
    pub old: Option<BestPath>,
    /// `None` when the destination lost its last route
    pub new: Option<BestPath>,
}

impl BestPathChange {
    pub fn is_withdrawal(&self) -> bool {
        self.new.is_none()
    }
}

/// Incremental best path selection over the live routes of an entry
///
/// Routes can be offered in any order; the result only depends on the set.
pub struct BestPathSelector {
    local_as: u32,
    best: Option<BestPath>,
}

impl BestPathSelector {
    pub fn new(local_as: u32) -> Self {
        Self {
            local_as,
            best: None,
        }
    }

    pub fn process_path(&mut self, router_id: RouterId, route: &StoredRoute) {
        let state = BestPathState::new(self.local_as, &route.attributes);
        let replace = match &self.best {
            None => true,
            Some(best) => {
                compare(router_id, route, &state, best.router_id, &best.route, &best.state)
                    == Ordering::Less
            }
        };
        if replace {
            self.best = Some(BestPath {
                router_id,
                route: route.clone(),
                state,
            });
        }
    }

    pub fn result(self) -> Option<BestPath> {
        self.best
    }
}

/// `Less` when route `a` is preferred over route `b`
fn compare(
    a_id: RouterId,
    a: &StoredRoute,
    a_state: &BestPathState,
    b_id: RouterId,
    b: &StoredRoute,
    b_state: &BestPathState,
) -> Ordering {
    // LLGR stale routes lose to anything else
    a_state
        .depreferenced
        .cmp(&b_state.depreferenced)
        .then_with(|| b_state.local_pref.cmp(&a_state.local_pref))
        .then_with(|| a_state.as_path_length.cmp(&b_state.as_path_length))
        .then_with(|| a_state.origin.cmp(&b_state.origin))
        .then_with(|| {
            if a_state.first_as == b_state.first_as {
                a_state.multi_exit_disc.cmp(&b_state.multi_exit_disc)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.ebgp.cmp(&a.ebgp))
        .then_with(|| match (a.igp_metric, b.igp_metric) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a_id.cmp(&b_id))
}
