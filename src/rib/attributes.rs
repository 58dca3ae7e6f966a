use std::fmt;
use std::net::IpAddr;

use crate::rib::{ClusterId, CommunityList, RouterId};
use crate::utils::asn_to_dotted;

/// Most ASNs a single AS_SEQUENCE segment can carry
const MAX_SEGMENT_LENGTH: usize = 255;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Origin {
    Igp,
    Egp,
    Incomplete,
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Incomplete
    }
}

impl From<&bgp_rs::Origin> for Origin {
    fn from(origin: &bgp_rs::Origin) -> Self {
        match origin {
            bgp_rs::Origin::IGP => Origin::Igp,
            bgp_rs::Origin::EGP => Origin::Egp,
            bgp_rs::Origin::INCOMPLETE => Origin::Incomplete,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let display = match self {
            Origin::Igp => "IGP",
            Origin::Egp => "EGP",
            Origin::Incomplete => "Incomplete",
        };
        write!(f, "{}", display)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Segment {
    Sequence(Vec<u32>),
    Set(Vec<u32>),
}

impl From<&bgp_rs::Segment> for Segment {
    fn from(segment: &bgp_rs::Segment) -> Self {
        match segment {
            bgp_rs::Segment::AS_SEQUENCE(asns) => Segment::Sequence(asns.clone()),
            bgp_rs::Segment::AS_SET(asns) => Segment::Set(asns.clone()),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct AsPath {
    pub segments: Vec<Segment>,
}

impl AsPath {
    pub fn from_sequence(asns: Vec<u32>) -> Self {
        if asns.is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![Segment::Sequence(asns)],
        }
    }

    /// Path length as used by best path selection:
    /// every AS in a sequence counts, the first AS_SET counts as one and
    /// any further sets are ignored.
    pub fn path_length(&self) -> usize {
        let mut length = 0;
        let mut seen_set = false;
        for segment in &self.segments {
            match segment {
                Segment::Sequence(asns) => length += asns.len(),
                Segment::Set(_) if !seen_set => {
                    seen_set = true;
                    length += 1;
                }
                Segment::Set(_) => (),
            }
        }
        length
    }

    /// Leftmost AS of the leading sequence, the neighbor AS for MED comparison
    pub fn first_as(&self) -> Option<u32> {
        match self.segments.first() {
            Some(Segment::Sequence(asns)) => asns.first().copied(),
            _ => None,
        }
    }

    /// Prepend an ASN, reusing the leading sequence while it has room
    pub fn prepend(&self, asn: u32) -> Self {
        let mut segments = self.segments.clone();
        match segments.first_mut() {
            Some(Segment::Sequence(asns)) if asns.len() < MAX_SEGMENT_LENGTH => {
                asns.insert(0, asn);
            }
            _ => segments.insert(0, Segment::Sequence(vec![asn])),
        }
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for AsPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let segments = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Sequence(asns) => asns
                    .iter()
                    .map(|asn| asn_to_dotted(*asn))
                    .collect::<Vec<String>>()
                    .join(" "),
                Segment::Set(asns) => format!(
                    "{{{}}}",
                    asns.iter()
                        .map(|asn| asn_to_dotted(*asn))
                        .collect::<Vec<String>>()
                        .join(",")
                ),
            })
            .collect::<Vec<String>>();
        write!(f, "{}", segments.join(" "))
    }
}

/// Optional attribute this speaker does not interpret, carried opaquely
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct UnrecognizedAttribute {
    pub type_code: u8,
    pub transitive: bool,
    pub value: Vec<u8>,
}

/// Decoded path attributes of a route
///
/// Shared behind an `Arc` between every prefix announced in one update and
/// between the Adj-RIB-In, Loc-RIB and Adj-RIB-Out copies of a route.
/// Rewrites always produce a new value.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct PathAttributes {
    pub origin: Origin,
    pub as_path: AsPath,
    pub next_hop: Option<IpAddr>,
    pub multi_exit_disc: Option<u32>,
    pub local_pref: Option<u32>,
    pub communities: CommunityList,
    pub originator_id: Option<RouterId>,
    pub cluster_list: Vec<ClusterId>,
    pub aigp: Option<u64>,
    pub unrecognized: Vec<UnrecognizedAttribute>,
}

impl PathAttributes {
    /// Attributes as sent to an external peer: non-transitive attributes
    /// are dropped and the local AS is prepended
    pub fn exported_to_external(&self, local_as: u32) -> Self {
        Self {
            origin: self.origin,
            as_path: self.as_path.prepend(local_as),
            next_hop: self.next_hop,
            multi_exit_disc: None,
            local_pref: None,
            communities: self.communities.clone(),
            originator_id: None,
            cluster_list: Vec::new(),
            aigp: None,
            unrecognized: self
                .unrecognized
                .iter()
                .filter(|attr| attr.transitive)
                .cloned()
                .collect(),
        }
    }

    /// RFC4456 reflection. Returns `None` when the local cluster is already
    /// in the CLUSTER_LIST (reflection loop).
    pub fn reflected(&self, cluster_id: ClusterId, originator: RouterId) -> Option<Self> {
        if self.cluster_list.contains(&cluster_id) {
            return None;
        }
        let mut reflected = self.clone();
        reflected.cluster_list.insert(0, cluster_id);
        if reflected.originator_id.is_none() {
            reflected.originator_id = Some(originator);
        }
        Some(reflected)
    }

    /// Attributes as accepted from an external peer
    pub fn imported_from_external(&self) -> Self {
        Self {
            local_pref: None,
            originator_id: None,
            cluster_list: Vec::new(),
            ..self.clone()
        }
    }

    pub fn without_aigp(&self) -> Self {
        Self {
            aigp: None,
            ..self.clone()
        }
    }

    pub fn is_llgr_stale(&self) -> bool {
        self.communities.is_llgr_stale()
    }
}
