//! Role based import and export policy (RFC4271 propagation rules and
//! RFC4456 route reflection)

mod group;
mod tracker;

pub use group::PeerExportGroup;
pub use tracker::{PeerPolicy, PolicyPeerTracker};

use std::fmt;
use std::sync::Arc;

use log::trace;
use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

use crate::rib::{ClusterId, PathAttributes, RouterId};

/// Relationship of a peer to this speaker
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PeerRole {
    Ebgp,
    Ibgp,
    RrClient,
    /// Application or internal peer, never reflected with cluster tagging
    Internal,
}

impl PeerRole {
    pub const ALL: [PeerRole; 4] = [
        PeerRole::Ebgp,
        PeerRole::Ibgp,
        PeerRole::RrClient,
        PeerRole::Internal,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            PeerRole::Ebgp => 0,
            PeerRole::Ibgp => 1,
            PeerRole::RrClient => 2,
            PeerRole::Internal => 3,
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let display = match self {
            PeerRole::Ebgp => "ebgp",
            PeerRole::Ibgp => "ibgp",
            PeerRole::RrClient => "rr-client",
            PeerRole::Internal => "internal",
        };
        write!(f, "{}", display)
    }
}

impl Serialize for PeerRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PeerRole {
    fn deserialize<D>(deserializer: D) -> Result<PeerRole, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "ebgp" => Ok(PeerRole::Ebgp),
            "ibgp" => Ok(PeerRole::Ibgp),
            "rr-client" => Ok(PeerRole::RrClient),
            "internal" => Ok(PeerRole::Internal),
            _ => Err(serde::de::Error::custom(format!(
                "Unsupported peer role: '{}'",
                s
            ))),
        }
    }
}

/// What to do with routes received from a peer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImportPolicy {
    FromExternal,
    FromInternal {
        local_id: RouterId,
        cluster_id: ClusterId,
    },
    FromReflectorClient {
        local_id: RouterId,
        cluster_id: ClusterId,
    },
    FromInternalReflectorClient,
}

impl ImportPolicy {
    /// Attributes to store in the Adj-RIB-In, `None` to reject the route
    pub fn effective_attributes(
        &self,
        attributes: &Arc<PathAttributes>,
    ) -> Option<Arc<PathAttributes>> {
        match self {
            ImportPolicy::FromExternal => {
                if attributes.local_pref.is_none()
                    && attributes.originator_id.is_none()
                    && attributes.cluster_list.is_empty()
                {
                    Some(attributes.clone())
                } else {
                    Some(Arc::new(attributes.imported_from_external()))
                }
            }
            ImportPolicy::FromInternal {
                local_id,
                cluster_id,
            }
            | ImportPolicy::FromReflectorClient {
                local_id,
                cluster_id,
            } => {
                // RFC4456 section 8
                if attributes.originator_id == Some(*local_id) {
                    trace!("Rejecting route originated by this router");
                    return None;
                }
                if attributes.cluster_list.contains(cluster_id) {
                    trace!("Rejecting route carrying cluster {}", cluster_id);
                    return None;
                }
                Some(attributes.clone())
            }
            ImportPolicy::FromInternalReflectorClient => Some(attributes.clone()),
        }
    }
}

/// Import policy bound to one session
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionImportPolicy {
    pub policy: ImportPolicy,
    aigp_session: bool,
}

impl SessionImportPolicy {
    pub fn new(policy: ImportPolicy, aigp_session: bool) -> Self {
        Self {
            policy,
            aigp_session,
        }
    }

    /// AIGP attribute is honored on this session
    pub fn is_aigp_session(&self) -> bool {
        self.aigp_session
    }

    pub fn effective_attributes(
        &self,
        attributes: &Arc<PathAttributes>,
    ) -> Option<Arc<PathAttributes>> {
        self.policy.effective_attributes(attributes)
    }
}

/// What to send to a peer of a given role
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportPolicy {
    ToExternal { local_as: u32 },
    /// Non-client iBGP peers
    ToInternal { cluster_id: ClusterId },
    ToReflectorClient { cluster_id: ClusterId },
    /// Internal peers receive nothing
    ToInternalReflectorClient,
}

impl ExportPolicy {
    /// Attributes to advertise for a route learned from `source_id` (with
    /// `source_role`), `None` to suppress the advertisement
    pub fn effective_attributes(
        &self,
        source_role: PeerRole,
        source_id: RouterId,
        attributes: &Arc<PathAttributes>,
    ) -> Option<Arc<PathAttributes>> {
        match self {
            ExportPolicy::ToExternal { local_as } => {
                Some(Arc::new(attributes.exported_to_external(*local_as)))
            }
            ExportPolicy::ToInternal { cluster_id } => match source_role {
                PeerRole::Ebgp | PeerRole::Internal => Some(attributes.clone()),
                PeerRole::RrClient => reflect(*cluster_id, source_id, attributes),
                PeerRole::Ibgp => {
                    trace!("Split horizon: not sending iBGP route from {}", source_id);
                    None
                }
            },
            ExportPolicy::ToReflectorClient { cluster_id } => match source_role {
                PeerRole::Ebgp | PeerRole::Internal => Some(attributes.clone()),
                PeerRole::Ibgp | PeerRole::RrClient => {
                    reflect(*cluster_id, source_id, attributes)
                }
            },
            ExportPolicy::ToInternalReflectorClient => None,
        }
    }
}

fn reflect(
    cluster_id: ClusterId,
    originator: RouterId,
    attributes: &Arc<PathAttributes>,
) -> Option<Arc<PathAttributes>> {
    match attributes.reflected(cluster_id, originator) {
        Some(reflected) => Some(Arc::new(reflected)),
        None => {
            trace!("Cluster list loop for route from {}", originator);
            None
        }
    }
}

/// Policies for every peer role, fixed for the lifetime of a RIB
#[derive(Debug)]
pub struct PolicyDatabase {
    local_as: u32,
    local_id: RouterId,
    cluster_id: ClusterId,
    import: [ImportPolicy; 4],
    export: [ExportPolicy; 4],
}

impl PolicyDatabase {
    pub fn new(local_as: u32, local_id: RouterId, cluster_id: ClusterId) -> Self {
        let import = PeerRole::ALL.map(|role| match role {
            PeerRole::Ebgp => ImportPolicy::FromExternal,
            PeerRole::Ibgp => ImportPolicy::FromInternal {
                local_id,
                cluster_id,
            },
            PeerRole::RrClient => ImportPolicy::FromReflectorClient {
                local_id,
                cluster_id,
            },
            PeerRole::Internal => ImportPolicy::FromInternalReflectorClient,
        });
        let export = PeerRole::ALL.map(|role| match role {
            PeerRole::Ebgp => ExportPolicy::ToExternal { local_as },
            PeerRole::Ibgp => ExportPolicy::ToInternal { cluster_id },
            PeerRole::RrClient => ExportPolicy::ToReflectorClient { cluster_id },
            PeerRole::Internal => ExportPolicy::ToInternalReflectorClient,
        });
        Self {
            local_as,
            local_id,
            cluster_id,
            import,
            export,
        }
    }

    pub fn import_policy_for(&self, role: PeerRole) -> ImportPolicy {
        self.import[role.index()]
    }

    pub fn export_policy_for(&self, role: PeerRole) -> ExportPolicy {
        self.export[role.index()]
    }

    pub fn local_as(&self) -> u32 {
        self.local_as
    }

    pub fn local_id(&self) -> RouterId {
        self.local_id
    }

    pub fn cluster_id(&self) -> ClusterId {
        self.cluster_id
    }
}
