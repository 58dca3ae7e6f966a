use ipnetwork::IpNetwork;
use prettytable::{cell, row, Row};
use serde::Serialize;

use super::table::ToRow;
use crate::rib::{AdvertisedRoute, Family, LocRibRoute, PathAttributes, RouterId, StoredRoute};
use crate::utils::{format_time_as_elapsed, maybe_string};

/// Attribute columns shared by every route view
#[derive(Debug, Serialize)]
pub struct AttributeColumns {
    pub next_hop: String,
    pub origin: String,
    pub local_pref: String,
    pub metric: String,
    pub as_path: String,
    pub communities: String,
}

impl From<&PathAttributes> for AttributeColumns {
    fn from(attributes: &PathAttributes) -> Self {
        Self {
            next_hop: maybe_string(attributes.next_hop.as_ref()),
            origin: attributes.origin.to_string(),
            local_pref: maybe_string(attributes.local_pref.as_ref()),
            metric: maybe_string(attributes.multi_exit_disc.as_ref()),
            as_path: attributes.as_path.to_string(),
            communities: attributes.communities.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LocRibRow {
    pub family: Family,
    pub prefix: String,
    pub peer: String,
    pub age: String,
    pub igp_metric: String,
    #[serde(flatten)]
    pub attributes: AttributeColumns,
}

impl LocRibRow {
    pub fn new(family: Family, prefix: IpNetwork, route: &LocRibRoute) -> Self {
        Self {
            family,
            prefix: prefix.to_string(),
            peer: route.peer.to_string(),
            age: format_time_as_elapsed(route.selected_at),
            igp_metric: maybe_string(route.igp_metric.as_ref()),
            attributes: AttributeColumns::from(route.attributes.as_ref()),
        }
    }
}

impl ToRow for LocRibRow {
    fn columns() -> Row {
        row![
            "Prefix",
            "Best From",
            "Next Hop",
            "Age",
            "Origin",
            "Local Pref",
            "Metric",
            "IGP Metric",
            "AS Path",
            "Communities"
        ]
    }

    fn to_row(&self) -> Row {
        row![
            self.prefix,
            self.peer,
            self.attributes.next_hop,
            self.age,
            self.attributes.origin,
            self.attributes.local_pref,
            self.attributes.metric,
            self.igp_metric,
            self.attributes.as_path,
            self.attributes.communities,
        ]
    }
}

#[derive(Debug, Serialize)]
pub struct LearnedRouteRow {
    pub family: Family,
    pub received_from: String,
    pub prefix: String,
    pub age: String,
    pub igp_metric: String,
    #[serde(flatten)]
    pub attributes: AttributeColumns,
}

impl LearnedRouteRow {
    pub fn new(family: Family, prefix: IpNetwork, peer: RouterId, route: &StoredRoute) -> Self {
        Self {
            family,
            received_from: peer.to_string(),
            prefix: prefix.to_string(),
            age: format_time_as_elapsed(route.received),
            igp_metric: maybe_string(route.igp_metric.as_ref()),
            attributes: AttributeColumns::from(route.attributes.as_ref()),
        }
    }
}

impl ToRow for LearnedRouteRow {
    fn columns() -> Row {
        row![
            "Received From",
            "Prefix",
            "Next Hop",
            "Age",
            "Origin",
            "Local Pref",
            "Metric",
            "IGP Metric",
            "AS Path",
            "Communities"
        ]
    }

    fn to_row(&self) -> Row {
        row![
            self.received_from,
            self.prefix,
            self.attributes.next_hop,
            self.age,
            self.attributes.origin,
            self.attributes.local_pref,
            self.attributes.metric,
            self.igp_metric,
            self.attributes.as_path,
            self.attributes.communities,
        ]
    }
}

#[derive(Debug, Serialize)]
pub struct AdvertisedRouteRow {
    pub family: Family,
    pub advertised_to: String,
    pub source: String,
    pub prefix: String,
    pub age: String,
    #[serde(flatten)]
    pub attributes: AttributeColumns,
}

impl AdvertisedRouteRow {
    pub fn new(family: Family, prefix: IpNetwork, peer: RouterId, route: &AdvertisedRoute) -> Self {
        Self {
            family,
            advertised_to: peer.to_string(),
            source: route.source.to_string(),
            prefix: prefix.to_string(),
            age: format_time_as_elapsed(route.advertised_at),
            attributes: AttributeColumns::from(route.attributes.as_ref()),
        }
    }
}

impl ToRow for AdvertisedRouteRow {
    fn columns() -> Row {
        row![
            "Advertised To",
            "Learned From",
            "Prefix",
            "Next Hop",
            "Age",
            "Origin",
            "Local Pref",
            "Metric",
            "AS Path",
            "Communities"
        ]
    }

    fn to_row(&self) -> Row {
        row![
            self.advertised_to,
            self.source,
            self.prefix,
            self.attributes.next_hop,
            self.age,
            self.attributes.origin,
            self.attributes.local_pref,
            self.attributes.metric,
            self.attributes.as_path,
            self.attributes.communities,
        ]
    }
}
