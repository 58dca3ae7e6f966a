use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bgp_rs::{NLRIEncoding, PathAttribute, Prefix, Update, AFI, SAFI};
use ipnetwork::IpNetwork;
use log::{trace, warn};

use super::{
    AsPath, ClusterId, Community, CommunityList, Family, Origin, PathAttributes, RouterId,
};

/// Route level change carried by an UPDATE message
#[derive(Clone, Debug, PartialEq)]
pub enum RouteEvent {
    Announce {
        family: Family,
        destination: IpNetwork,
        attributes: Arc<PathAttributes>,
    },
    Withdraw {
        family: Family,
        destination: IpNetwork,
    },
}

/// Split an UPDATE into per-destination events
///
/// Withdrawals come first. Every IPv4 announcement shares one attribute
/// set; MP_REACH routes share a second one carrying the MP next hop.
pub fn parse_update(update: &Update) -> Vec<RouteEvent> {
    let ipv4 = Family::ipv4_unicast();
    let mut events: Vec<RouteEvent> = update
        .withdrawn_routes
        .iter()
        .filter_map(to_network)
        .map(|destination| RouteEvent::Withdraw {
            family: ipv4,
            destination,
        })
        .collect();

    for attribute in &update.attributes {
        if let PathAttribute::MP_UNREACH_NLRI(unreach) = attribute {
            let family = Family::new(unreach.afi, unreach.safi);
            events.extend(
                unreach
                    .withdrawn_routes
                    .iter()
                    .filter_map(to_network)
                    .map(|destination| RouteEvent::Withdraw {
                        family,
                        destination,
                    }),
            );
        }
    }

    let attributes = parse_attributes(update);
    if !update.announced_routes.is_empty() {
        let shared = Arc::new(attributes.clone());
        events.extend(
            update
                .announced_routes
                .iter()
                .filter_map(to_network)
                .map(|destination| RouteEvent::Announce {
                    family: ipv4,
                    destination,
                    attributes: shared.clone(),
                }),
        );
    }

    for attribute in &update.attributes {
        if let PathAttribute::MP_REACH_NLRI(reach) = attribute {
            if reach.safi != SAFI::Unicast {
                trace!("Ignoring MP_REACH for {} {}", reach.afi, reach.safi);
                continue;
            }
            let family = Family::new(reach.afi, reach.safi);
            let shared = Arc::new(PathAttributes {
                next_hop: mp_next_hop(&reach.next_hop).or(attributes.next_hop),
                ..attributes.clone()
            });
            events.extend(
                reach
                    .announced_routes
                    .iter()
                    .filter_map(to_network)
                    .map(|destination| RouteEvent::Announce {
                        family,
                        destination,
                        attributes: shared.clone(),
                    }),
            );
        }
    }
    events
}

fn parse_attributes(update: &Update) -> PathAttributes {
    let mut attributes = PathAttributes::default();
    let mut communities = Vec::new();
    for attribute in &update.attributes {
        match attribute {
            PathAttribute::ORIGIN(origin) => attributes.origin = Origin::from(origin),
            PathAttribute::AS_PATH(as_path) => {
                attributes.as_path = AsPath {
                    segments: as_path.segments.iter().map(Into::into).collect(),
                }
            }
            PathAttribute::NEXT_HOP(next_hop) => attributes.next_hop = Some(*next_hop),
            PathAttribute::MULTI_EXIT_DISC(med) => attributes.multi_exit_disc = Some(*med),
            PathAttribute::LOCAL_PREF(local_pref) => attributes.local_pref = Some(*local_pref),
            PathAttribute::COMMUNITY(values) => {
                communities.extend(values.iter().map(|c| Community::STANDARD(*c)))
            }
            PathAttribute::EXTENDED_COMMUNITIES(values) => {
                communities.extend(values.iter().map(|c| Community::EXTENDED(*c)))
            }
            PathAttribute::ORIGINATOR_ID(id) => {
                attributes.originator_id = Some(RouterId::new(*id))
            }
            PathAttribute::CLUSTER_LIST(ids) => {
                attributes.cluster_list = ids.iter().map(|id| ClusterId::new(*id)).collect()
            }
            _ => (),
        }
    }
    attributes.communities = CommunityList(communities);
    attributes
}

/// First address of an MP_REACH next hop (a global IPv6 address may be
/// followed by a link local one)
fn mp_next_hop(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        0 => None,
        4 => {
            let mut buffer = [0u8; 4];
            buffer.copy_from_slice(bytes);
            Some(IpAddr::V4(Ipv4Addr::from(buffer)))
        }
        len if len >= 16 => {
            let mut buffer = [0u8; 16];
            buffer.copy_from_slice(&bytes[..16]);
            Some(IpAddr::V6(Ipv6Addr::from(buffer)))
        }
        len => {
            warn!("Unexpected MP_REACH next hop length {}", len);
            None
        }
    }
}

fn to_network(nlri: &NLRIEncoding) -> Option<IpNetwork> {
    match nlri {
        NLRIEncoding::IP(prefix) => prefix_to_network(prefix),
        _ => {
            trace!("Ignoring non-IP NLRI");
            None
        }
    }
}

/// Prefix bytes only cover the prefix length, the rest is zero filled
fn prefix_to_network(prefix: &Prefix) -> Option<IpNetwork> {
    let address = match prefix.protocol {
        AFI::IPV4 => {
            let mut buffer = [0u8; 4];
            let len = prefix.prefix.len().min(4);
            buffer[..len].copy_from_slice(&prefix.prefix[..len]);
            IpAddr::V4(Ipv4Addr::from(buffer))
        }
        AFI::IPV6 => {
            let mut buffer = [0u8; 16];
            let len = prefix.prefix.len().min(16);
            buffer[..len].copy_from_slice(&prefix.prefix[..len]);
            IpAddr::V6(Ipv6Addr::from(buffer))
        }
        _ => return None,
    };
    match IpNetwork::new(address, prefix.length) {
        Ok(network) => Some(network),
        Err(err) => {
            warn!("Invalid prefix {}/{}: {}", address, prefix.length, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_rs::{ASPath, MPReachNLRI, MPUnreachNLRI, Segment};

    fn v4_prefix(octets: Vec<u8>, length: u8) -> NLRIEncoding {
        NLRIEncoding::IP(Prefix {
            protocol: AFI::IPV4,
            length,
            prefix: octets,
        })
    }

    fn v6_prefix(octets: Vec<u8>, length: u8) -> NLRIEncoding {
        NLRIEncoding::IP(Prefix {
            protocol: AFI::IPV6,
            length,
            prefix: octets,
        })
    }

    #[test]
    fn test_prefix_to_network() {
        let network = to_network(&v4_prefix(vec![10, 1], 16)).unwrap();
        assert_eq!(network, "10.1.0.0/16".parse::<IpNetwork>().unwrap());
        let network = to_network(&v6_prefix(vec![0x20, 0x01, 0x0d, 0xb8], 32)).unwrap();
        assert_eq!(network, "2001:db8::/32".parse::<IpNetwork>().unwrap());
        assert!(to_network(&v4_prefix(vec![10], 33)).is_none());
    }

    #[test]
    fn test_parse_ipv4_update() {
        let update = Update {
            withdrawn_routes: vec![v4_prefix(vec![192, 168], 16)],
            attributes: vec![
                PathAttribute::ORIGIN(bgp_rs::Origin::IGP),
                PathAttribute::AS_PATH(ASPath {
                    segments: vec![Segment::AS_SEQUENCE(vec![100, 200])],
                }),
                PathAttribute::NEXT_HOP("10.0.0.1".parse().unwrap()),
                PathAttribute::LOCAL_PREF(200),
                PathAttribute::COMMUNITY(vec![0xffff_0006]),
                PathAttribute::CLUSTER_LIST(vec![0x0101_0101]),
            ],
            announced_routes: vec![v4_prefix(vec![10, 1], 16), v4_prefix(vec![10, 2], 16)],
        };
        let events = parse_update(&update);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            RouteEvent::Withdraw {
                family: Family::ipv4_unicast(),
                destination: "192.168.0.0/16".parse().unwrap(),
            }
        );
        let shared: Vec<Arc<PathAttributes>> = events[1..]
            .iter()
            .map(|event| match event {
                RouteEvent::Announce { attributes, .. } => attributes.clone(),
                RouteEvent::Withdraw { .. } => panic!("expected announcement"),
            })
            .collect();
        assert!(Arc::ptr_eq(&shared[0], &shared[1]));
        let attrs = &shared[0];
        assert_eq!(attrs.origin, Origin::Igp);
        assert_eq!(attrs.as_path, AsPath::from_sequence(vec![100, 200]));
        assert_eq!(attrs.local_pref, Some(200));
        assert!(attrs.is_llgr_stale());
        assert_eq!(attrs.cluster_list, vec![ClusterId::new(0x0101_0101)]);
    }

    #[test]
    fn test_parse_mp_update() {
        let next_hop = vec![
            0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01,
        ];
        let update = Update {
            withdrawn_routes: vec![],
            attributes: vec![
                PathAttribute::ORIGIN(bgp_rs::Origin::EGP),
                PathAttribute::MP_REACH_NLRI(MPReachNLRI {
                    afi: AFI::IPV6,
                    safi: SAFI::Unicast,
                    next_hop,
                    announced_routes: vec![v6_prefix(vec![0x20, 0x01, 0x0d, 0xb8, 0, 1], 48)],
                }),
                PathAttribute::MP_UNREACH_NLRI(MPUnreachNLRI {
                    afi: AFI::IPV6,
                    safi: SAFI::Unicast,
                    withdrawn_routes: vec![v6_prefix(vec![0x20, 0x01, 0x0d, 0xb8, 0, 2], 48)],
                }),
            ],
            announced_routes: vec![],
        };
        let events = parse_update(&update);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            RouteEvent::Withdraw {
                family: Family::ipv6_unicast(),
                destination: "2001:db8:2::/48".parse().unwrap(),
            }
        );
        match &events[1] {
            RouteEvent::Announce {
                family,
                destination,
                attributes,
            } => {
                assert_eq!(*family, Family::ipv6_unicast());
                assert_eq!(*destination, "2001:db8:1::/48".parse::<IpNetwork>().unwrap());
                assert_eq!(attributes.next_hop, Some("2001:db8::1".parse().unwrap()));
                assert_eq!(attributes.origin, Origin::Egp);
            }
            RouteEvent::Withdraw { .. } => panic!("expected announcement"),
        }
    }

    #[test]
    fn test_mp_next_hop_lengths() {
        assert_eq!(mp_next_hop(&[]), None);
        assert_eq!(
            mp_next_hop(&[10, 0, 0, 1]),
            Some("10.0.0.1".parse().unwrap())
        );
        assert_eq!(mp_next_hop(&[1, 2, 3]), None);
    }
}
