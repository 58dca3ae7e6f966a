use std::convert::TryFrom;
use std::net::IpAddr;

use bgp_rs::{AFI, SAFI};
use ipnetwork::IpNetwork;

use crate::config::RouteSpec;
use crate::error::{Result, RibError};
use crate::rib::{AsPath, Community, CommunityList, Family, Origin, PathAttributes};

/// Convert an ASN string to a u32
/// E.g. "65000.100" -> 4259840100
pub fn asn_from_dotted(value: &str) -> Result<u32> {
    // Parse to list of u32, since we should support 4 byte ASN as a single int
    // (E.g. "4259840100")
    let mut chunks = [0; 2];
    let check_for_overflow = value.contains('.');
    // Iterate through chunks in reverse, so if there's no dot (only one number),
    // it will be in the least significant position
    for (i, chunk) in value
        .splitn(2, '.')
        .collect::<Vec<&str>>()
        .into_iter()
        .rev()
        .enumerate()
    {
        let chunk: u32 = chunk
            .parse()
            .map_err(|err| RibError::config(format!("{} '{}'", err, value)))?;
        if check_for_overflow && chunk > std::u16::MAX as u32 {
            return Err(RibError::config(format!("Unsupported ASN '{}'", value)));
        }
        chunks[i] = chunk;
    }
    Ok((chunks[1] << 16) + chunks[0])
}

pub fn origin_from_str(value: &str) -> Result<Origin> {
    match value.to_lowercase().as_str() {
        "igp" | "i" => Ok(Origin::Igp),
        "egp" | "e" => Ok(Origin::Egp),
        "incomplete" | "?" => Ok(Origin::Incomplete),
        _ => Err(RibError::config(format!("Invalid origin '{}'", value))),
    }
}

/// Unicast family for a prefix
pub fn family_of(prefix: &IpNetwork) -> Family {
    match prefix {
        IpNetwork::V4(_) => Family::new(AFI::IPV4, SAFI::Unicast),
        IpNetwork::V6(_) => Family::new(AFI::IPV6, SAFI::Unicast),
    }
}

/// Convert a configured static route into the family, prefix and attributes
/// it is announced with
pub fn parse_route_spec(spec: &RouteSpec) -> Result<(Family, IpNetwork, PathAttributes)> {
    let origin = spec
        .origin
        .as_deref()
        .map(origin_from_str)
        .transpose()?
        .unwrap_or_default();
    let as_path = spec
        .as_path
        .iter()
        .map(|asn| asn_from_dotted(asn))
        .collect::<Result<Vec<u32>>>()?;
    let communities = spec
        .communities
        .iter()
        .map(|c| Community::try_from(c.as_str()))
        .collect::<Result<Vec<Community>>>()?;
    match (spec.prefix.ip(), spec.next_hop) {
        (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => (),
        _ => {
            return Err(RibError::config(format!(
                "Next hop {} does not match family of {}",
                spec.next_hop, spec.prefix
            )))
        }
    }
    let attributes = PathAttributes {
        origin,
        as_path: AsPath::from_sequence(as_path),
        next_hop: Some(spec.next_hop),
        multi_exit_disc: spec.med,
        local_pref: spec.local_pref,
        communities: CommunityList(communities),
        ..Default::default()
    };
    Ok((family_of(&spec.prefix), spec.prefix, attributes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asn_from_dotted() {
        assert_eq!(asn_from_dotted("100").unwrap(), 100);
        assert_eq!(asn_from_dotted("65000.100").unwrap(), 4259840100);
        assert_eq!(asn_from_dotted("4259840100").unwrap(), 4259840100);
        assert!(asn_from_dotted("65536.100").is_err());
        assert!(asn_from_dotted("test").is_err());
    }

    #[test]
    fn test_parse_route_spec() {
        let spec: RouteSpec = toml::from_str(
            r#"
            prefix = "10.10.0.0/24"
            next_hop = "172.16.0.1"
            origin = "igp"
            as_path = ["100", "65000.100"]
            local_pref = 200
            communities = ["65000:10", "65535:6"]
            "#,
        )
        .unwrap();
        let (family, prefix, attrs) = parse_route_spec(&spec).unwrap();
        assert_eq!(family, Family::new(AFI::IPV4, SAFI::Unicast));
        assert_eq!(prefix.to_string(), "10.10.0.0/24");
        assert_eq!(attrs.origin, Origin::Igp);
        assert_eq!(attrs.as_path, AsPath::from_sequence(vec![100, 4259840100]));
        assert_eq!(attrs.local_pref, Some(200));
        assert_eq!(attrs.multi_exit_disc, None);
        assert!(attrs.is_llgr_stale());
    }

    #[test]
    fn test_parse_route_spec_mismatched_next_hop() {
        let spec: RouteSpec = toml::from_str(
            r#"
            prefix = "3001:10::/64"
            next_hop = "172.16.0.1"
            "#,
        )
        .unwrap();
        assert!(parse_route_spec(&spec).is_err());
    }
}
