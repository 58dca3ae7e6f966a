use std::convert::TryFrom;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{self, Deserialize, Deserializer};

/// BGP Identifier of a peer (or of this speaker)
///
/// Ordered as an unsigned 32-bit integer, which is the same order as the
/// dotted-quad address read big-endian. Offset maps rely on this order.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RouterId(u32);

impl RouterId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for RouterId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<Ipv4Addr> for RouterId {
    fn from(addr: Ipv4Addr) -> Self {
        Self(u32::from(addr))
    }
}

impl From<RouterId> for Ipv4Addr {
    fn from(id: RouterId) -> Self {
        Ipv4Addr::from(id.0)
    }
}

/// Only IPv4 addresses map onto a BGP Identifier
impl TryFrom<IpAddr> for RouterId {
    type Error = IpAddr;

    fn try_from(addr: IpAddr) -> Result<Self, Self::Error> {
        match addr {
            IpAddr::V4(v4) => Ok(v4.into()),
            IpAddr::V6(_) => Err(addr),
        }
    }
}

impl FromStr for RouterId {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<Ipv4Addr>().map(RouterId::from)
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", Ipv4Addr::from(self.0))
    }
}

impl<'de> Deserialize<'de> for RouterId {
    fn deserialize<D>(deserializer: D) -> Result<RouterId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            serde::de::Error::custom(format!("Invalid router id (expected dotted quad): '{}'", s))
        })
    }
}

/// Route reflector cluster identifier (RFC4456)
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ClusterId(u32);

impl ClusterId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl From<RouterId> for ClusterId {
    fn from(id: RouterId) -> Self {
        Self(id.0)
    }
}

impl From<Ipv4Addr> for ClusterId {
    fn from(addr: Ipv4Addr) -> Self {
        Self(u32::from(addr))
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", Ipv4Addr::from(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_id_order_is_unsigned() {
        let low: RouterId = "1.1.1.1".parse().unwrap();
        let high: RouterId = "200.0.0.1".parse().unwrap();
        assert!(low < high);
        // Would be negative as a signed i32
        assert_eq!(high.value(), 0xc800_0001);
    }

    #[test]
    fn test_router_id_display() {
        assert_eq!(RouterId::from(16843009).to_string(), "1.1.1.1");
        assert_eq!(ClusterId::new(0x0a00_0001).to_string(), "10.0.0.1");
    }

    #[test]
    fn test_router_id_from_ip() {
        let v4: IpAddr = "10.1.1.1".parse().unwrap();
        assert_eq!(RouterId::try_from(v4).unwrap().to_string(), "10.1.1.1");
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(RouterId::try_from(v6).is_err());
    }
}
