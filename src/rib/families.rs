use std::collections::HashSet;
use std::convert::{From, TryFrom};
use std::fmt;

use bgp_rs::{AFI, SAFI};
use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Family {
    pub afi: AFI,
    pub safi: SAFI,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.afi, self.safi)
    }
}

impl Family {
    pub fn new(afi: AFI, safi: SAFI) -> Self {
        Self { afi, safi }
    }

    pub fn ipv4_unicast() -> Self {
        Self::new(AFI::IPV4, SAFI::Unicast)
    }

    pub fn ipv6_unicast() -> Self {
        Self::new(AFI::IPV6, SAFI::Unicast)
    }
}

impl From<&Family> for (AFI, SAFI) {
    fn from(family: &Family) -> (AFI, SAFI) {
        (family.afi, family.safi)
    }
}

impl TryFrom<(u16, u8)> for Family {
    type Error = std::io::Error;

    fn try_from(v: (u16, u8)) -> Result<Self, Self::Error> {
        Ok(Self::new(AFI::try_from(v.0)?, SAFI::try_from(v.1)?))
    }
}

impl Serialize for Family {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Family {
    fn deserialize<D>(deserializer: D) -> Result<Family, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let parts: Vec<&str> = s.trim().split_whitespace().collect();
        if parts.len() != 2 {
            return Err(serde::de::Error::custom(format!(
                "Incorrect family format: '{}'",
                s
            )));
        }
        let afi = match parts[0] {
            "ipv4" => AFI::IPV4,
            "ipv6" => AFI::IPV6,
            family => {
                return Err(serde::de::Error::custom(format!(
                    "Unsupported AFI: '{}'",
                    family
                )))
            }
        };
        let safi = match parts[1] {
            "unicast" => SAFI::Unicast,
            sfamily => {
                return Err(serde::de::Error::custom(format!(
                    "Unsupported SAFI: '{}'",
                    sfamily
                )))
            }
        };
        Ok(Family::new(afi, safi))
    }
}

/// Families a peer exchanges routes for
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Families(HashSet<Family>);

impl Families {
    pub fn new(families: Vec<Family>) -> Self {
        Self(families.into_iter().collect())
    }

    pub fn contains(&self, family: Family) -> bool {
        self.0.contains(&family)
    }

    pub fn iter(&self) -> std::collections::hash_set::Iter<Family> {
        self.0.iter()
    }
}

impl From<&[Family]> for Families {
    fn from(families: &[Family]) -> Self {
        Self::new(families.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::value::{Error, StrDeserializer};
    use serde::de::IntoDeserializer;

    #[test]
    fn test_display_family() {
        assert_eq!(&Family::ipv4_unicast().to_string(), "IPv4 Unicast");
        assert_eq!(&Family::ipv6_unicast().to_string(), "IPv6 Unicast");
    }

    #[test]
    fn test_deserialize_family() {
        let deserializer: StrDeserializer<Error> = "ipv6 unicast".into_deserializer();
        let family = Family::deserialize(deserializer).unwrap();
        assert_eq!(family, Family::ipv6_unicast());

        let deserializer: StrDeserializer<Error> = "ipv4 flow".into_deserializer();
        assert!(Family::deserialize(deserializer).is_err());
    }
}
