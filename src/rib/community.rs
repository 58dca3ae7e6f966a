use std::convert::TryFrom;
use std::fmt;
use std::slice::Iter;

use serde::Serialize;

use crate::error::RibError;
use crate::utils::{ext_community_to_display, u32_to_dotted};

/// Well-known LLGR_STALE community (65535:6, RFC9494)
pub const LLGR_STALE: u32 = 0xffff_0006;

#[derive(Serialize, Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Community {
    STANDARD(u32),
    EXTENDED(u64),
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Community::STANDARD(value) => write!(f, "{}", u32_to_dotted(*value, ':')),
            Community::EXTENDED(value) => write!(f, "{}", ext_community_to_display(*value)),
        }
    }
}

impl TryFrom<&str> for Community {
    type Error = RibError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let invalid = || RibError::config(format!("Invalid community '{}'", value));
        // A single number is accepted as the full 4 byte value
        // (E.g. "4259840100")
        let chunks: Vec<_> = value.split(':').collect();
        match chunks.len() {
            1 => chunks[0]
                .parse()
                .map(Community::STANDARD)
                .map_err(|_| invalid()),
            2 => {
                let high = chunks[0].parse::<u16>().map_err(|_| invalid())?;
                let low = chunks[1].parse::<u16>().map_err(|_| invalid())?;
                Ok(Community::STANDARD((u32::from(high) << 16) + u32::from(low)))
            }
            _ => Err(invalid()),
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, Eq, Hash, PartialEq)]
pub struct CommunityList(pub Vec<Community>);

impl CommunityList {
    pub fn iter(&self) -> Iter<Community> {
        self.0.iter()
    }

    pub fn standard(&self) -> Vec<u32> {
        self.0
            .iter()
            .filter_map(|c| {
                if let Community::STANDARD(comm) = c {
                    Some(*comm)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn extended(&self) -> Vec<u64> {
        self.0
            .iter()
            .filter_map(|c| {
                if let Community::EXTENDED(comm) = c {
                    Some(*comm)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn is_llgr_stale(&self) -> bool {
        self.0.contains(&Community::STANDARD(LLGR_STALE))
    }
}

impl fmt::Display for CommunityList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let communities = self
            .0
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<String>>()
            .join(" ");
        write!(f, "{}", communities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_community_list_display() {
        assert_eq!(
            CommunityList(vec![Community::STANDARD(100), Community::STANDARD(200)]).to_string(),
            "100 200"
        );
        assert_eq!(
            CommunityList(vec![
                Community::EXTENDED(279172874240100),
                Community::STANDARD(200)
            ])
            .to_string(),
            "65000:100 200"
        );
    }

    #[test]
    fn test_parse_community() {
        assert_eq!(
            Community::try_from("65535:6").unwrap(),
            Community::STANDARD(LLGR_STALE)
        );
        assert_eq!(Community::try_from("100").unwrap(), Community::STANDARD(100));
        assert!(Community::try_from("70000:1").is_err());
        assert!(Community::try_from("target:1:2").is_err());
        assert!(Community::try_from("abc").is_err());
    }

    #[test]
    fn test_llgr_stale() {
        assert!(CommunityList(vec![Community::STANDARD(LLGR_STALE)]).is_llgr_stale());
        assert!(!CommunityList(vec![Community::STANDARD(100)]).is_llgr_stale());
        assert!(!CommunityList::default().is_llgr_stale());
    }
}
