use std::net::Ipv4Addr;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::*;

pub const EMPTY_VALUE: &str = "";

/// Convert an ASN (4 byte) as dotted if it exceeds the 2-byte limit
/// E.g. 4259840100 -> "65000.100"
pub fn u32_to_dotted(asn: u32, sep: char) -> String {
    if asn < std::u16::MAX as u32 {
        format!("{}", asn)
    } else {
        let bytes = transform_u32_to_bytes(asn);
        format!(
            "{}{}{}",
            as_u16_be([bytes[0], bytes[1]]),
            sep,
            as_u16_be([bytes[2], bytes[3]])
        )
    }
}

pub fn asn_to_dotted(asn: u32) -> String {
    u32_to_dotted(asn, '.')
}

pub fn ext_community_to_display(value: u64) -> String {
    let c_type: u16 = ((value >> 48) & 0xff) as u16;
    match c_type {
        // 2-octet AS Specific Extended Community (RFC 4360)
        0x0 => {
            let asn: u16 = ((value >> 32) & 0xffff) as u16;
            let community: u32 = (value & 0xffff_ffff) as u32;
            format!("{}:{}", asn, asn_to_dotted(community))
        }
        // IPv4 Address Specific Extended Community (RFC 4360)
        0x1 => {
            let addr: u32 = ((value >> 16) & 0xffff_ffff) as u32;
            let local: u16 = (value & 0xffff) as u16;
            format!("{}:{}", Ipv4Addr::from(addr), local)
        }
        // 4-octet AS Specific BGP Extended Community (RFC 5668)
        0x2 => {
            let asn: u16 = ((value >> 32) & 0xffff) as u16;
            let addr: u32 = (value & 0xffff_ffff) as u32;
            format!("target:{}:{}", asn, Ipv4Addr::from(addr))
        }
        // Opaque Extended Community (RFC 4360)
        0x3 => format!("opaque:{}", value),
        // Flow-Spec Redirect community
        0x8 => {
            let asn: u16 = ((value >> 32) & 0xffff) as u16;
            let number: u32 = (value & 0xffff_ffff) as u32;
            format!("redirect:{}:{}", asn, asn_to_dotted(number))
        }
        _ => format!("unknown:{}:{}", c_type, value),
    }
}

pub fn maybe_string<T>(item: Option<&T>) -> String
where
    T: ToString,
{
    item.map(std::string::ToString::to_string)
        .unwrap_or_else(|| String::from(EMPTY_VALUE))
}

fn fit_with_remainder(dividend: u64, divisor: u64) -> (u64, u64) {
    let fit = dividend / divisor;
    let remainder = dividend % divisor;
    (fit, remainder)
}

pub fn get_elapsed_time<Tz>(time: DateTime<Tz>) -> Duration
where
    Tz: TimeZone,
{
    Utc::now().signed_duration_since(time)
}

/// Given a duration, format like "00:00:00"
pub fn format_elapsed_time(elapsed: Duration) -> String {
    let elapsed = elapsed.num_seconds().unsigned_abs();
    let (hours, remainder) = fit_with_remainder(elapsed, 3600);
    let (minutes, seconds) = fit_with_remainder(remainder, 60);
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Given a timestamp, get the elapsed time and return formatted string
pub fn format_time_as_elapsed<Tz>(time: DateTime<Tz>) -> String
where
    Tz: TimeZone,
{
    format_elapsed_time(get_elapsed_time(time))
}
