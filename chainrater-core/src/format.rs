//! Human readable renderings of amounts, addresses and durations.

use ethers_core::{
    types::{Address, U256},
    utils::{format_ether, to_checksum},
};

pub const SECONDS_IN_MINUTE: u64 = 60;
pub const SECONDS_IN_HOUR: u64 = SECONDS_IN_MINUTE * 60;
pub const SECONDS_IN_DAY: u64 = SECONDS_IN_HOUR * 24;
pub const SECONDS_IN_WEEK: u64 = SECONDS_IN_DAY * 7;
pub const SECONDS_IN_YEAR: u64 = SECONDS_IN_DAY * 365;

/// The shortest stake duration the client will submit.
pub const MIN_DURATION_SECONDS: u64 = SECONDS_IN_WEEK;

/// Render wei as ETH without trailing zeros, e.g. `1.5 ETH` or `2 ETH`.
pub fn format_eth(wei: impl Into<U256>) -> String {
    let formatted = format_ether(wei.into());
    match formatted.split_once('.') {
        Some((whole, decimals)) => {
            let decimals = decimals.trim_end_matches('0');
            if decimals.is_empty() {
                format!("{whole} ETH")
            } else {
                format!("{whole}.{decimals} ETH")
            }
        }
        None => format!("{formatted} ETH"),
    }
}

/// `0x1234...abcd`
pub fn shorten_address(address: &Address) -> String {
    let full = to_checksum(address, None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

fn plural(n: u64, unit: &str) -> String {
    format!("{n} {unit}{}", if n == 1 { "" } else { "s" })
}

/// The coarsest sensible unit for an elapsed span, as in "3 days".
fn coarse_span(seconds: u64) -> String {
    let minutes = seconds / SECONDS_IN_MINUTE;
    let hours = seconds / SECONDS_IN_HOUR;
    let days = seconds / SECONDS_IN_DAY;

    if days > 30 {
        plural(days / 30, "month")
    } else if days > 0 {
        plural(days, "day")
    } else if hours > 0 {
        plural(hours, "hour")
    } else if minutes > 0 {
        plural(minutes, "minute")
    } else {
        plural(seconds, "second")
    }
}

pub fn format_time_remaining(expiration: u64, now: u64) -> String {
    if expiration <= now {
        return "Expired".to_string();
    }
    coarse_span(expiration - now)
}

pub fn format_time_ago(then: u64, now: u64) -> String {
    if then >= now {
        return "Just now".to_string();
    }
    format!("{} ago", coarse_span(now - then))
}

/// Round a duration to its nearest natural unit, as in "2 weeks".
pub fn format_duration(seconds: u64) -> String {
    let round = |unit: u64| (seconds + unit / 2) / unit;
    if seconds < SECONDS_IN_MINUTE {
        plural(seconds, "second")
    } else if seconds < SECONDS_IN_HOUR {
        plural(round(SECONDS_IN_MINUTE), "minute")
    } else if seconds < SECONDS_IN_DAY {
        plural(round(SECONDS_IN_HOUR), "hour")
    } else if seconds < SECONDS_IN_WEEK {
        plural(round(SECONDS_IN_DAY), "day")
    } else if seconds < SECONDS_IN_YEAR {
        plural(round(SECONDS_IN_WEEK), "week")
    } else {
        plural(round(SECONDS_IN_YEAR), "year")
    }
}

/// An RFC 3339 rendering of a unix timestamp, or the raw number if it is out of range.
pub fn format_timestamp(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| chrono::DateTime::<chrono::Utc>::from_timestamp(s, 0))
        .map_or_else(|| seconds.to_string(), |t| t.to_rfc3339())
}
