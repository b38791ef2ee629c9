//! Text rendering for access log entries.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use thiserror::Error;

pub const DEBUG_PREFIX: &str = "[GIN-DEBUG]";

const NANOS_PER_SEC: u64 = 1_000_000_000;

#[derive(Debug, Error)]
pub enum CompactError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Renders the one-line request summary, newline included.
///
/// `[GIN] <client ip, 15 wide> [<UTC end time>] <status, 3 wide> <method> <path> <latency, 13 wide>`
pub fn summary_line(
    client_ip: &str,
    end: DateTime<Utc>,
    status: u16,
    method: &str,
    path: &str,
    latency: Duration,
) -> String {
    format!(
        "[GIN] {:<15} [{}] {:>3} {} {} {:>13}\n",
        client_ip,
        end.format("%Y/%m/%d %H:%M:%S"),
        status,
        method,
        path,
        human_duration(latency),
    )
}

/// Formats a duration the way latencies show up in the access log:
/// `0s`, `750ns`, `1.5µs`, `15.2ms`, `1.3s`, `2m5s`, `1h0m0s`.
///
/// The fraction carries full precision with trailing zeros dropped.
pub fn human_duration(d: Duration) -> String {
    let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < NANOS_PER_SEC {
        let (prec, unit) = match nanos {
            n if n < 1_000 => (0, "ns"),
            n if n < 1_000_000 => (3, "µs"),
            _ => (6, "ms"),
        };
        let (whole, frac) = split_fraction(nanos, prec);
        return format!("{}{}{}", whole, frac, unit);
    }

    let (secs, frac) = split_fraction(nanos, 9);
    let (hours, mins, secs) = (secs / 3600, (secs / 60) % 60, secs % 60);

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{}h{}m", hours, mins);
    } else if mins > 0 {
        let _ = write!(out, "{}m", mins);
    }
    let _ = write!(out, "{}{}s", secs, frac);
    out
}

/// Splits `v` into its integer part and a `.ddd` suffix with `prec` decimal
/// places; the suffix is empty when the fraction is zero.
fn split_fraction(v: u64, prec: u32) -> (u64, String) {
    if prec == 0 {
        return (v, String::new());
    }
    let pow = 10u64.pow(prec);
    let frac = v % pow;
    if frac == 0 {
        return (v / pow, String::new());
    }
    let digits = format!("{:0width$}", frac, width = prec as usize);
    (v / pow, format!(".{}", digits.trim_end_matches('0')))
}

/// Removes insignificant whitespace from a JSON document.
///
/// The input is validated first; on success every byte except whitespace
/// outside string literals is kept as is, so key order, number spelling and
/// escapes survive unchanged.
///
/// Validation uses `serde_json` with its default recursion limit, so
/// documents nested deeper than 128 arrays or objects are rejected and end up
/// in the log as they were sent.
pub fn compact_json(src: &[u8]) -> Result<Vec<u8>, CompactError> {
    serde_json::from_slice::<IgnoredAny>(src)?;

    let mut out = Vec::with_capacity(src.len());
    let mut in_string = false;
    let mut escaped = false;
    for &b in src {
        if in_string {
            out.push(b);
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b' ' | b'\t' | b'\n' | b'\r' => {}
            b'"' => {
                in_string = true;
                out.push(b);
            }
            _ => out.push(b),
        }
    }
    Ok(out)
}
