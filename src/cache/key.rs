//! Cache key derivation
//!
//! Overpass keys are built from the query text itself so that two clients
//! asking the same question around the same cell share one entry:
//!
//! ```text
//! overpass:<lat3>:<lon3>:r<radius>:<sorted,deduped,tags>
//! ```
//!
//! The radius is part of the key. Without it, a shrink-and-retry would be
//! answered with the cached pre-shrink (truncated) body.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::hints::grid::round3;

static AROUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"around\s*:\s*(\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)")
        .expect("static regex")
});

/// Any quoted tag filter: `["k"]`, `["k"="v"]`, `["k"~"re",i]`, `[!"k"]`, ...
/// Quoted text may contain `]`.
static FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[\s*[!~]?\s*"(?:[^"\\]|\\.)*"(?:[^\]"]|"(?:[^"\\]|\\.)*")*\]"#)
        .expect("static regex")
});

static SIMPLE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\["([^"]+)"(?:="([^"]*)")?\]$"#).expect("static regex")
});

/// Derive the cache key for an Overpass QL query.
///
/// Returns `None` when the query has no `around:` clause; such queries are
/// passed through to the upstream every time and never cached.
pub fn overpass_cache_key(query: &str) -> Option<String> {
    let caps = AROUND_RE.captures(query)?;
    let radius: f64 = caps[1].parse().ok()?;
    let lat: f64 = caps[2].parse().ok()?;
    let lon: f64 = caps[3].parse().ok()?;

    let tags: BTreeSet<String> = FILTER_RE
        .find_iter(query)
        .map(|m| tag_component(m.as_str()))
        .collect();
    let tags: Vec<String> = tags.into_iter().collect();

    Some(format!(
        "overpass:{:.3}:{:.3}:r{}:{}",
        round3(lat),
        round3(lon),
        radius.round() as u64,
        tags.join(",")
    ))
}

/// `k` or `k=v` for plain filters; regex, negated and case-insensitive
/// filters keep their whitespace-stripped source text.
fn tag_component(filter: &str) -> String {
    let normalized = strip_unquoted_whitespace(filter);
    match SIMPLE_TAG_RE.captures(&normalized) {
        Some(c) => match c.get(2) {
            Some(value) => format!("{}={}", &c[1], value.as_str()),
            None => c[1].to_string(),
        },
        None => normalized,
    }
}

fn strip_unquoted_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quoted = false;
    let mut escaped = false;
    for ch in text.chars() {
        if quoted {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                quoted = false;
            }
        } else if ch == '"' {
            quoted = true;
            out.push(ch);
        } else if !ch.is_whitespace() {
            out.push(ch);
        }
    }
    out
}

/// Key for an aircraft bounding-box query
pub fn aircraft_bbox_key(south: f64, west: f64, north: f64, east: f64) -> String {
    format!(
        "opensky:bbox:{:.3}:{:.3}:{:.3}:{:.3}",
        round3(south),
        round3(west),
        round3(north),
        round3(east)
    )
}

/// Key for a single-aircraft query
pub fn aircraft_icao_key(icao24: &str) -> String {
    format!("opensky:icao24:{}", icao24.trim().to_ascii_lowercase())
}
