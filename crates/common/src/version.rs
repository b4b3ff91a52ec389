//! Heuristic base-image tag comparison
//!
//! Tags such as `8.10-1766090767` are compared by their runs of decimal digits.
//! This is not semantic versioning: malformed tags never fail, they only make
//! the distance undeterminable.

/// Outcome of comparing a running tag against the latest tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionComparison {
    /// Current tag is at or above the latest tag
    pub meets_or_exceeds: bool,
    /// Approximate number of versions behind, `None` when tags have no digits
    pub distance: Option<u64>,
}

impl VersionComparison {
    const CURRENT: Self = Self {
        meets_or_exceeds: true,
        distance: Some(0),
    };

    const UNDETERMINABLE: Self = Self {
        meets_or_exceeds: false,
        distance: None,
    };

    fn behind(distance: u64) -> Self {
        Self {
            meets_or_exceeds: false,
            distance: Some(distance),
        }
    }
}

/// Every maximal run of decimal digits in `tag`, in order
///
/// Returns `None` when the tag contains no digits. Runs too large for `u64`
/// saturate.
pub fn parse_version(tag: &str) -> Option<Vec<u64>> {
    let parts: Vec<u64> = tag
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .map(|run| run.parse::<u64>().unwrap_or(u64::MAX))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Compare `current` against `latest`
pub fn compare_versions(current: &str, latest: &str) -> VersionComparison {
    if current == latest {
        return VersionComparison::CURRENT;
    }

    let (Some(current), Some(latest)) = (parse_version(current), parse_version(latest)) else {
        return VersionComparison::UNDETERMINABLE;
    };

    if current >= latest {
        return VersionComparison::CURRENT;
    }

    // First component that lags behind decides the distance. A strict prefix
    // (e.g. "8.10" against "8.10-2") lags by one.
    let distance = current
        .iter()
        .zip(latest.iter())
        .find(|(cur, lat)| cur < lat)
        .map(|(cur, lat)| lat - cur)
        .unwrap_or(1);

    VersionComparison::behind(distance)
}
