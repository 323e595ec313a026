//! Version algebra over (date, stability).
//!
//! A [`Version`] identifies one dated snapshot of a resource, or an
//! effective query against the system. Versions are totally ordered by date
//! first, then [`Stability`]. Resolution follows the stability ladder: a
//! query matches the latest version whose date is not in the future of the
//! query and whose stability is at least the requested one.
//!
//! # Example
//!
//! ```rust
//! use vervet::version::{Stability, Version};
//!
//! let v: Version = "2021-06-13~beta".parse().unwrap();
//! assert_eq!(v.stability, Stability::Beta);
//! assert_eq!(v.to_string(), "2021-06-13~beta");
//!
//! // The ~ga suffix is elided in canonical form.
//! let ga: Version = "2021-06-07".parse().unwrap();
//! assert_eq!(ga.to_string(), "2021-06-07");
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Days a deprecated GA version remains available before it is sunset.
pub const SUNSET_AFTER_DAYS: i64 = 181;

/// Date format used throughout the version calendar.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Grammar accepted for version query strings at the API boundary:
/// either a bare stability token or a calendar date, optionally followed by
/// `~<stability>`.
static VERSION_QUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(wip|work-in-progress|experimental|beta|([0-9]{4}-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])))(~(wip|work-in-progress|experimental|beta|ga))?$",
    )
    .expect("version query grammar must compile")
});

/// Release stability level, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stability {
    /// Work in progress; never served to consumers outside `wip` queries.
    Wip,
    /// Experimental release.
    Experimental,
    /// Beta release.
    Beta,
    /// Generally available. The default when unspecified.
    #[default]
    Ga,
}

impl Stability {
    /// All stabilities, weakest first.
    pub const ALL: [Stability; 4] = [
        Stability::Wip,
        Stability::Experimental,
        Stability::Beta,
        Stability::Ga,
    ];

    /// The token used in canonical version strings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wip => "wip",
            Self::Experimental => "experimental",
            Self::Beta => "beta",
            Self::Ga => "ga",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wip" | "work-in-progress" => Ok(Self::Wip),
            "experimental" => Ok(Self::Experimental),
            "beta" => Ok(Self::Beta),
            "ga" => Ok(Self::Ga),
            other => Err(Error::version_parse(
                other,
                format!("unknown stability '{other}'"),
            )),
        }
    }
}

/// Lifecycle of a version relative to a wall-clock date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// The version date is in the future.
    Unreleased,
    /// Currently effective.
    Released,
    /// Superseded by a newer release of equal or stronger stability.
    Deprecated,
    /// Deprecated by a GA release more than [`SUNSET_AFTER_DAYS`] ago.
    Sunset,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unreleased => "unreleased",
            Self::Released => "released",
            Self::Deprecated => "deprecated",
            Self::Sunset => "sunset",
        };
        f.write_str(s)
    }
}

/// A version is the pair (calendar date, stability).
///
/// The derived ordering is total: date ascending, then stability ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Calendar day in UTC.
    pub date: NaiveDate,
    /// Stability level of this snapshot.
    pub stability: Stability,
}

impl Version {
    /// Create a version from parts.
    #[must_use]
    pub fn new(date: NaiveDate, stability: Stability) -> Self {
        Self { date, stability }
    }

    /// Canonical string form. The `~ga` suffix is elided.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Parse a version query string, which unlike [`Version::from_str`] also
    /// accepts a bare stability token (`beta`, `experimental`, ...) meaning
    /// "the latest at that stability", anchored to `today`.
    pub fn parse_query(s: &str, today: NaiveDate) -> Result<Self> {
        if !VERSION_QUERY_RE.is_match(s) {
            return Err(Error::version_parse(s, "not a valid version query"));
        }
        if let Ok(stability) = s.parse::<Stability>() {
            return Ok(Self::new(today, stability));
        }
        s.parse()
    }

    /// The earliest candidate that deprecates this version, if any.
    ///
    /// A version is deprecated by a later version of equal or stronger
    /// stability. `wip` and `experimental` versions never age out.
    #[must_use]
    pub fn deprecated_by(&self, candidates: &[Version]) -> Option<Version> {
        if matches!(self.stability, Stability::Wip | Stability::Experimental) {
            return None;
        }
        candidates
            .iter()
            .filter(|c| c.date > self.date && c.stability >= self.stability)
            .min()
            .copied()
    }

    /// Lifecycle of this version at `now`, given the version that deprecates
    /// it (from [`Version::deprecated_by`]) when one exists.
    ///
    /// Sunset is reached only through deprecation by a GA release, once more
    /// than [`SUNSET_AFTER_DAYS`] days have passed since that release.
    #[must_use]
    pub fn lifecycle_at(&self, now: NaiveDate, deprecated_by: Option<&Version>) -> Lifecycle {
        if self.date > now {
            return Lifecycle::Unreleased;
        }
        match deprecated_by {
            Some(d) if d.date <= now => {
                if d.stability == Stability::Ga
                    && now - d.date > Duration::days(SUNSET_AFTER_DAYS)
                {
                    Lifecycle::Sunset
                } else {
                    Lifecycle::Deprecated
                }
            }
            _ => Lifecycle::Released,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format(DATE_FORMAT))?;
        if self.stability != Stability::Ga {
            write!(f, "~{}", self.stability)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Grammar: `YYYY-MM-DD` optionally followed by `~<stability>`.
    /// Leading or trailing whitespace is rejected.
    fn from_str(s: &str) -> Result<Self> {
        if s != s.trim() {
            return Err(Error::version_parse(s, "surrounding whitespace"));
        }
        let (date_part, stability) = match s.split_once('~') {
            Some((d, stab)) => (d, stab.parse::<Stability>()?),
            None => (s, Stability::Ga),
        };
        let date = NaiveDate::parse_from_str(date_part, DATE_FORMAT)
            .map_err(|e| Error::version_parse(s, format!("invalid date '{date_part}': {e}")))?;
        // chrono accepts some non-padded forms; require the canonical one
        if date.format(DATE_FORMAT).to_string() != date_part {
            return Err(Error::version_parse(
                s,
                format!("date '{date_part}' is not in YYYY-MM-DD form"),
            ));
        }
        Ok(Self::new(date, stability))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Resolve the version effective for `query` among `available`.
///
/// Candidates are versions with `date <= query.date` and
/// `stability >= query.stability`; the chosen version is the maximum date
/// among them, ties broken by highest stability. Returns the
/// [`Error::NoMatchingVersion`] sentinel when nothing matches, so callers can
/// iterate stability ladders.
pub fn resolve(available: &[Version], query: Version) -> Result<Version> {
    available
        .iter()
        .filter(|v| v.date <= query.date && v.stability >= query.stability)
        .max()
        .copied()
        .ok_or(Error::NoMatchingVersion)
}

/// Sort and de-duplicate a set of versions in place.
pub fn sort_dedup(versions: &mut Vec<Version>) {
    versions.sort();
    versions.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test_case("2021-06-01", Stability::Ga; "bare date is ga")]
    #[test_case("2021-06-01~ga", Stability::Ga; "explicit ga")]
    #[test_case("2021-06-01~beta", Stability::Beta; "beta")]
    #[test_case("2021-06-01~experimental", Stability::Experimental; "experimental")]
    #[test_case("2021-06-01~wip", Stability::Wip; "wip")]
    #[test_case("2021-06-01~work-in-progress", Stability::Wip; "wip alias")]
    fn parse_stability(s: &str, expect: Stability) {
        assert_eq!(v(s).stability, expect);
    }

    #[test_case(""; "empty")]
    #[test_case("2021-6-1"; "unpadded date")]
    #[test_case("2021-13-01"; "month out of range")]
    #[test_case("2021-06-32"; "day out of range")]
    #[test_case("2021-06-01~alpha"; "unknown stability")]
    #[test_case(" 2021-06-01"; "leading whitespace")]
    #[test_case("2021-06-01 "; "trailing whitespace")]
    #[test_case("20210601"; "no dashes")]
    fn parse_rejects(s: &str) {
        assert!(s.parse::<Version>().is_err(), "{s:?} should not parse");
    }

    #[test]
    fn canonical_round_trip() {
        for s in [
            "2021-06-01",
            "2021-06-01~beta",
            "2021-06-01~experimental",
            "2021-06-01~wip",
        ] {
            let version = v(s);
            assert_eq!(version.canonical(), s);
            assert_eq!(version.canonical().parse::<Version>().unwrap(), version);
        }
        // the alias canonicalizes to the short token
        assert_eq!(v("2021-06-01~work-in-progress").canonical(), "2021-06-01~wip");
    }

    #[test]
    fn order_is_date_then_stability() {
        let mut versions = vec![
            v("2021-06-07"),
            v("2021-06-01~wip"),
            v("2021-06-01"),
            v("2021-06-01~beta"),
        ];
        versions.sort();
        assert_eq!(
            versions,
            vec![
                v("2021-06-01~wip"),
                v("2021-06-01~beta"),
                v("2021-06-01"),
                v("2021-06-07"),
            ]
        );
    }

    #[test]
    fn stability_ladder_is_ordered_weakest_first() {
        let mut ladder = Stability::ALL;
        ladder.sort();
        assert_eq!(ladder, Stability::ALL);
        assert!(Stability::Wip < Stability::Experimental);
        assert!(Stability::Experimental < Stability::Beta);
        assert!(Stability::Beta < Stability::Ga);
    }

    #[test]
    fn compare_is_antisymmetric() {
        let vs = [v("2021-06-01"), v("2021-06-01~beta"), v("2021-06-07")];
        for a in &vs {
            for b in &vs {
                assert_eq!(a.cmp(b), b.cmp(a).reverse());
            }
        }
    }

    #[test]
    fn resolve_prefers_latest_date_then_stability() {
        // scenario: hello-world with 2021-06-01 ga, 2021-06-07 ga, 2021-06-13 beta
        let available = vec![v("2021-06-01"), v("2021-06-07"), v("2021-06-13~beta")];

        assert_eq!(resolve(&available, v("2021-07-01")).unwrap(), v("2021-06-07"));
        assert_eq!(
            resolve(&available, v("2021-07-01~beta")).unwrap(),
            v("2021-06-13~beta")
        );
        assert_eq!(
            resolve(&available, v("2021-07-01~experimental")).unwrap(),
            v("2021-06-13~beta")
        );
        assert_eq!(
            resolve(&available, v("2021-06-08~experimental")).unwrap(),
            v("2021-06-07")
        );
    }

    #[test]
    fn resolve_respects_stability_ladder() {
        // scenario: projects with a single experimental version
        let available = vec![v("2021-06-04~experimental")];

        assert_eq!(
            resolve(&available, v("2021-07-01~experimental")).unwrap(),
            v("2021-06-04~experimental")
        );
        assert!(resolve(&available, v("2021-07-01~beta"))
            .unwrap_err()
            .is_no_matching_version());
        assert!(resolve(&available, v("2021-07-01"))
            .unwrap_err()
            .is_no_matching_version());
    }

    #[test]
    fn resolve_ignores_future_versions() {
        let available = vec![v("2021-06-01"), v("2021-09-01")];
        assert_eq!(resolve(&available, v("2021-07-01")).unwrap(), v("2021-06-01"));
    }

    #[test]
    fn deprecated_by_requires_equal_or_stronger_stability() {
        let timeline = vec![v("2021-06-01"), v("2021-06-07"), v("2021-06-13~beta")];

        assert_eq!(
            v("2021-06-01").deprecated_by(&timeline),
            Some(v("2021-06-07"))
        );
        // nothing ga or stronger follows 06-07
        assert_eq!(v("2021-06-07").deprecated_by(&timeline), None);
        // a beta is deprecated by a later beta or ga
        let betas = vec![v("2021-06-13~beta"), v("2021-08-01")];
        assert_eq!(
            v("2021-06-13~beta").deprecated_by(&betas),
            Some(v("2021-08-01"))
        );
    }

    #[test]
    fn wip_and_experimental_never_age_out() {
        let timeline = vec![v("2021-06-04~experimental"), v("2021-08-01")];
        assert_eq!(v("2021-06-04~experimental").deprecated_by(&timeline), None);
        assert_eq!(v("2021-06-04~wip").deprecated_by(&timeline), None);
    }

    #[test]
    fn lifecycle_transitions() {
        let version = v("2021-06-01");
        assert_eq!(
            version.lifecycle_at(d("2021-05-01"), None),
            Lifecycle::Unreleased
        );
        assert_eq!(
            version.lifecycle_at(d("2021-06-15"), None),
            Lifecycle::Released
        );

        let by = v("2021-06-07");
        assert_eq!(
            version.lifecycle_at(d("2021-06-15"), Some(&by)),
            Lifecycle::Deprecated
        );
        // 181 days after 2021-06-07 is 2021-12-05; sunset strictly after
        assert_eq!(
            version.lifecycle_at(d("2021-12-05"), Some(&by)),
            Lifecycle::Deprecated
        );
        assert_eq!(
            version.lifecycle_at(d("2021-12-06"), Some(&by)),
            Lifecycle::Sunset
        );
    }

    #[test]
    fn non_ga_sunsets_only_via_ga_deprecator() {
        let beta = v("2021-06-13~beta");
        let by_beta = v("2021-07-01~beta");
        let by_ga = v("2021-07-01");

        assert_eq!(
            beta.lifecycle_at(d("2022-06-01"), Some(&by_beta)),
            Lifecycle::Deprecated
        );
        assert_eq!(
            beta.lifecycle_at(d("2022-06-01"), Some(&by_ga)),
            Lifecycle::Sunset
        );
    }

    #[test]
    fn query_accepts_bare_stability() {
        let today = d("2022-01-15");
        assert_eq!(
            Version::parse_query("beta", today).unwrap(),
            Version::new(today, Stability::Beta)
        );
        assert_eq!(
            Version::parse_query("2021-06-01~beta", today).unwrap(),
            v("2021-06-01~beta")
        );
        assert!(Version::parse_query("ga", today).is_err());
        assert!(Version::parse_query("nonsense", today).is_err());
    }

    #[test]
    fn serde_uses_canonical_form() {
        let version = v("2021-06-13~beta");
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"2021-06-13~beta\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);
    }
}
