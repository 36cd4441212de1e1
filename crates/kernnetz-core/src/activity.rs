//! # Activity Periods
//!
//! Observed-versus-expected presence of a core entity across the global
//! snapshot year catalog.
//!
//! Invariants for any non-empty period:
//! - `start == min(observed)` and `end == max(observed)`
//! - every gap year lies in `[start, end]` and in the catalog
//! - gaps and observed years are disjoint
//!
//! The persisted form is a JSON object with stable field names; see
//! [`ActivityPeriod::to_json`].

use crate::primitives::DATA_GAP_REASON;
use crate::{KernnetzError, Year};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Presence time series of one station or line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "PeriodRecord", into = "PeriodRecord")]
pub struct ActivityPeriod {
    start: Year,
    end: Year,
    observed: BTreeSet<Year>,
    missing: BTreeSet<Year>,
    reasons: BTreeMap<Year, String>,
}

/// Flat persisted shape. Derived fields are written but ignored on read.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PeriodRecord {
    start_snapshot: Year,
    end_snapshot: Year,
    observed_snapshots: Vec<Year>,
    missing_snapshots: Vec<Year>,
    missing_reasons: BTreeMap<Year, String>,
    total_period_years: i64,
    observation_rate: f64,
}

impl From<PeriodRecord> for ActivityPeriod {
    fn from(record: PeriodRecord) -> Self {
        Self {
            start: record.start_snapshot,
            end: record.end_snapshot,
            observed: record.observed_snapshots.into_iter().collect(),
            missing: record.missing_snapshots.into_iter().collect(),
            reasons: record.missing_reasons,
        }
    }
}

impl From<ActivityPeriod> for PeriodRecord {
    fn from(period: ActivityPeriod) -> Self {
        Self {
            start_snapshot: period.start,
            end_snapshot: period.end,
            total_period_years: period.total_period_years(),
            observation_rate: period.observation_rate(),
            observed_snapshots: period.observed.into_iter().collect(),
            missing_snapshots: period.missing.into_iter().collect(),
            missing_reasons: period.reasons,
        }
    }
}

/// Catalog years inside `[start, end]` that were not observed.
fn gaps_within(catalog: &[Year], start: Year, end: Year, observed: &BTreeSet<Year>) -> BTreeSet<Year> {
    catalog
        .iter()
        .copied()
        .filter(|y| (start..=end).contains(y) && !observed.contains(y))
        .collect()
}

impl ActivityPeriod {
    /// Compute a period from observed years against the global catalog.
    ///
    /// An empty observation set yields the zero period.
    #[must_use]
    pub fn compute(observed: &BTreeSet<Year>, catalog: &[Year]) -> Self {
        let (Some(&start), Some(&end)) = (observed.first(), observed.last()) else {
            return Self::default();
        };
        let missing = gaps_within(catalog, start, end, observed);
        let reasons = missing
            .iter()
            .map(|y| (*y, DATA_GAP_REASON.to_string()))
            .collect();
        Self {
            start,
            end,
            observed: observed.clone(),
            missing,
            reasons,
        }
    }

    /// Merge `incoming` into `existing`.
    ///
    /// Observed years are unioned and gaps recomputed against the (possibly
    /// grown) catalog. Existing gap reasons always win; incoming reasons only
    /// fill years not yet annotated. A zero period on either side is treated
    /// as "no prior period".
    #[must_use]
    pub fn merge(existing: &Self, incoming: &Self, catalog: &[Year]) -> Self {
        if existing.is_empty() {
            return incoming.clone();
        }
        if incoming.is_empty() {
            return existing.clone();
        }

        let start = existing.start.min(incoming.start);
        let end = existing.end.max(incoming.end);
        let observed: BTreeSet<Year> = existing.observed.union(&incoming.observed).copied().collect();
        let missing = gaps_within(catalog, start, end, &observed);

        let mut reasons = existing.reasons.clone();
        for (year, reason) in &incoming.reasons {
            reasons.entry(*year).or_insert_with(|| reason.clone());
        }

        Self {
            start,
            end,
            observed,
            missing,
            reasons,
        }
    }

    /// Decode a persisted period. Absent or blank input yields the zero period.
    pub fn from_json(input: Option<&str>) -> Result<Self, KernnetzError> {
        match input.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(json) => serde_json::from_str(json)
                .map_err(|e| KernnetzError::DeserializationError(e.to_string())),
        }
    }

    /// Encode in the persisted JSON shape.
    pub fn to_json(&self) -> Result<String, KernnetzError> {
        serde_json::to_string(self).map_err(|e| KernnetzError::SerializationError(e.to_string()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    #[must_use]
    pub const fn start(&self) -> Year {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> Year {
        self.end
    }

    #[must_use]
    pub const fn observed(&self) -> &BTreeSet<Year> {
        &self.observed
    }

    #[must_use]
    pub const fn missing(&self) -> &BTreeSet<Year> {
        &self.missing
    }

    #[must_use]
    pub const fn missing_reasons(&self) -> &BTreeMap<Year, String> {
        &self.reasons
    }

    /// Annotate a gap year. Years that are not gaps are ignored.
    pub fn annotate_gap(&mut self, year: Year, reason: &str) -> bool {
        if !self.missing.contains(&year) {
            return false;
        }
        self.reasons.insert(year, reason.to_string());
        true
    }

    /// `end - start`.
    #[must_use]
    pub fn total_period_years(&self) -> i64 {
        i64::from(self.end) - i64::from(self.start)
    }

    /// `observed / (observed ∪ missing)`, or 0 for the zero period.
    #[must_use]
    pub fn observation_rate(&self) -> f64 {
        let in_period = self.observed.union(&self.missing).count();
        if in_period == 0 {
            return 0.0;
        }
        self.observed.len() as f64 / in_period as f64
    }

    /// Describe the first broken invariant, if any.
    #[must_use]
    pub fn invariant_violation(&self) -> Option<String> {
        let (Some(&first), Some(&last)) = (self.observed.first(), self.observed.last()) else {
            return (!self.missing.is_empty()).then(|| "gaps without observations".to_string());
        };
        if self.start != first || self.end != last {
            return Some(format!(
                "bounds {}..{} do not match observed {first}..{last}",
                self.start, self.end
            ));
        }
        if let Some(y) = self.missing.iter().find(|y| !(self.start..=self.end).contains(*y)) {
            return Some(format!("gap {y} outside period"));
        }
        if let Some(y) = self.missing.intersection(&self.observed).next() {
            return Some(format!("year {y} is both observed and missing"));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn years(ys: &[Year]) -> BTreeSet<Year> {
        ys.iter().copied().collect()
    }

    const CATALOG: [Year; 6] = [1960, 1965, 1970, 1975, 1980, 1985];

    #[test]
    fn compute_finds_inner_gaps_only() {
        let period = ActivityPeriod::compute(&years(&[1965, 1975]), &CATALOG);
        assert_eq!(period.start(), 1965);
        assert_eq!(period.end(), 1975);
        assert_eq!(period.missing(), &years(&[1970]));
        assert_eq!(
            period.missing_reasons().get(&1970).map(String::as_str),
            Some(DATA_GAP_REASON)
        );
        assert!(period.invariant_violation().is_none());
    }

    #[test]
    fn compute_empty_is_zero_period() {
        let period = ActivityPeriod::compute(&BTreeSet::new(), &CATALOG);
        assert!(period.is_empty());
        assert_eq!(period.start(), 0);
        assert_eq!(period.end(), 0);
        assert!(period.missing().is_empty());
        assert!((period.observation_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_preserves_existing_reasons() {
        let mut existing = ActivityPeriod::compute(&years(&[1960, 1975]), &CATALOG);
        assert!(existing.annotate_gap(1965, "closure"));
        let incoming = ActivityPeriod::compute(&years(&[1960, 1985]), &CATALOG);

        let merged = ActivityPeriod::merge(&existing, &incoming, &CATALOG);
        assert_eq!(merged.start(), 1960);
        assert_eq!(merged.end(), 1985);
        assert_eq!(merged.observed(), &years(&[1960, 1975, 1985]));
        assert_eq!(merged.missing(), &years(&[1965, 1970, 1980]));
        assert_eq!(
            merged.missing_reasons().get(&1965).map(String::as_str),
            Some("closure")
        );
        assert_eq!(
            merged.missing_reasons().get(&1980).map(String::as_str),
            Some(DATA_GAP_REASON)
        );
    }

    #[test]
    fn merge_with_zero_period_is_identity() {
        let period = ActivityPeriod::compute(&years(&[1970]), &CATALOG);
        let zero = ActivityPeriod::default();
        assert_eq!(ActivityPeriod::merge(&zero, &period, &CATALOG), period);
        assert_eq!(ActivityPeriod::merge(&period, &zero, &CATALOG), period);
    }

    #[test]
    fn merge_recomputes_gaps_against_grown_catalog() {
        let old = ActivityPeriod::compute(&years(&[1960, 1970]), &[1960, 1970]);
        assert!(old.missing().is_empty());

        let grown = [1960, 1965, 1970];
        let incoming = ActivityPeriod::compute(&years(&[1970]), &grown);
        let merged = ActivityPeriod::merge(&old, &incoming, &grown);
        assert_eq!(merged.missing(), &years(&[1965]));
    }

    #[test]
    fn json_shape_is_stable() {
        let period = ActivityPeriod::compute(&years(&[1960, 1970]), &CATALOG);
        let value: serde_json::Value =
            serde_json::from_str(&period.to_json().expect("encode")).expect("json");

        assert_eq!(value["start_snapshot"], 1960);
        assert_eq!(value["end_snapshot"], 1970);
        assert_eq!(value["observed_snapshots"], serde_json::json!([1960, 1970]));
        assert_eq!(value["missing_snapshots"], serde_json::json!([1965]));
        assert_eq!(value["missing_reasons"]["1965"], "data_gap");
        assert_eq!(value["total_period_years"], 10);
        let rate = value["observation_rate"].as_f64().expect("rate");
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn blank_json_decodes_to_zero_period() {
        assert!(ActivityPeriod::from_json(None).expect("decode").is_empty());
        assert!(ActivityPeriod::from_json(Some("  ")).expect("decode").is_empty());
        assert!(ActivityPeriod::from_json(Some("{")).is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let period = ActivityPeriod::from_json(Some(
            r#"{"start_snapshot":1965,"end_snapshot":1965,"observed_snapshots":[1965]}"#,
        ))
        .expect("decode");
        assert_eq!(period.observed(), &years(&[1965]));
        assert!(period.missing_reasons().is_empty());
    }

    #[test]
    fn invariant_violation_detects_bad_bounds() {
        let broken = ActivityPeriod::from_json(Some(
            r#"{"start_snapshot":1960,"end_snapshot":1970,"observed_snapshots":[1965],"missing_snapshots":[1965]}"#,
        ))
        .expect("decode");
        assert!(broken.invariant_violation().is_some());
    }
}
