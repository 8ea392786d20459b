//! Selection of the representative current and previous annual reports.
//!
//! Candidates are grouped by fiscal period. Within a period the caller's
//! consolidation preference decides between variants, falling back to the
//! other known variant and then to filings with no stated scope. The latest
//! submission of the chosen variant represents the period; ties go to the
//! greatest document ID.
//!
//! Withdrawn filings only represent a period when nothing else was filed
//! for it.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use yuho_data::edinet::{Candidate, Consolidation};
use yuho_data::{DataError, Result};

/// Preferred consolidation scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    /// Prefer group-wide figures
    #[default]
    Consolidated,
    /// Prefer single-entity figures
    Separate,
}

impl Preference {
    /// The consolidation variant this preference asks for.
    pub const fn variant(&self) -> Consolidation {
        match self {
            Self::Consolidated => Consolidation::Consolidated,
            Self::Separate => Consolidation::Separate,
        }
    }

    /// Rank of a variant under this preference (lower is better).
    const fn rank(&self, variant: Consolidation) -> u8 {
        match (self, variant) {
            (_, Consolidation::Unknown) => 2,
            (Self::Consolidated, Consolidation::Consolidated)
            | (Self::Separate, Consolidation::Separate) => 0,
            _ => 1,
        }
    }

    /// Lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Consolidated => "consolidated",
            Self::Separate => "separate",
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Preference {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "consolidated" | "c" => Ok(Self::Consolidated),
            "separate" | "s" | "nonconsolidated" => Ok(Self::Separate),
            other => Err(DataError::Parse(format!(
                "invalid preference {other:?} (expected consolidated or separate)"
            ))),
        }
    }
}

/// Grouping key of a reporting period: year and month of the period end.
///
/// When only the period start is known, the end is taken as start + 11 months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FiscalPeriodKey {
    /// Calendar year of the period end
    pub year: i32,
    /// Calendar month of the period end
    pub month: u32,
}

impl FiscalPeriodKey {
    /// Key of a candidate, or `None` when it carries no period dates.
    pub fn of(candidate: &Candidate) -> Option<Self> {
        effective_period_end(candidate).map(|end| Self {
            year: end.year(),
            month: end.month(),
        })
    }
}

impl fmt::Display for FiscalPeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

fn effective_period_end(candidate: &Candidate) -> Option<NaiveDate> {
    candidate.period_end.or_else(|| {
        candidate
            .period_start
            .and_then(|start| start.checked_add_months(Months::new(11)))
    })
}

/// How the representative of a period was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Variant the caller asked for
    pub preferred: Preference,
    /// Variant that was picked
    pub chosen: Consolidation,
    /// The preferred variant was not available
    pub fallback: bool,
    /// Candidates in the period after withdrawal filtering
    pub competing: usize,
    /// Only withdrawn filings existed for the period
    pub withdrawn_only: bool,
}

/// A period representative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    /// The chosen filing
    pub candidate: Candidate,
    /// Its period
    pub period: FiscalPeriodKey,
    /// How it was chosen
    pub resolution: Resolution,
}

impl Selected {
    /// Period end used for ordering.
    pub fn period_end(&self) -> Option<NaiveDate> {
        effective_period_end(&self.candidate)
    }
}

/// The current and previous representatives.
///
/// When both are present, `current` ends strictly after `previous`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResult {
    /// Most recent period
    pub current: Option<Selected>,
    /// The period before it
    pub previous: Option<Selected>,
    /// Number of distinct periods seen
    pub periods: usize,
}

impl SelectionResult {
    /// Whether nothing was selected.
    pub const fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Selected filings, current first.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Selected)> {
        [("latest", self.current.as_ref()), ("previous", self.previous.as_ref())]
            .into_iter()
            .filter_map(|(label, s)| s.map(|s| (label, s)))
    }
}

/// Picks period representatives for one filer.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    preference: Preference,
    filer_code: Option<String>,
}

impl Selector {
    /// Selector with a consolidation preference.
    pub const fn new(preference: Preference) -> Self {
        Self {
            preference,
            filer_code: None,
        }
    }

    /// Ignore candidates of other filers.
    pub fn for_filer(mut self, filer_code: impl Into<String>) -> Self {
        self.filer_code = Some(filer_code.into().trim().to_uppercase());
        self
    }

    /// Select current and previous representatives from `candidates`.
    ///
    /// The result does not depend on the order of `candidates`.
    pub fn select(&self, candidates: &[Candidate]) -> SelectionResult {
        let mut groups: BTreeMap<FiscalPeriodKey, Vec<&Candidate>> = BTreeMap::new();
        for candidate in candidates {
            if !candidate.is_yuho() {
                continue;
            }
            if let Some(filer) = &self.filer_code
                && !candidate.filer_code.eq_ignore_ascii_case(filer)
            {
                continue;
            }
            match FiscalPeriodKey::of(candidate) {
                Some(key) => groups.entry(key).or_default().push(candidate),
                None => debug!(doc_id = %candidate.doc_id, "skipping candidate without period dates"),
            }
        }

        let periods = groups.len();
        let mut representatives = groups
            .into_iter()
            .rev()
            .filter_map(|(key, group)| self.resolve(key, group));

        SelectionResult {
            current: representatives.next(),
            previous: representatives.next(),
            periods,
        }
    }

    fn resolve(&self, period: FiscalPeriodKey, group: Vec<&Candidate>) -> Option<Selected> {
        let active: Vec<&Candidate> = group.iter().copied().filter(|c| !c.withdrawn).collect();
        let withdrawn_only = active.is_empty();
        let pool = if withdrawn_only { group } else { active };

        let chosen = pool
            .iter()
            .map(|c| c.consolidation)
            .min_by_key(|v| self.preference.rank(*v))?;

        let winner = pool
            .iter()
            .copied()
            .filter(|c| c.consolidation == chosen)
            .max_by(|a, b| {
                a.submitted_at
                    .cmp(&b.submitted_at)
                    .then_with(|| a.doc_id.cmp(&b.doc_id))
            })?;

        let resolution = Resolution {
            preferred: self.preference,
            chosen,
            fallback: chosen != self.preference.variant(),
            competing: pool.len(),
            withdrawn_only,
        };
        debug!(%period, doc_id = %winner.doc_id, ?resolution, "period resolved");

        Some(Selected {
            candidate: winner.clone(),
            period,
            resolution,
        })
    }
}

/// Select with the given preference and no filer restriction.
pub fn select(candidates: &[Candidate], preference: Preference) -> SelectionResult {
    Selector::new(preference).select(candidates)
}
