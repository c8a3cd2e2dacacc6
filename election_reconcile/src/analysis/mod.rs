//! The power-structure analyses.
//!
//! Each analysis is a pure function of the reconciled and aggregated data.
//! Missing joinable data for one jurisdiction or party skips that jurisdiction
//! in that analysis only; the reason is recorded and logged.

pub mod dependency;
pub mod mandate_threshold;
pub mod stronghold;
pub mod thin_majority;

use log::info;
use serde::Serialize;

use crate::aggregate::CandidateTotal;
use crate::config::*;
use crate::reconcile::Reconciliation;

pub use dependency::{dependency_ratios, DependencyRow};
pub use mandate_threshold::{mandate_threshold_audit, RobbedCandidate};
pub use stronghold::{strongholds, Stronghold};
pub use thin_majority::{thin_majorities, ThinMajority};

/// A jurisdiction (or party) left out of one analysis.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct Skip {
    pub analysis: &'static str,
    pub election_type: Option<ElectionType>,
    pub jurisdiction: String,
    pub reason: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisReport<T> {
    pub rows: Vec<T>,
    pub skipped: Vec<Skip>,
}

impl<T> AnalysisReport<T> {
    pub fn new() -> AnalysisReport<T> {
        AnalysisReport {
            rows: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn skip(
        &mut self,
        analysis: &'static str,
        election_type: Option<ElectionType>,
        jurisdiction: &str,
        reason: String,
    ) {
        info!("{}: skipping {}: {}", analysis, jurisdiction, reason);
        self.skipped.push(Skip {
            analysis,
            election_type,
            jurisdiction: jurisdiction.to_string(),
            reason,
        });
    }
}

impl<T> Default for AnalysisReport<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Analyses {
    pub robbed_candidates: AnalysisReport<RobbedCandidate>,
    pub dependency: AnalysisReport<DependencyRow>,
    pub strongholds: AnalysisReport<Stronghold>,
    pub thin_majorities: AnalysisReport<ThinMajority>,
}

impl Analyses {
    pub fn skipped_count(&self) -> usize {
        self.robbed_candidates.skipped.len()
            + self.dependency.skipped.len()
            + self.strongholds.skipped.len()
            + self.thin_majorities.skipped.len()
    }
}

/// Runs the four analyses independently of each other.
pub fn run_analyses(
    rec: &Reconciliation,
    candidate_totals: &[CandidateTotal],
    mandates: &[MandateRow],
    executives: Option<&[Executive]>,
    settings: &AnalysisSettings,
    party_names: &PartyNameTable,
) -> Analyses {
    let res = Analyses {
        robbed_candidates: mandate_threshold_audit(candidate_totals, mandates, settings),
        dependency: dependency_ratios(rec, candidate_totals, settings),
        strongholds: strongholds(rec, settings),
        thin_majorities: thin_majorities(mandates, executives, party_names),
    };
    info!(
        "run_analyses: {} robbed candidates, {} dependency rows, {} strongholds, {} thin majorities, {} skips",
        res.robbed_candidates.rows.len(),
        res.dependency.rows.len(),
        res.strongholds.rows.len(),
        res.thin_majorities.rows.len(),
        res.skipped_count()
    );
    res
}
