mod config;
use log::info;

pub mod aggregate;
pub mod analysis;
pub mod builder;
pub mod dedup;
pub mod manual;
pub mod normalize;
pub mod payload;
pub mod reconcile;
pub mod validate;

pub use crate::config::*;

use crate::aggregate::{build_aggregates, candidate_totals, Aggregates, CandidateTotal};
use crate::analysis::{run_analyses, Analyses};
use crate::dedup::{deduplicate_relations, DedupStats};
use crate::normalize::{normalize, resolve_mandate_parties, FilterReason, NormalizeStatus};
use crate::payload::SourcePayload;
use crate::reconcile::{reconcile, Reconciliation};
use crate::validate::{validate, ValidationReport};

/// How the payloads of a run were handled.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PayloadCounts {
    pub received: usize,
    pub accepted: usize,
    pub out_of_cycle: usize,
    pub verification: usize,
}

/// Everything the engine derives from one snapshot.
#[derive(PartialEq, Debug, Clone)]
pub struct CoreOutput {
    pub candidates: Vec<CandidateRow>,
    pub vote_results: Vec<VoteResultRow>,
    pub mandates: Vec<MandateRow>,
    pub payloads: PayloadCounts,
    pub dedup: DedupStats,
    pub mandate_parties_resolved: usize,
    pub reconciliation: Reconciliation,
    pub candidate_totals: Vec<CandidateTotal>,
    pub aggregates: Aggregates,
    pub analyses: Analyses,
    pub validation: ValidationReport,
}

/// Runs the whole engine over a snapshot of decoded payloads.
///
/// Arguments:
/// * `payloads` the decoded payloads, in a stable order
/// * `settings` every tunable of the run
/// * `lookup` the external category collaborator
/// * `executives` the executive roster, if one is available
/// * `reference` the official totals, if any
///
/// Only the total absence of usable data is an error. Filtered payloads,
/// clamped figures and skipped jurisdictions are reported in the output.
pub fn run_core(
    payloads: &[SourcePayload],
    settings: &EngineSettings,
    lookup: &dyn CategoryLookup,
    executives: Option<&[Executive]>,
    reference: Option<&ReferenceTotals>,
) -> Result<CoreOutput, ReconcileErrors> {
    if payloads.is_empty() {
        return Err(ReconcileErrors::EmptySnapshot);
    }
    info!("run_core: processing {} payloads", payloads.len());

    let mut counts = PayloadCounts {
        received: payloads.len(),
        ..PayloadCounts::default()
    };
    let mut candidates: Vec<CandidateRow> = Vec::new();
    let mut vote_results: Vec<VoteResultRow> = Vec::new();
    let mut mandates: Vec<MandateRow> = Vec::new();
    for p in payloads.iter() {
        let n = normalize(p, &settings.normalizer, lookup);
        match n.status {
            NormalizeStatus::Accepted => counts.accepted += 1,
            NormalizeStatus::Filtered(FilterReason::OutOfCycle { .. }) => counts.out_of_cycle += 1,
            NormalizeStatus::Filtered(FilterReason::Verification) => counts.verification += 1,
        }
        candidates.extend(n.candidates);
        vote_results.extend(n.vote_results);
        mandates.extend(n.mandates);
    }
    info!(
        "run_core: {} payloads accepted, {} out of cycle, {} verification data",
        counts.accepted, counts.out_of_cycle, counts.verification
    );

    let (candidates, vote_results, mut mandates, dedup) =
        deduplicate_relations(candidates, vote_results, mandates);
    let mandate_parties_resolved = resolve_mandate_parties(&mut mandates, &candidates);

    if vote_results.is_empty() && mandates.is_empty() {
        return Err(ReconcileErrors::NoUsableRelations);
    }

    let reconciliation = reconcile(&vote_results);
    let aggregates = build_aggregates(
        &reconciliation,
        &vote_results,
        &candidates,
        &mandates,
        &settings.analysis,
    );
    let totals = candidate_totals(&vote_results, &mandates);
    let analyses = run_analyses(
        &reconciliation,
        &totals,
        &mandates,
        executives,
        &settings.analysis,
        &settings.party_names,
    );
    let validation = validate(
        &reconciliation,
        &vote_results,
        &aggregates,
        reference,
        &settings.validation,
        &settings.party_names,
    );

    Ok(CoreOutput {
        candidates,
        vote_results,
        mandates,
        payloads: counts,
        dedup,
        mandate_parties_resolved,
        reconciliation,
        candidate_totals: totals,
        aggregates,
        analyses,
        validation,
    })
}
