// Share of a party's votes carried by a single candidate.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{rank_descending, serialize_percent, CandidateTotal, Ratio};
use crate::analysis::AnalysisReport;
use crate::config::*;
use crate::reconcile::Reconciliation;

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct DependencyRow {
    pub election_type: ElectionType,
    pub jurisdiction: String,
    pub party_name: String,
    pub candidate_id: String,
    pub ballot_name: String,
    pub personal_votes: u64,
    pub party_votes: u64,
    #[serde(serialize_with = "serialize_percent")]
    pub ratio_percent: f64,
    pub elected: bool,
}

const NAME: &str = "dependency_ratio";

/// Party totals per (election type, jurisdiction, party), one `list_total`
/// per polling area.
pub fn party_totals(rec: &Reconciliation) -> BTreeMap<(ElectionType, String, String), u64> {
    let mut res: BTreeMap<(ElectionType, String, String), u64> = BTreeMap::new();
    for r in rec.results.iter() {
        *res.entry((r.election_type, r.jurisdiction.clone(), r.party_id.clone()))
            .or_insert(0) += r.list_total;
    }
    res
}

pub fn dependency_ratios(
    rec: &Reconciliation,
    totals: &[CandidateTotal],
    settings: &AnalysisSettings,
) -> AnalysisReport<DependencyRow> {
    let mut report = AnalysisReport::new();
    let parties = party_totals(rec);
    let mut missing: BTreeMap<(ElectionType, String), usize> = BTreeMap::new();
    for c in totals.iter() {
        let party_votes = match parties.get(&(c.election_type, c.jurisdiction.clone(), c.party_id.clone())) {
            Some(v) => *v,
            None => {
                *missing.entry((c.election_type, c.jurisdiction.clone())).or_insert(0) += 1;
                continue;
            }
        };
        let ratio = match Ratio::new(c.personal_votes, party_votes).percent() {
            Some(r) => r,
            None => continue,
        };
        // A handful of votes trivially yields 100 %.
        if ratio >= settings.dependency_saturation_percent && party_votes < settings.noise_floor {
            continue;
        }
        report.rows.push(DependencyRow {
            election_type: c.election_type,
            jurisdiction: c.jurisdiction.clone(),
            party_name: c.party_name.clone(),
            candidate_id: c.candidate_id.clone(),
            ballot_name: c.ballot_name.clone(),
            personal_votes: c.personal_votes,
            party_votes,
            ratio_percent: ratio,
            elected: c.elected,
        });
    }
    for ((election_type, jurisdiction), n) in missing.iter() {
        report.skip(
            NAME,
            Some(*election_type),
            jurisdiction,
            format!("{} candidates without a reconciled party total", n),
        );
    }
    rank_descending(
        &mut report.rows,
        |r| r.ratio_percent,
        |r| (r.election_type, r.jurisdiction.clone(), r.candidate_id.clone()),
        settings.dependency_limit,
    );
    report
}
