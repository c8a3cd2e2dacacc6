// Polling areas where a party runs far ahead of its jurisdiction-wide share.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{rank_descending, serialize_percent, Ratio};
use crate::analysis::AnalysisReport;
use crate::config::*;
use crate::reconcile::{total_once_per_group, Reconciliation};

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Stronghold {
    pub election_type: ElectionType,
    pub jurisdiction: String,
    pub polling_area_id: String,
    pub polling_area_name: String,
    pub party_name: String,
    pub votes: u64,
    pub valid_votes: u64,
    #[serde(serialize_with = "serialize_percent")]
    pub area_share_percent: f64,
    #[serde(serialize_with = "serialize_percent")]
    pub jurisdiction_share_percent: f64,
    /// Percentage points above the jurisdiction share.
    #[serde(serialize_with = "serialize_percent")]
    pub deviation: f64,
}

const NAME: &str = "stronghold";

pub fn strongholds(rec: &Reconciliation, settings: &AnalysisSettings) -> AnalysisReport<Stronghold> {
    let mut report = AnalysisReport::new();
    let valid_by_jurisdiction = total_once_per_group(
        &rec.areas,
        |a| (a.election_type, a.polling_area_id.clone()),
        |a| (a.election_type, a.jurisdiction.clone()),
        |a| a.valid_votes,
    );
    let mut party_votes: BTreeMap<(ElectionType, String, String), u64> = BTreeMap::new();
    for r in rec.results.iter() {
        *party_votes
            .entry((r.election_type, r.jurisdiction.clone(), r.party_id.clone()))
            .or_insert(0) += r.list_total;
    }
    for ((election_type, jurisdiction), valid) in valid_by_jurisdiction.iter() {
        if *valid == 0 {
            report.skip(
                NAME,
                Some(*election_type),
                jurisdiction,
                "no valid votes in the jurisdiction".to_string(),
            );
        }
    }
    for r in rec.results.iter() {
        let jurisdiction_valid = valid_by_jurisdiction
            .get(&(r.election_type, r.jurisdiction.clone()))
            .cloned()
            .unwrap_or(0);
        let votes = party_votes
            .get(&(r.election_type, r.jurisdiction.clone(), r.party_id.clone()))
            .cloned()
            .unwrap_or(0);
        let (area_share, mean) = match (
            r.area_share().percent(),
            Ratio::new(votes, jurisdiction_valid).percent(),
        ) {
            (Some(a), Some(m)) => (a, m),
            _ => continue,
        };
        let deviation = area_share - mean;
        if deviation > settings.stronghold_min_deviation && mean > settings.stronghold_min_mean_share {
            report.rows.push(Stronghold {
                election_type: r.election_type,
                jurisdiction: r.jurisdiction.clone(),
                polling_area_id: r.polling_area_id.clone(),
                polling_area_name: r.polling_area_name.clone(),
                party_name: r.party_name.clone(),
                votes: r.list_total,
                valid_votes: r.valid_votes_in_area,
                area_share_percent: area_share,
                jurisdiction_share_percent: mean,
                deviation,
            });
        }
    }
    rank_descending(
        &mut report.rows,
        |s| s.deviation,
        |s| {
            (
                s.election_type,
                s.jurisdiction.clone(),
                s.polling_area_id.clone(),
                s.party_name.clone(),
            )
        },
        settings.stronghold_limit,
    );
    report
}
