// Candidates who out-polled an elected colleague of their own party and still
// did not get a seat.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Serialize;

use crate::aggregate::{elected_set, rank_descending, CandidateTotal};
use crate::analysis::AnalysisReport;
use crate::config::*;

#[derive(PartialEq, Eq, Debug, Clone, Serialize)]
pub struct RobbedCandidate {
    pub election_type: ElectionType,
    pub jurisdiction: String,
    pub party_name: String,
    pub candidate_id: String,
    pub ballot_name: String,
    pub personal_votes: u64,
    /// Lowest personal vote among the party's elected candidates.
    pub threshold: u64,
    pub excess: u64,
    pub party_seats: usize,
}

const NAME: &str = "mandate_threshold_audit";

pub fn mandate_threshold_audit(
    totals: &[CandidateTotal],
    mandates: &[MandateRow],
    settings: &AnalysisSettings,
) -> AnalysisReport<RobbedCandidate> {
    let mut report = AnalysisReport::new();
    let elected = elected_set(mandates);
    let with_mandates: BTreeSet<(ElectionType, String)> = mandates
        .iter()
        .map(|m| (m.election_type, m.jurisdiction.clone()))
        .collect();

    let mut groups: BTreeMap<(ElectionType, String, String), Vec<&CandidateTotal>> = BTreeMap::new();
    for c in totals.iter() {
        groups
            .entry((c.election_type, c.jurisdiction.clone(), c.party_id.clone()))
            .or_default()
            .push(c);
    }

    let mut missing: BTreeSet<(ElectionType, String)> = BTreeSet::new();
    for ((election_type, jurisdiction, party_id), members) in groups.iter() {
        if !with_mandates.contains(&(*election_type, jurisdiction.clone())) {
            missing.insert((*election_type, jurisdiction.clone()));
            continue;
        }
        let is_elected = |c: &CandidateTotal| {
            elected.contains(&(c.election_type, c.jurisdiction.clone(), c.candidate_id.clone()))
        };
        let seated: Vec<u64> = members
            .iter()
            .filter(|c| is_elected(c))
            .map(|c| c.personal_votes)
            .collect();
        let threshold = match seated.iter().min() {
            Some(t) => *t,
            None => {
                // No seat: no threshold, and nobody in the party can be outvoted.
                debug!("{}: {} {} party {} holds no seat", NAME, election_type, jurisdiction, party_id);
                continue;
            }
        };
        for c in members.iter().filter(|c| !is_elected(c)) {
            if c.personal_votes > threshold {
                report.rows.push(RobbedCandidate {
                    election_type: *election_type,
                    jurisdiction: jurisdiction.clone(),
                    party_name: c.party_name.clone(),
                    candidate_id: c.candidate_id.clone(),
                    ballot_name: c.ballot_name.clone(),
                    personal_votes: c.personal_votes,
                    threshold,
                    excess: c.personal_votes - threshold,
                    party_seats: seated.len(),
                });
            }
        }
    }
    for (election_type, jurisdiction) in missing.iter() {
        report.skip(
            NAME,
            Some(*election_type),
            jurisdiction,
            "no mandate distribution for the jurisdiction".to_string(),
        );
    }
    rank_descending(
        &mut report.rows,
        |r| r.excess as f64,
        |r| (r.election_type, r.jurisdiction.clone(), r.candidate_id.clone()),
        settings.robbed_limit,
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(jurisdiction: &str, party: &str, cid: &str, votes: u64) -> CandidateTotal {
        CandidateTotal {
            election_type: ElectionType::MunicipalCouncil,
            jurisdiction: jurisdiction.to_string(),
            candidate_id: cid.to_string(),
            ballot_name: cid.to_string(),
            party_id: party.to_string(),
            party_name: party.to_string(),
            personal_votes: votes,
            elected: false,
        }
    }

    fn seat(jurisdiction: &str, party: &str, cid: Option<&str>, number: u64) -> MandateRow {
        MandateRow {
            election_type: ElectionType::MunicipalCouncil,
            election_date: "18-11-2025".to_string(),
            jurisdiction: jurisdiction.to_string(),
            municipality: jurisdiction.to_string(),
            municipality_code: None,
            region: String::new(),
            revision: None,
            mandate_type: MandateType::PersonalSeat,
            number,
            number_on_list: None,
            candidate_id: cid.map(|s| s.to_string()),
            ballot_name: String::new(),
            party_id: party.to_string(),
            party_letter: String::new(),
            party_name: party.to_string(),
        }
    }

    #[test]
    fn outvoted_candidate_is_reported() {
        let totals = vec![
            total("M1", "P2", "C1", 500),
            total("M1", "P2", "C2", 300),
            total("M1", "P2", "C3", 120),
            total("M1", "P2", "C9", 150),
            total("M1", "P2", "C10", 100),
        ];
        let mandates = vec![
            seat("M1", "P2", Some("C1"), 1),
            seat("M1", "P2", Some("C2"), 2),
            seat("M1", "P2", Some("C3"), 3),
        ];
        let r = mandate_threshold_audit(&totals, &mandates, &AnalysisSettings::DEFAULT_SETTINGS);
        assert_eq!(r.rows.len(), 1);
        assert_eq!(r.rows[0].candidate_id, "C9");
        assert_eq!(r.rows[0].threshold, 120);
        assert_eq!(r.rows[0].excess, 30);
        assert_eq!(r.rows[0].party_seats, 3);
    }

    #[test]
    fn party_without_seats_contributes_nothing() {
        let totals = vec![
            total("M1", "P1", "C1", 10),
            total("M1", "P3", "C5", 900),
            total("M1", "P3", "C6", 800),
        ];
        let mandates = vec![seat("M1", "P1", Some("C1"), 1)];
        let r = mandate_threshold_audit(&totals, &mandates, &AnalysisSettings::DEFAULT_SETTINGS);
        assert!(r.rows.is_empty());
        assert!(r.skipped.is_empty());
    }

    #[test]
    fn jurisdiction_without_mandates_is_skipped() {
        let totals = vec![total("M1", "P1", "C1", 10), total("M2", "P1", "C2", 20)];
        let mandates = vec![seat("M1", "P1", Some("C1"), 1)];
        let r = mandate_threshold_audit(&totals, &mandates, &AnalysisSettings::DEFAULT_SETTINGS);
        assert_eq!(r.skipped.len(), 1);
        assert_eq!(r.skipped[0].jurisdiction, "M2");
    }

    #[test]
    fn alternates_are_not_elected() {
        let totals = vec![total("M1", "P1", "C1", 10), total("M1", "P1", "C2", 50)];
        let mut alt = seat("M1", "P1", Some("C2"), 1);
        alt.mandate_type = MandateType::Alternate;
        let mandates = vec![seat("M1", "P1", Some("C1"), 1), alt];
        let r = mandate_threshold_audit(&totals, &mandates, &AnalysisSettings::DEFAULT_SETTINGS);
        assert_eq!(r.rows.len(), 1);
        assert_eq!(r.rows[0].excess, 40);
    }
}
