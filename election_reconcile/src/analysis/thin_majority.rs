// How far the executive's own party is from half of the council seats.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{serialize_percent, Ratio};
use crate::analysis::AnalysisReport;
use crate::config::*;

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct ThinMajority {
    pub jurisdiction: String,
    pub executive: String,
    pub party: String,
    pub party_seats: u64,
    pub total_seats: u64,
    /// Seats above half the council; negative for a minority.
    pub margin: f64,
    #[serde(serialize_with = "serialize_percent")]
    pub majority_percent: f64,
}

const NAME: &str = "thin_majority";

/// Municipal councils only; alternates hold no seat.
pub fn thin_majorities(
    mandates: &[MandateRow],
    executives: Option<&[Executive]>,
    party_names: &PartyNameTable,
) -> AnalysisReport<ThinMajority> {
    let mut report = AnalysisReport::new();
    let executives = match executives {
        Some(e) if !e.is_empty() => e,
        _ => {
            report.skip(NAME, None, "*", "no executive roster available".to_string());
            return report;
        }
    };
    let mut seats: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for m in mandates.iter() {
        if m.election_type != ElectionType::MunicipalCouncil || !m.mandate_type.is_seat() {
            continue;
        }
        *seats
            .entry(m.jurisdiction.trim().to_string())
            .or_default()
            .entry(party_names.normalize(&m.party_name))
            .or_insert(0) += 1;
    }
    for e in executives.iter() {
        let jurisdiction = e.jurisdiction.trim();
        let council = match seats.get(jurisdiction) {
            Some(c) => c,
            None => {
                report.skip(
                    NAME,
                    Some(ElectionType::MunicipalCouncil),
                    jurisdiction,
                    "no seat distribution for the executive's jurisdiction".to_string(),
                );
                continue;
            }
        };
        let total_seats: u64 = council.values().sum();
        let party = party_names.normalize(&e.party);
        // A coalition executive may hold no seat under its own party name.
        let party_seats = council.get(&party).cloned().unwrap_or(0);
        report.rows.push(ThinMajority {
            jurisdiction: jurisdiction.to_string(),
            executive: e.name.clone(),
            party,
            party_seats,
            total_seats,
            margin: party_seats as f64 - total_seats as f64 / 2.0,
            majority_percent: Ratio::new(party_seats, total_seats).percent().unwrap_or(0.0),
        });
    }
    report.rows.sort_by(|a, b| {
        a.margin
            .total_cmp(&b.margin)
            .then_with(|| a.jurisdiction.cmp(&b.jurisdiction))
    });
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat(jurisdiction: &str, party: &str, mandate_type: MandateType) -> MandateRow {
        MandateRow {
            election_type: ElectionType::MunicipalCouncil,
            election_date: "18-11-2025".to_string(),
            jurisdiction: jurisdiction.to_string(),
            municipality: jurisdiction.to_string(),
            municipality_code: None,
            region: String::new(),
            revision: None,
            mandate_type,
            number: 0,
            number_on_list: None,
            candidate_id: None,
            ballot_name: String::new(),
            party_id: party.to_string(),
            party_letter: String::new(),
            party_name: party.to_string(),
        }
    }

    fn executive(jurisdiction: &str, party: &str) -> Executive {
        Executive {
            jurisdiction: jurisdiction.to_string(),
            name: format!("Mayor of {}", jurisdiction),
            party: party.to_string(),
        }
    }

    #[test]
    fn margins_with_aliases_and_coalitions() {
        let mut mandates = Vec::new();
        for _ in 0..5 {
            mandates.push(seat("M1", "Venstre, Danmarks Liberale Parti", MandateType::PersonalSeat));
        }
        for _ in 0..4 {
            mandates.push(seat("M1", "Socialdemokratiet", MandateType::ListSeat));
        }
        mandates.push(seat("M1", "Socialdemokratiet", MandateType::Alternate));
        for _ in 0..3 {
            mandates.push(seat("M2", "Socialdemokratiet", MandateType::PersonalSeat));
        }
        let executives = vec![
            executive("M1", "Venstre"),
            executive("M2", "Konservative"),
            executive("M3", "Venstre"),
        ];
        let r = thin_majorities(&mandates, Some(&executives), &PartyNameTable::default());
        assert_eq!(r.rows.len(), 2);
        assert_eq!(r.rows[0].jurisdiction, "M2");
        assert_eq!(r.rows[0].party_seats, 0);
        assert_eq!(r.rows[0].margin, -1.5);
        assert_eq!(r.rows[1].jurisdiction, "M1");
        assert_eq!(r.rows[1].total_seats, 9);
        assert_eq!(r.rows[1].party_seats, 5);
        assert_eq!(r.rows[1].margin, 0.5);
        assert_eq!(r.skipped.len(), 1);
        assert_eq!(r.skipped[0].jurisdiction, "M3");
    }

    #[test]
    fn missing_roster_skips_the_analysis() {
        let r = thin_majorities(&[], None, &PartyNameTable::default());
        assert!(r.rows.is_empty());
        assert_eq!(r.skipped.len(), 1);
    }
}
