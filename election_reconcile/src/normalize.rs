// Flattening of canonical documents into the three relations.

use std::collections::HashMap;

use log::{debug, info};

use crate::aggregate::Ratio;
use crate::config::*;
use crate::payload::{CanonicalDocument, DocumentHeader, SourcePayload};

/// Why a payload produced no rows.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum FilterReason {
    /// The election date does not carry the configured cycle marker.
    OutOfCycle { election_date: String },
    /// The source name marks the payload as verification or test data.
    Verification,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum NormalizeStatus {
    Accepted,
    Filtered(FilterReason),
}

/// Rows produced from one payload.
#[derive(PartialEq, Debug, Clone)]
pub struct Normalized {
    pub source_name: String,
    pub status: NormalizeStatus,
    pub candidates: Vec<CandidateRow>,
    pub vote_results: Vec<VoteResultRow>,
    pub mandates: Vec<MandateRow>,
}

impl Normalized {
    fn empty(source_name: &str, status: NormalizeStatus) -> Normalized {
        Normalized {
            source_name: source_name.to_string(),
            status,
            candidates: Vec::new(),
            vote_results: Vec::new(),
            mandates: Vec::new(),
        }
    }
}

/// Checks the hard filters. Filtered payloads are not errors.
pub fn filter_reason(source: &SourcePayload, settings: &NormalizerSettings) -> Option<FilterReason> {
    let lower_name = source.source_name.to_lowercase();
    if settings
        .verification_markers
        .iter()
        .any(|m| !m.is_empty() && lower_name.contains(&m.to_lowercase()))
    {
        return Some(FilterReason::Verification);
    }
    if let Some(marker) = &settings.election_cycle_marker {
        let election_date = source.payload.election_date();
        if !election_date.is_empty() && !election_date.contains(marker.as_str()) {
            return Some(FilterReason::OutOfCycle { election_date });
        }
    }
    None
}

/// Turns one payload into rows of the three relations.
///
/// Pure: the override table and the lookup are only read.
pub fn normalize(
    source: &SourcePayload,
    settings: &NormalizerSettings,
    lookup: &dyn CategoryLookup,
) -> Normalized {
    if let Some(reason) = filter_reason(source, settings) {
        info!("normalize: skipping {}: {:?}", source.source_name, reason);
        return Normalized::empty(&source.source_name, NormalizeStatus::Filtered(reason));
    }
    let mut res = Normalized::empty(&source.source_name, NormalizeStatus::Accepted);
    match source.canonical() {
        CanonicalDocument::Roster { header, lists } => {
            res.candidates = roster_rows(&header, &lists, &settings.category_overrides, lookup);
        }
        CanonicalDocument::Results(record) => {
            res.vote_results = vote_result_rows(&record);
        }
        CanonicalDocument::Mandates {
            header,
            assignments,
        } => {
            res.mandates = assignments
                .iter()
                .map(|a| mandate_row(&header, a))
                .collect();
        }
    }
    debug!(
        "normalize: {} ({}) -> {} candidates, {} vote results, {} mandates",
        source.source_name,
        source.payload.schema_name(),
        res.candidates.len(),
        res.vote_results.len(),
        res.mandates.len()
    );
    res
}

/// Reduces a first name to the form used as a lookup key.
pub fn clean_first_name(first_name: &str) -> String {
    first_name
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c| c == ',' || c == '-' || c == '.')
        .to_string()
}

/// Manual overrides first, then the external lookup, then unknown.
pub fn resolve_category(
    first_name: &str,
    overrides: &CategoryOverrides,
    lookup: &dyn CategoryLookup,
) -> (CandidateCategory, CategoryMethod) {
    let cleaned = clean_first_name(first_name);
    if cleaned.is_empty() {
        return (CandidateCategory::Unknown, CategoryMethod::NoData);
    }
    if let Some(c) = overrides.get(&cleaned) {
        return (c, CategoryMethod::ManualOverride);
    }
    match lookup.lookup(&cleaned) {
        Some(c) => (c, CategoryMethod::Lookup),
        None => (CandidateCategory::Unknown, CategoryMethod::NotFound),
    }
}

fn roster_rows(
    header: &DocumentHeader,
    lists: &[ListRoster],
    overrides: &CategoryOverrides,
    lookup: &dyn CategoryLookup,
) -> Vec<CandidateRow> {
    let jurisdiction = header.jurisdiction();
    let mut res: Vec<CandidateRow> = Vec::new();
    for list in lists.iter() {
        for c in list.candidates.iter() {
            let (category, category_method) = resolve_category(&c.first_name, overrides, lookup);
            res.push(CandidateRow {
                election_type: header.election_type,
                election_date: header.election_date.clone(),
                jurisdiction: jurisdiction.clone(),
                municipality: header.municipality.clone(),
                municipality_code: header.municipality_code.clone(),
                region: header.region.clone(),
                revision: header.revision.clone(),
                party_id: list.party_id.clone(),
                party_letter: list.party_letter.clone(),
                party_name: list.party_name.clone(),
                list_ballot_position: list.ballot_position.clone(),
                candidate_id: c.candidate_id.clone(),
                full_name: c.full_name.clone(),
                ballot_name: c.ballot_name.clone(),
                first_name: c.first_name.clone(),
                last_name: c.last_name.clone(),
                occupation: c.occupation.clone(),
                residence: c.residence.clone(),
                candidate_ballot_position: c.ballot_position.clone(),
                category,
                category_method,
            });
        }
    }
    res
}

/// One row per candidate, plus one placeholder row for a list without candidates.
pub fn vote_result_rows(record: &UpdateRecord) -> Vec<VoteResultRow> {
    let jurisdiction = jurisdiction_of(record.election_type, &record.municipality, &record.region);
    let turnout_percent = Ratio::new(record.votes_cast, record.eligible_voters).percent();
    let valid_percent = Ratio::new(record.valid_votes, record.votes_cast).percent();
    let row = |party: &PartyResult, candidate: Option<&CandidateResult>| VoteResultRow {
        election_type: record.election_type,
        election_date: record.election_date.clone(),
        jurisdiction: jurisdiction.clone(),
        municipality: record.municipality.clone(),
        municipality_code: record.municipality_code.clone(),
        region: record.region.clone(),
        polling_area_id: record.polling_area_id.clone(),
        polling_area_number: record.polling_area_number.clone(),
        polling_area_name: record.polling_area_name.clone(),
        revision: record.revision.clone(),
        eligible_voters: record.eligible_voters,
        votes_cast: record.votes_cast,
        valid_votes: record.valid_votes,
        invalid_votes: record.invalid_votes,
        blank_votes: record.blank_votes,
        turnout_percent,
        valid_percent,
        party_id: party.party_id.clone(),
        party_letter: party.party_letter.clone(),
        party_name: party.party_name.clone(),
        list_total: party.list_total,
        list_only_votes: party.list_only_votes,
        candidate_id: candidate.map(|c| c.candidate_id.clone()),
        ballot_name: candidate.map(|c| c.ballot_name.clone()).unwrap_or_default(),
        personal_votes: candidate.map(|c| c.personal_votes).unwrap_or(0),
        personal_share_percent: candidate
            .and_then(|c| Ratio::new(c.personal_votes, party.list_total).percent()),
    };
    let mut res: Vec<VoteResultRow> = Vec::new();
    for party in record.parties.iter() {
        if party.candidates.is_empty() {
            res.push(row(party, None));
        } else {
            for c in party.candidates.iter() {
                res.push(row(party, Some(c)));
            }
        }
    }
    res
}

fn mandate_row(header: &DocumentHeader, a: &MandateAssignment) -> MandateRow {
    MandateRow {
        election_type: header.election_type,
        election_date: header.election_date.clone(),
        jurisdiction: header.jurisdiction(),
        municipality: header.municipality.clone(),
        municipality_code: header.municipality_code.clone(),
        region: header.region.clone(),
        revision: header.revision.clone(),
        mandate_type: a.mandate_type,
        number: a.number,
        number_on_list: a.number_on_list,
        candidate_id: a.candidate_id.clone(),
        ballot_name: a.ballot_name.clone(),
        party_id: a.party_id.clone(),
        party_letter: a.party_letter.clone(),
        party_name: a.party_name.clone(),
    }
}

/// Fills in the party of mandates that name a candidate but no list, using the
/// (deduplicated) candidate roster. Returns how many rows were completed.
pub fn resolve_mandate_parties(mandates: &mut [MandateRow], candidates: &[CandidateRow]) -> usize {
    let roster: HashMap<(ElectionType, &str), &CandidateRow> = candidates
        .iter()
        .map(|c| ((c.election_type, c.candidate_id.as_str()), c))
        .collect();
    let mut resolved = 0;
    for m in mandates.iter_mut() {
        if !m.party_id.is_empty() {
            continue;
        }
        let found = m
            .candidate_id
            .as_deref()
            .and_then(|cid| roster.get(&(m.election_type, cid)));
        if let Some(c) = found {
            m.party_id = c.party_id.clone();
            m.party_letter = c.party_letter.clone();
            m.party_name = c.party_name.clone();
            if m.ballot_name.is_empty() {
                m.ballot_name = c.ballot_name.clone();
            }
            resolved += 1;
        } else {
            debug!(
                "resolve_mandate_parties: no roster entry for mandate {:?} in {}",
                m.candidate_id, m.jurisdiction
            );
        }
    }
    if resolved > 0 {
        info!("resolve_mandate_parties: resolved the party of {} mandates", resolved);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UpdateRecordBuilder;
    use crate::payload::Payload;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct FixedLookup;

    impl CategoryLookup for FixedLookup {
        fn lookup(&self, first_name: &str) -> Option<CandidateCategory> {
            match first_name {
                "Mette" => Some(CandidateCategory::Female),
                "Lars" => Some(CandidateCategory::Male),
                _ => None,
            }
        }
    }

    fn source(name: &str, value: serde_json::Value) -> SourcePayload {
        SourcePayload::resolve(name, None, Some(ElectionType::MunicipalCouncil), value).unwrap()
    }

    #[test]
    fn category_resolution_order() {
        let mut m = BTreeMap::new();
        m.insert("Lars".to_string(), CandidateCategory::Female);
        let overrides = CategoryOverrides::new(m);
        assert_eq!(
            resolve_category("Lars-, Løkke", &overrides, &FixedLookup),
            (CandidateCategory::Female, CategoryMethod::ManualOverride)
        );
        assert_eq!(
            resolve_category("Mette F.", &overrides, &FixedLookup),
            (CandidateCategory::Female, CategoryMethod::Lookup)
        );
        assert_eq!(
            resolve_category("Xyz", &overrides, &FixedLookup),
            (CandidateCategory::Unknown, CategoryMethod::NotFound)
        );
        assert_eq!(
            resolve_category("  ", &overrides, &FixedLookup),
            (CandidateCategory::Unknown, CategoryMethod::NoData)
        );
    }

    #[test]
    fn out_of_cycle_is_filtered() {
        let p = source(
            "kommunalvalg-valgresultater-1.json",
            json!({"Valgart": "Kommunalvalg", "Valgdag": "16-11-2021", "GyldigeStemmer": 3}),
        );
        let n = normalize(&p, &NormalizerSettings::default(), &NoCategoryLookup);
        assert_eq!(
            n.status,
            NormalizeStatus::Filtered(FilterReason::OutOfCycle {
                election_date: "16-11-2021".to_string()
            })
        );
        assert!(n.vote_results.is_empty());
    }

    #[test]
    fn verification_is_filtered() {
        let p = source(
            "verifikation/valgresultater.json",
            json!({"Valgart": "Kommunalvalg", "Valgdag": "18-11-2025", "GyldigeStemmer": 3}),
        );
        let n = normalize(&p, &NormalizerSettings::default(), &NoCategoryLookup);
        assert_eq!(n.status, NormalizeStatus::Filtered(FilterReason::Verification));
    }

    #[test]
    fn missing_date_is_not_filtered() {
        let p = source("a.json", json!({"Valgart": "Kommunalvalg", "GyldigeStemmer": 3}));
        let n = normalize(&p, &NormalizerSettings::default(), &NoCategoryLookup);
        assert_eq!(n.status, NormalizeStatus::Accepted);
    }

    #[test]
    fn list_without_candidates_keeps_a_row() {
        let record = UpdateRecordBuilder::new("A1", "M1")
            .valid_votes(100)
            .party("P1", 60, 10)
            .candidate("C1", 50)
            .party("P2", 40, 40)
            .build();
        let rows = vote_result_rows(&record);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].candidate_id, None);
        assert_eq!(rows[1].list_total, 40);
        assert_eq!(rows[1].personal_votes, 0);
        assert_eq!(rows[1].personal_share_percent, None);
    }

    #[test]
    fn roster_rows_carry_category() {
        let value = json!({
            "Valgart": "Kommunalvalg",
            "Valgdag": "18-11-2025",
            "Kommune": "Odense",
            "Kandidatlister": [
                {"KandidatlisteId": "L1", "Bogstavbetegnelse": "A", "Navn": "Socialdemokratiet",
                 "Kandidater": [{"Id": "C1", "Navn": "Mette Frederiksen"}]}
            ]
        });
        let p = SourcePayload {
            source_name: "kandidat-data.json".to_string(),
            kind: PayloadKind::CandidateRoster,
            election_type: ElectionType::MunicipalCouncil,
            payload: Payload::decode("kandidat-data.json", value).unwrap(),
        };
        let n = normalize(&p, &NormalizerSettings::default(), &FixedLookup);
        assert_eq!(n.candidates.len(), 1);
        let c = &n.candidates[0];
        assert_eq!(c.first_name, "Mette");
        assert_eq!(c.last_name, "Frederiksen");
        assert_eq!(c.ballot_name, "Mette Frederiksen");
        assert_eq!(c.category, CandidateCategory::Female);
        assert_eq!(c.category_method, CategoryMethod::Lookup);
        assert_eq!(c.jurisdiction, "Odense");
    }

    #[test]
    fn mandate_party_from_roster() {
        let value = json!({
            "Valg": {
                "Navn": "Kommunalvalg 2025",
                "Dato": "18-11-2025",
                "KommuneReference": {"Kode": 461, "Navn": "Odense"},
                "PersonligeMandater": [
                    {"MandatNummer": 1, "KandidatReference": {"Id": "C1", "Fornavn": "Mette", "Efternavn": "F"}}
                ]
            }
        });
        let p = source("mandatfordeling.json", value);
        let mut n = normalize(&p, &NormalizerSettings::default(), &NoCategoryLookup);
        assert_eq!(n.mandates.len(), 1);
        assert_eq!(n.mandates[0].party_id, "");
        let roster = vec![CandidateRow {
            election_type: ElectionType::MunicipalCouncil,
            election_date: "18-11-2025".to_string(),
            jurisdiction: "Odense".to_string(),
            municipality: "Odense".to_string(),
            municipality_code: None,
            region: String::new(),
            revision: None,
            party_id: "L1".to_string(),
            party_letter: "A".to_string(),
            party_name: "Socialdemokratiet".to_string(),
            list_ballot_position: String::new(),
            candidate_id: "C1".to_string(),
            full_name: "Mette F".to_string(),
            ballot_name: "Mette F".to_string(),
            first_name: "Mette".to_string(),
            last_name: "F".to_string(),
            occupation: String::new(),
            residence: String::new(),
            candidate_ballot_position: String::new(),
            category: CandidateCategory::Unknown,
            category_method: CategoryMethod::NotFound,
        }];
        assert_eq!(resolve_mandate_parties(&mut n.mandates, &roster), 1);
        assert_eq!(n.mandates[0].party_name, "Socialdemokratiet");
    }
}
