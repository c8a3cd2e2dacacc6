// Freshness deduplication: one row per natural key, the newest revision wins.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info};

use crate::config::*;

/// A row that carries (or may carry) a revision timestamp.
pub trait Revisioned {
    fn revision(&self) -> Option<&str>;
}

impl Revisioned for VoteResultRow {
    fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

impl Revisioned for MandateRow {
    fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

impl Revisioned for CandidateRow {
    fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Deduplicated<R> {
    pub rows: Vec<R>,
    pub removed: usize,
    /// False when the relation carries no revision at all and was passed through.
    pub applied: bool,
}

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a publication timestamp. Offsets are folded into UTC.
/// Returns `None` for anything unreadable.
pub fn parse_revision(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    let without_zone = s.trim_end_matches('Z');
    for fmt in NAIVE_FORMATS.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(without_zone, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Retains exactly one row per key: the one with the latest revision.
///
/// Unreadable or missing revisions rank below every readable one. On equal
/// revisions the row met first wins. The surviving rows keep their input order.
/// When no row carries a revision the input is returned unchanged.
pub fn deduplicate<R, K, F>(rows: Vec<R>, key: F) -> Deduplicated<R>
where
    R: Revisioned,
    K: Eq + Hash,
    F: Fn(&R) -> K,
{
    if !rows.iter().any(|r| r.revision().is_some()) {
        debug!("deduplicate: no revision field on {} rows, nothing to do", rows.len());
        return Deduplicated {
            rows,
            removed: 0,
            applied: false,
        };
    }
    let stamps: Vec<Option<NaiveDateTime>> = rows
        .iter()
        .map(|r| r.revision().and_then(parse_revision))
        .collect();
    let mut winners: HashMap<K, usize> = HashMap::new();
    for (idx, r) in rows.iter().enumerate() {
        let k = key(r);
        match winners.get_mut(&k) {
            Some(current) => {
                // Option orders None below any Some.
                if stamps[idx] > stamps[*current] {
                    *current = idx;
                }
            }
            None => {
                winners.insert(k, idx);
            }
        }
    }
    let mut keep = vec![false; rows.len()];
    for idx in winners.values() {
        keep[*idx] = true;
    }
    let total = rows.len();
    let kept: Vec<R> = rows
        .into_iter()
        .zip(keep)
        .filter_map(|(r, k)| if k { Some(r) } else { None })
        .collect();
    let removed = total - kept.len();
    Deduplicated {
        rows: kept,
        removed,
        applied: true,
    }
}

/// Retains, per group, only the rows of the newest revision present in that
/// group.
///
/// A polling area (or a mandate distribution) is published as a whole, so a
/// newer publication supersedes every row of the older one, including rows
/// whose key does not reappear. Rows sharing the newest revision are all kept.
/// When no row carries a revision the input is returned unchanged.
pub fn retain_newest_per_group<R, G, F>(rows: Vec<R>, group: F) -> Deduplicated<R>
where
    R: Revisioned,
    G: Eq + Hash,
    F: Fn(&R) -> G,
{
    if !rows.iter().any(|r| r.revision().is_some()) {
        return Deduplicated {
            rows,
            removed: 0,
            applied: false,
        };
    }
    let stamps: Vec<Option<NaiveDateTime>> = rows
        .iter()
        .map(|r| r.revision().and_then(parse_revision))
        .collect();
    let mut newest: HashMap<G, Option<NaiveDateTime>> = HashMap::new();
    for (idx, r) in rows.iter().enumerate() {
        let current = newest.entry(group(r)).or_insert(stamps[idx]);
        if stamps[idx] > *current {
            *current = stamps[idx];
        }
    }
    let total = rows.len();
    let kept: Vec<R> = rows
        .into_iter()
        .zip(stamps)
        .filter(|(r, stamp)| newest.get(&group(r)).map_or(true, |n| stamp >= n))
        .map(|(r, _)| r)
        .collect();
    let removed = total - kept.len();
    if removed > 0 {
        debug!("retain_newest_per_group: dropped {} superseded rows", removed);
    }
    Deduplicated {
        rows: kept,
        removed,
        applied: true,
    }
}

/// What a vote-result row counts votes for.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum VoteTarget {
    Candidate(String),
    /// Placeholder for a list with no candidate in the area.
    ListOnly(String),
}

pub fn polling_area_key(r: &VoteResultRow) -> (ElectionType, String) {
    (r.election_type, r.polling_area_id.clone())
}

pub fn vote_result_key(r: &VoteResultRow) -> (ElectionType, String, VoteTarget) {
    let target = match &r.candidate_id {
        Some(c) => VoteTarget::Candidate(c.clone()),
        None => VoteTarget::ListOnly(r.party_id.clone()),
    };
    (r.election_type, r.polling_area_id.clone(), target)
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum MandateKey {
    Candidate {
        election_type: ElectionType,
        jurisdiction: String,
        candidate_id: String,
    },
    Seat {
        election_type: ElectionType,
        jurisdiction: String,
        mandate_type: MandateType,
        party_id: String,
        number: u64,
    },
}

pub fn mandate_key(r: &MandateRow) -> MandateKey {
    match &r.candidate_id {
        Some(c) => MandateKey::Candidate {
            election_type: r.election_type,
            jurisdiction: r.jurisdiction.clone(),
            candidate_id: c.clone(),
        },
        None => MandateKey::Seat {
            election_type: r.election_type,
            jurisdiction: r.jurisdiction.clone(),
            mandate_type: r.mandate_type,
            party_id: r.party_id.clone(),
            number: r.number,
        },
    }
}

pub fn mandate_jurisdiction_key(r: &MandateRow) -> (ElectionType, String) {
    (r.election_type, r.jurisdiction.clone())
}

pub fn candidate_key(r: &CandidateRow) -> (ElectionType, String, String) {
    (r.election_type, r.jurisdiction.clone(), r.candidate_id.clone())
}

/// Counts of rows removed from each relation.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct DedupStats {
    pub candidates_removed: usize,
    pub vote_results_removed: usize,
    pub mandates_removed: usize,
}

/// Deduplicates the three relations independently.
///
/// Vote results are first reduced to the newest publication of every polling
/// area, mandates to the newest distribution of every jurisdiction; then each
/// relation keeps one row per key.
pub fn deduplicate_relations(
    candidates: Vec<CandidateRow>,
    vote_results: Vec<VoteResultRow>,
    mandates: Vec<MandateRow>,
) -> (Vec<CandidateRow>, Vec<VoteResultRow>, Vec<MandateRow>, DedupStats) {
    let c = deduplicate(candidates, candidate_key);
    let v_areas = retain_newest_per_group(vote_results, polling_area_key);
    let v = deduplicate(v_areas.rows, vote_result_key);
    let m_jurisdictions = retain_newest_per_group(mandates, mandate_jurisdiction_key);
    let m = deduplicate(m_jurisdictions.rows, mandate_key);
    let stats = DedupStats {
        candidates_removed: c.removed,
        vote_results_removed: v_areas.removed + v.removed,
        mandates_removed: m_jurisdictions.removed + m.removed,
    };
    info!(
        "deduplicate_relations: removed {} candidate rows, {} vote-result rows, {} mandate rows",
        stats.candidates_removed, stats.vote_results_removed, stats.mandates_removed
    );
    (c.rows, v.rows, m.rows, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[derive(PartialEq, Debug, Clone)]
    struct Row {
        key: u8,
        rev: Option<String>,
        value: u32,
    }

    impl Revisioned for Row {
        fn revision(&self) -> Option<&str> {
            self.rev.as_deref()
        }
    }

    fn row(key: u8, rev: Option<&str>, value: u32) -> Row {
        Row {
            key,
            rev: rev.map(|s| s.to_string()),
            value,
        }
    }

    #[test]
    fn parse_formats() {
        assert!(parse_revision("2025-11-19T01:02:03Z").is_some());
        assert!(parse_revision("2025-11-19T01:02:03.123+01:00").is_some());
        assert!(parse_revision("2025-11-19 01:02:03").is_some());
        assert!(parse_revision("2025-11-19T01:02:03.5").is_some());
        assert!(parse_revision("2025-11-19").is_some());
        assert_eq!(parse_revision("not a date"), None);
        assert_eq!(parse_revision(""), None);
        assert!(parse_revision("2025-11-19T02:00:00+01:00") == parse_revision("2025-11-19T01:00:00Z"));
    }

    #[test]
    fn newest_wins() {
        let rows = vec![
            row(1, Some("2025-11-19T01:00:00Z"), 10),
            row(1, Some("2025-11-19T02:00:00Z"), 12),
            row(2, Some("2025-11-19T00:00:00Z"), 7),
        ];
        let d = deduplicate(rows, |r| r.key);
        assert_eq!(d.removed, 1);
        assert!(d.applied);
        assert_eq!(
            d.rows,
            vec![row(1, Some("2025-11-19T02:00:00Z"), 12), row(2, Some("2025-11-19T00:00:00Z"), 7)]
        );
    }

    #[test]
    fn tie_keeps_first() {
        let rows = vec![
            row(1, Some("2025-11-19T01:00:00Z"), 1),
            row(1, Some("2025-11-19T01:00:00Z"), 2),
        ];
        let d = deduplicate(rows, |r| r.key);
        assert_eq!(d.rows, vec![row(1, Some("2025-11-19T01:00:00Z"), 1)]);
    }

    #[test]
    fn unparseable_is_never_freshest() {
        let rows = vec![
            row(1, Some("garbage"), 1),
            row(1, Some("2020-01-01T00:00:00Z"), 2),
            row(1, None, 3),
        ];
        let d = deduplicate(rows, |r| r.key);
        assert_eq!(d.rows, vec![row(1, Some("2020-01-01T00:00:00Z"), 2)]);
        assert_eq!(d.removed, 2);
    }

    #[test]
    fn no_revision_is_a_no_op() {
        let rows = vec![row(1, None, 1), row(1, None, 2)];
        let d = deduplicate(rows.clone(), |r| r.key);
        assert!(!d.applied);
        assert_eq!(d.removed, 0);
        assert_eq!(d.rows, rows);
    }

    fn mandate(
        rev: &str,
        mandate_type: MandateType,
        number: u64,
        candidate_id: Option<&str>,
        party_id: &str,
    ) -> MandateRow {
        MandateRow {
            election_type: ElectionType::MunicipalCouncil,
            election_date: "18-11-2025".to_string(),
            jurisdiction: "Odense".to_string(),
            municipality: "Odense".to_string(),
            municipality_code: Some("461".to_string()),
            region: String::new(),
            revision: Some(rev.to_string()),
            mandate_type,
            number,
            number_on_list: None,
            candidate_id: candidate_id.map(|c| c.to_string()),
            ballot_name: String::new(),
            party_id: party_id.to_string(),
            party_letter: String::new(),
            party_name: party_id.to_string(),
        }
    }

    fn candidate(rev: &str, jurisdiction: &str, candidate_id: &str, occupation: &str) -> CandidateRow {
        CandidateRow {
            election_type: ElectionType::MunicipalCouncil,
            election_date: "18-11-2025".to_string(),
            jurisdiction: jurisdiction.to_string(),
            municipality: jurisdiction.to_string(),
            municipality_code: None,
            region: String::new(),
            revision: Some(rev.to_string()),
            party_id: "L1".to_string(),
            party_letter: "A".to_string(),
            party_name: "Socialdemokratiet".to_string(),
            list_ballot_position: String::new(),
            candidate_id: candidate_id.to_string(),
            full_name: candidate_id.to_string(),
            ballot_name: candidate_id.to_string(),
            first_name: candidate_id.to_string(),
            last_name: String::new(),
            occupation: occupation.to_string(),
            residence: String::new(),
            candidate_ballot_position: String::new(),
            category: CandidateCategory::Unknown,
            category_method: CategoryMethod::NotFound,
        }
    }

    const T1: &str = "2025-11-19T01:00:00Z";
    const T2: &str = "2025-11-19T02:00:00Z";

    #[test]
    fn mandate_key_shapes() {
        let personal = mandate(T1, MandateType::PersonalSeat, 1, Some("C1"), "L1");
        assert_eq!(
            mandate_key(&personal),
            MandateKey::Candidate {
                election_type: ElectionType::MunicipalCouncil,
                jurisdiction: "Odense".to_string(),
                candidate_id: "C1".to_string(),
            }
        );
        // The same candidate under another number is still the same mandate.
        let renumbered = mandate(T2, MandateType::PersonalSeat, 4, Some("C1"), "L1");
        assert_eq!(mandate_key(&personal), mandate_key(&renumbered));

        let list_seat = mandate(T1, MandateType::ListSeat, 2, None, "L2");
        assert_eq!(
            mandate_key(&list_seat),
            MandateKey::Seat {
                election_type: ElectionType::MunicipalCouncil,
                jurisdiction: "Odense".to_string(),
                mandate_type: MandateType::ListSeat,
                party_id: "L2".to_string(),
                number: 2,
            }
        );
        let alternate = mandate(T1, MandateType::Alternate, 2, None, "L2");
        assert_ne!(mandate_key(&list_seat), mandate_key(&alternate));
        let other_number = mandate(T1, MandateType::Alternate, 3, None, "L2");
        assert_ne!(mandate_key(&alternate), mandate_key(&other_number));
    }

    #[test]
    fn candidate_key_is_per_jurisdiction() {
        let a = candidate(T1, "Odense", "C1", "");
        let b = candidate(T1, "Aarhus", "C1", "");
        assert_eq!(
            candidate_key(&a),
            (ElectionType::MunicipalCouncil, "Odense".to_string(), "C1".to_string())
        );
        assert_ne!(candidate_key(&a), candidate_key(&b));
    }

    #[test]
    fn newer_mandate_distribution_supersedes_older() {
        let mandates = vec![
            mandate(T1, MandateType::PersonalSeat, 1, Some("C1"), "L1"),
            mandate(T1, MandateType::PersonalSeat, 2, Some("C2"), "L1"),
            mandate(T1, MandateType::ListSeat, 3, None, "L2"),
            mandate(T2, MandateType::PersonalSeat, 1, Some("C1"), "L1"),
            mandate(T2, MandateType::PersonalSeat, 2, Some("C3"), "L1"),
        ];
        let (_, _, kept, stats) = deduplicate_relations(Vec::new(), Vec::new(), mandates);
        assert_eq!(stats.mandates_removed, 3);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|m| m.revision.as_deref() == Some(T2)));
        let ids: Vec<Option<&str>> = kept.iter().map(|m| m.candidate_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("C1"), Some("C3")]);
    }

    #[test]
    fn roster_keeps_newest_entry_per_candidate() {
        let candidates = vec![
            candidate(T1, "Odense", "C1", "Lærer"),
            candidate(T1, "Odense", "C2", "Smed"),
            candidate(T2, "Odense", "C1", "Skoleleder"),
            candidate(T1, "Aarhus", "C1", "Lærer"),
        ];
        let (kept, _, _, stats) = deduplicate_relations(candidates, Vec::new(), Vec::new());
        assert_eq!(stats.candidates_removed, 1);
        assert_eq!(stats.vote_results_removed, 0);
        assert_eq!(kept.len(), 3);
        let odense_c1 = kept
            .iter()
            .find(|c| c.jurisdiction == "Odense" && c.candidate_id == "C1")
            .unwrap();
        assert_eq!(odense_c1.occupation, "Skoleleder");
    }

    #[test]
    fn newest_group_keeps_all_its_rows() {
        let rows = vec![
            row(1, Some("2025-11-19T01:00:00Z"), 1),
            row(1, Some("2025-11-19T02:00:00Z"), 2),
            row(1, Some("2025-11-19T02:00:00Z"), 3),
            row(2, None, 4),
        ];
        let d = retain_newest_per_group(rows, |r| r.key);
        assert_eq!(d.removed, 1);
        assert_eq!(d.rows.iter().map(|r| r.value).collect::<Vec<u32>>(), vec![2, 3, 4]);
    }

    fn arb_rows() -> impl Strategy<Value = Vec<Row>> {
        prop::collection::vec((0u8..6, prop::option::of(0u32..30), any::<u32>()), 0..40).prop_map(
            |v| {
                v.into_iter()
                    .map(|(key, hour, value)| Row {
                        key,
                        // Hours above 23 produce unreadable timestamps.
                        rev: hour.map(|h| format!("2025-11-19T{:02}:00:00Z", h)),
                        value,
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn dedup_is_idempotent(rows in arb_rows()) {
            let once = deduplicate(rows, |r| r.key);
            let twice = deduplicate(once.rows.clone(), |r| r.key);
            prop_assert_eq!(twice.removed, 0);
            prop_assert_eq!(&twice.rows, &once.rows);
        }

        #[test]
        fn dedup_keys_are_unique(rows in arb_rows()) {
            let n = rows.len();
            let distinct: HashSet<u8> = rows.iter().map(|r| r.key).collect();
            let any_rev = rows.iter().any(|r| r.rev.is_some());
            let d = deduplicate(rows, |r| r.key);
            if any_rev {
                prop_assert_eq!(d.rows.len(), distinct.len());
            }
            prop_assert_eq!(d.rows.len() + d.removed, n);
        }
    }
}
