// Post-hoc re-derivation of the reconciliation invariants.
//
// Never mutates anything. Every figure is recomputed from the rows it
// describes and compared with what the earlier stages produced.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{info, warn};
use serde::Serialize;

use crate::aggregate::{round_percent, serialize_percent_opt, Aggregates, Ratio};
use crate::config::*;
use crate::reconcile::Reconciliation;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum Outcome {
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "warning")]
    Warning,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Check {
    pub election_type: Option<ElectionType>,
    pub name: String,
    pub outcome: Outcome,
    pub detail: String,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub success_rate_percent: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.outcome == Outcome::Fail)
    }
}

struct Checks {
    election_type: ElectionType,
    checks: Vec<Check>,
}

impl Checks {
    fn push(&mut self, name: &str, outcome: Outcome, detail: String) {
        if outcome != Outcome::Pass {
            warn!("validate: {} {}: {:?}: {}", self.election_type, name, outcome, detail);
        }
        self.checks.push(Check {
            election_type: Some(self.election_type),
            name: name.to_string(),
            outcome,
            detail,
        });
    }

    fn expect(&mut self, name: &str, ok: bool, detail: String) {
        let outcome = if ok { Outcome::Pass } else { Outcome::Fail };
        self.push(name, outcome, detail)
    }
}

/// Relative deviation in percent of `expected`.
fn relative_deviation(actual: u64, expected: u64) -> f64 {
    if expected == 0 {
        if actual == 0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (actual as f64 - expected as f64).abs() * 100.0 / expected as f64
    }
}

pub fn validate(
    rec: &Reconciliation,
    vote_results: &[VoteResultRow],
    aggregates: &Aggregates,
    reference: Option<&ReferenceTotals>,
    settings: &ValidationSettings,
    party_names: &PartyNameTable,
) -> ValidationReport {
    let mut checks: Vec<Check> = Vec::new();
    let present: Vec<ElectionType> = ElectionType::ALL
        .iter()
        .cloned()
        .filter(|t| rec.areas.iter().any(|a| a.election_type == *t))
        .collect();
    for election_type in present.iter() {
        let mut c = Checks {
            election_type: *election_type,
            checks: Vec::new(),
        };
        check_election(
            &mut c,
            rec,
            vote_results,
            aggregates,
            reference.and_then(|r| r.for_election(*election_type)),
            settings,
            party_names,
        );
        checks.extend(c.checks);
    }
    let passed = checks.iter().filter(|c| c.outcome == Outcome::Pass).count();
    let failed = checks.iter().filter(|c| c.outcome == Outcome::Fail).count();
    let warnings = checks.iter().filter(|c| c.outcome == Outcome::Warning).count();
    let summary = ValidationSummary {
        total: checks.len(),
        passed,
        failed,
        warnings,
        success_rate_percent: Ratio::new(passed as u64, checks.len() as u64).percent(),
    };
    info!(
        "validate: {} checks, {} passed, {} failed, {} warnings",
        summary.total, summary.passed, summary.failed, summary.warnings
    );
    ValidationReport { checks, summary }
}

fn check_election(
    c: &mut Checks,
    rec: &Reconciliation,
    vote_results: &[VoteResultRow],
    aggregates: &Aggregates,
    reference: Option<&ElectionReference>,
    settings: &ValidationSettings,
    party_names: &PartyNameTable,
) {
    let t = c.election_type;
    let areas: Vec<&AreaTotals> = rec.areas.iter().filter(|a| a.election_type == t).collect();
    let results: Vec<&ReconciledAreaResult> = rec.results.iter().filter(|r| r.election_type == t).collect();
    let rows: Vec<&VoteResultRow> = vote_results.iter().filter(|r| r.election_type == t).collect();

    // Σ list_total per area against the area's valid votes.
    let mut sums: HashMap<&str, u64> = HashMap::new();
    for r in results.iter() {
        *sums.entry(r.polling_area_id.as_str()).or_insert(0) += r.list_total;
    }
    let unbalanced = areas
        .iter()
        .filter(|a| sums.get(a.polling_area_id.as_str()).cloned().unwrap_or(0) != a.valid_votes)
        .count();
    c.expect(
        "area_vote_balance",
        unbalanced == 0,
        format!("{} of {} areas where party totals differ from valid votes", unbalanced, areas.len()),
    );

    let cast_mismatch = areas
        .iter()
        .filter(|a| a.votes_cast != a.valid_votes + a.invalid_votes + a.blank_votes)
        .count();
    c.expect(
        "cast_balance",
        cast_mismatch == 0,
        format!("{} areas where cast != valid + invalid + blank", cast_mismatch),
    );

    let over = results
        .iter()
        .filter(|r| r.personal_votes_total() > r.list_total)
        .count();
    c.expect(
        "personal_within_list_total",
        over == 0,
        format!("{} area-party records with personal votes above the list total", over),
    );

    let mut seen: HashSet<(&str, Option<&str>, &str)> = HashSet::new();
    let mut duplicates = 0;
    for r in rows.iter() {
        let k = (
            r.polling_area_id.as_str(),
            r.candidate_id.as_deref(),
            // Placeholder rows are keyed by their party.
            if r.candidate_id.is_none() { r.party_id.as_str() } else { "" },
        );
        if !seen.insert(k) {
            duplicates += 1;
        }
    }
    c.expect(
        "unique_area_candidate_keys",
        duplicates == 0,
        format!("{} duplicate (area, candidate) rows", duplicates),
    );

    // Party totals re-derived from the rows, one list_total per (area, party).
    let mut once: HashMap<(&str, &str), u64> = HashMap::new();
    for r in rows.iter() {
        once.entry((r.polling_area_id.as_str(), r.party_id.as_str()))
            .or_insert(r.list_total);
    }
    let rederived: u64 = once.values().sum();
    let reported: u64 = results.iter().map(|r| r.reported_list_total).sum();
    c.expect(
        "list_total_once_per_pair",
        rederived == reported,
        format!("re-derived {} against reconciled {}", rederived, reported),
    );

    // Jurisdiction roll-ups equal the sum of their areas.
    let mut by_jurisdiction: BTreeMap<&str, (u64, u64, u64)> = BTreeMap::new();
    for a in areas.iter() {
        let e = by_jurisdiction.entry(a.jurisdiction.as_str()).or_insert((0, 0, 0));
        e.0 += a.eligible_voters;
        e.1 += a.votes_cast;
        e.2 += a.valid_votes;
    }
    let rollups: Vec<_> = aggregates
        .turnout
        .iter()
        .filter(|r| r.election_type == t && r.jurisdiction.is_some())
        .collect();
    let rollup_mismatch = rollups
        .iter()
        .filter(|r| {
            let j = r.jurisdiction.as_deref().unwrap_or("");
            by_jurisdiction.get(j) != Some(&(r.eligible_voters, r.votes_cast, r.valid_votes))
        })
        .count();
    c.expect(
        "jurisdiction_rollups",
        rollup_mismatch == 0 && rollups.len() == by_jurisdiction.len(),
        format!(
            "{} of {} jurisdiction roll-ups differ from their areas",
            rollup_mismatch,
            rollups.len()
        ),
    );

    let mut out_of_range: Vec<String> = Vec::new();
    let mut unusual: Vec<String> = Vec::new();
    for r in rollups.iter() {
        if let Some(p) = r.turnout_percent {
            let j = r.jurisdiction.clone().unwrap_or_default();
            if !(0.0..=100.0).contains(&p) {
                out_of_range.push(j);
            } else if p < settings.low_turnout_warning || p > settings.high_turnout_warning {
                unusual.push(format!("{} ({})", j, round_percent(p)));
            }
        }
    }
    c.expect(
        "turnout_range",
        out_of_range.is_empty(),
        format!("turnout outside 0-100 %: {:?}", out_of_range),
    );
    if !unusual.is_empty() {
        c.push(
            "turnout_unusual",
            Outcome::Warning,
            format!(
                "turnout below {} % or above {} %: {}",
                settings.low_turnout_warning,
                settings.high_turnout_warning,
                unusual.join(", ")
            ),
        );
    }

    if let Some(reference) = reference {
        check_reference(c, &areas, &results, aggregates, reference, settings, party_names);
    }
}

fn check_reference(
    c: &mut Checks,
    areas: &[&AreaTotals],
    results: &[&ReconciledAreaResult],
    aggregates: &Aggregates,
    reference: &ElectionReference,
    settings: &ValidationSettings,
    party_names: &PartyNameTable,
) {
    let eligible: u64 = areas.iter().map(|a| a.eligible_voters).sum();
    let cast: u64 = areas.iter().map(|a| a.votes_cast).sum();
    let valid: u64 = areas.iter().map(|a| a.valid_votes).sum();
    let national = [
        ("national_eligible", eligible, reference.eligible),
        ("national_cast", cast, reference.cast),
        ("national_valid", valid, reference.valid),
    ];
    for (name, actual, expected) in national.iter() {
        // Absent reference values are skipped.
        if let Some(expected) = expected {
            let dev = relative_deviation(*actual, *expected);
            c.expect(
                name,
                dev <= settings.national_tolerance_percent,
                format!("{} against reference {} ({:.3} % off)", actual, expected, dev),
            );
        }
    }
    if let (Some(expected), Some(actual)) = (reference.turnout_percent, Ratio::new(cast, eligible).percent()) {
        c.expect(
            "national_turnout",
            (actual - expected).abs() <= settings.national_tolerance_percent,
            format!("{:.2} % against reference {} %", actual, expected),
        );
    }
    let mut party_totals: BTreeMap<String, u64> = BTreeMap::new();
    for r in results.iter() {
        *party_totals.entry(party_names.normalize(&r.party_name)).or_insert(0) += r.list_total;
    }
    for (party, expected) in reference.parties.iter() {
        let expected = match expected {
            Some(e) => *e,
            None => continue,
        };
        let actual = party_totals.get(&party_names.normalize(party)).cloned().unwrap_or(0);
        let dev = relative_deviation(actual, expected);
        c.expect(
            &format!("party_total:{}", party),
            dev <= settings.party_tolerance_percent,
            format!("{} against reference {} ({:.3} % off)", actual, expected, dev),
        );
    }

    let t = c.election_type;
    let mut by_jurisdiction: BTreeMap<(String, String), u64> = BTreeMap::new();
    for r in aggregates
        .party_totals_by_jurisdiction
        .iter()
        .filter(|r| r.election_type == Some(t))
    {
        let k = (
            r.jurisdiction.clone().unwrap_or_default(),
            party_names.normalize(r.party_name.as_deref().unwrap_or("")),
        );
        *by_jurisdiction.entry(k).or_insert(0) += r.votes;
    }
    for (jurisdiction, parties) in reference.jurisdictions.iter() {
        for (party, expected) in parties.iter() {
            let expected = match expected {
                Some(e) => *e,
                None => continue,
            };
            let actual = by_jurisdiction
                .get(&(jurisdiction.clone(), party_names.normalize(party)))
                .cloned()
                .unwrap_or(0);
            let dev = relative_deviation(actual, expected);
            c.expect(
                &format!("jurisdiction_party_total:{}:{}", jurisdiction, party),
                dev <= settings.party_tolerance_percent,
                format!("{} against reference {} ({:.3} % off)", actual, expected, dev),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::build_aggregates;
    use crate::builder::UpdateRecordBuilder;
    use crate::normalize::vote_result_rows;
    use crate::reconcile::reconcile;

    fn setup(valid_a: u64) -> (Reconciliation, Vec<VoteResultRow>, Aggregates) {
        let a = UpdateRecordBuilder::new("A1", "M1")
            .eligible_voters(200)
            .votes_cast(150)
            .valid_votes(valid_a)
            .invalid_votes(150 - valid_a)
            .party("Venstre, Danmarks Liberale Parti", valid_a - 40, 10)
            .candidate("C1", valid_a - 50)
            .party("Socialdemokratiet", 40, 40)
            .build();
        let rows = vote_result_rows(&a);
        let rec = reconcile(&rows);
        let agg = build_aggregates(&rec, &rows, &[], &[], &AnalysisSettings::DEFAULT_SETTINGS);
        (rec, rows, agg)
    }

    #[test]
    fn clean_data_passes() {
        let (rec, rows, agg) = setup(140);
        let report = validate(
            &rec,
            &rows,
            &agg,
            None,
            &ValidationSettings::DEFAULT_SETTINGS,
            &PartyNameTable::default(),
        );
        assert_eq!(report.summary.failed, 0);
        assert_eq!(report.summary.warnings, 0);
        assert_eq!(report.summary.success_rate_percent, Some(100.0));
    }

    #[test]
    fn reference_comparison() {
        let (rec, rows, agg) = setup(140);
        let mut parties = BTreeMap::new();
        parties.insert("Venstre".to_string(), Some(100));
        parties.insert("Socialdemokratiet".to_string(), Some(80));
        parties.insert("Enhedslisten".to_string(), None);
        let reference = ReferenceTotals {
            municipal: Some(ElectionReference {
                eligible: Some(200),
                cast: None,
                valid: Some(140),
                turnout_percent: Some(75.0),
                parties,
                jurisdictions: BTreeMap::new(),
            }),
            regional: None,
        };
        let report = validate(
            &rec,
            &rows,
            &agg,
            Some(&reference),
            &ValidationSettings::DEFAULT_SETTINGS,
            &PartyNameTable::default(),
        );
        let failed: Vec<&str> = report.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["party_total:Socialdemokratiet"]);
        assert!(report.checks.iter().any(|c| c.name == "party_total:Venstre" && c.outcome == Outcome::Pass));
        assert!(!report.checks.iter().any(|c| c.name == "national_cast"));
        assert!(!report.checks.iter().any(|c| c.name.contains("Enhedslisten")));
    }

    #[test]
    fn jurisdiction_reference() {
        let (rec, rows, agg) = setup(140);
        let mut m1 = BTreeMap::new();
        m1.insert("Venstre".to_string(), Some(100));
        m1.insert("Socialdemokratiet".to_string(), Some(45));
        m1.insert("Enhedslisten".to_string(), None);
        let mut jurisdictions = BTreeMap::new();
        jurisdictions.insert("M1".to_string(), m1);
        let reference = ReferenceTotals {
            municipal: Some(ElectionReference {
                jurisdictions,
                ..ElectionReference::default()
            }),
            regional: None,
        };
        let report = validate(
            &rec,
            &rows,
            &agg,
            Some(&reference),
            &ValidationSettings::DEFAULT_SETTINGS,
            &PartyNameTable::default(),
        );
        let failed: Vec<&str> = report.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["jurisdiction_party_total:M1:Socialdemokratiet"]);
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "jurisdiction_party_total:M1:Venstre" && c.outcome == Outcome::Pass));
        assert!(!report.checks.iter().any(|c| c.name.contains("Enhedslisten")));
    }

    #[test]
    fn unusual_turnout_warns() {
        let a = UpdateRecordBuilder::new("A1", "M1")
            .eligible_voters(100)
            .votes_cast(20)
            .valid_votes(20)
            .party("P1", 20, 20)
            .build();
        let rows = vote_result_rows(&a);
        let rec = reconcile(&rows);
        let agg = build_aggregates(&rec, &rows, &[], &[], &AnalysisSettings::DEFAULT_SETTINGS);
        let report = validate(
            &rec,
            &rows,
            &agg,
            None,
            &ValidationSettings::DEFAULT_SETTINGS,
            &PartyNameTable::default(),
        );
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.summary.failed, 0);
    }
}
