// Per polling area, per party reconciliation of list and personal votes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::*;
use crate::dedup::{polling_area_key, retain_newest_per_group};

/// Sums `value` per `group_key`, counting each distinct `pair_key` once.
///
/// The vote-result relation repeats party-level figures (such as `list_total`)
/// on every candidate row of the party. Summing them per row counts them once
/// per candidate; this takes the first value met for every pair instead.
/// Later rows of a pair carrying a different value are reported and ignored.
pub fn total_once_per_group<R, P, G, FP, FG, FV>(
    rows: &[R],
    pair_key: FP,
    group_key: FG,
    value: FV,
) -> BTreeMap<G, u64>
where
    P: Eq + Hash + std::fmt::Debug,
    G: Ord,
    FP: Fn(&R) -> P,
    FG: Fn(&R) -> G,
    FV: Fn(&R) -> u64,
{
    let mut seen: HashMap<P, u64> = HashMap::new();
    let mut res: BTreeMap<G, u64> = BTreeMap::new();
    for r in rows.iter() {
        let p = pair_key(r);
        let v = value(r);
        match seen.get(&p) {
            Some(first) => {
                if *first != v {
                    warn!(
                        "total_once_per_group: inconsistent values for {:?}: {} then {}; keeping the first",
                        p, first, v
                    );
                }
            }
            None => {
                seen.insert(p, v);
                *res.entry(group_key(r)).or_insert(0) += v;
            }
        }
    }
    res
}

/// Recoverable data-quality findings.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub enum ReconcileWarning {
    /// The candidates' personal votes exceed the published party total.
    PersonalExceedsList {
        election_type: ElectionType,
        polling_area_id: String,
        party_id: String,
        personal_votes: u64,
        list_total: u64,
        clamped_to: u64,
    },
    /// The party total exceeds the valid votes of the area.
    ListExceedsValid {
        election_type: ElectionType,
        polling_area_id: String,
        party_id: String,
        list_total: u64,
        valid_votes: u64,
    },
    /// list-only + personal votes differ from the published party total.
    ListOnlyMismatch {
        election_type: ElectionType,
        polling_area_id: String,
        party_id: String,
        list_only_votes: u64,
        personal_votes: u64,
        list_total: u64,
    },
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum FlagReason {
    /// The party totals do not add up to the valid votes.
    Unbalanced,
    /// Some party's personal votes exceed the valid votes of the area, so
    /// they still exceed its capped list total.
    PersonalExceedsValid,
}

/// A polling area kept in the output but marked for manual review.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct AreaFlag {
    pub election_type: ElectionType,
    pub jurisdiction: String,
    pub polling_area_id: String,
    pub polling_area_name: String,
    pub list_total_sum: u64,
    pub valid_votes: u64,
    pub reason: FlagReason,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Reconciliation {
    pub results: Vec<ReconciledAreaResult>,
    pub areas: Vec<AreaTotals>,
    pub warnings: Vec<ReconcileWarning>,
    pub flagged_areas: Vec<AreaFlag>,
}

impl Reconciliation {
    pub fn clamped_count(&self) -> usize {
        self.results.iter().filter(|r| r.was_clamped()).count()
    }

    pub fn is_flagged(&self, election_type: ElectionType, polling_area_id: &str) -> bool {
        self.flagged_areas
            .iter()
            .any(|f| f.election_type == election_type && f.polling_area_id == polling_area_id)
    }

    pub fn results_for(&self, election_type: ElectionType) -> Vec<ReconciledAreaResult> {
        self.results
            .iter()
            .filter(|r| r.election_type == election_type)
            .cloned()
            .collect()
    }
}

type AreaKey = (ElectionType, String);
type PartyKey = (ElectionType, String, String);

fn area_key(r: &VoteResultRow) -> AreaKey {
    (r.election_type, r.polling_area_id.clone())
}

fn party_key(r: &VoteResultRow) -> PartyKey {
    (r.election_type, r.polling_area_id.clone(), r.party_id.clone())
}

/// Builds one authoritative record per (polling area, party) from
/// deduplicated vote-result rows.
///
/// Only the newest publication of every polling area is read, so area-level
/// and party-level figures never come from a superseded update.
pub fn reconcile(rows: &[VoteResultRow]) -> Reconciliation {
    let fresh = retain_newest_per_group(rows.to_vec(), polling_area_key);
    if fresh.removed > 0 {
        warn!("reconcile: ignoring {} rows of superseded publications", fresh.removed);
    }
    let rows = fresh.rows.as_slice();
    // Area-level figures are repeated on every row of one publication.
    let mut areas: BTreeMap<AreaKey, AreaTotals> = BTreeMap::new();
    for r in rows.iter() {
        areas.entry(area_key(r)).or_insert_with(|| AreaTotals {
            election_type: r.election_type,
            jurisdiction: r.jurisdiction.clone(),
            municipality: r.municipality.clone(),
            polling_area_id: r.polling_area_id.clone(),
            polling_area_name: r.polling_area_name.clone(),
            eligible_voters: r.eligible_voters,
            votes_cast: r.votes_cast,
            valid_votes: r.valid_votes,
            invalid_votes: r.invalid_votes,
            blank_votes: r.blank_votes,
        });
    }

    // Pass 1: party totals, once per (area, party).
    let list_totals = total_once_per_group(rows, party_key, party_key, |r| r.list_total);
    let list_only = total_once_per_group(rows, party_key, party_key, |r| r.list_only_votes);

    // Pass 2: personal votes, one distinct value per candidate row.
    let mut personal: BTreeMap<PartyKey, BTreeMap<String, u64>> = BTreeMap::new();
    let mut party_names: HashMap<PartyKey, String> = HashMap::new();
    for r in rows.iter() {
        let k = party_key(r);
        let by_candidate = personal.entry(k.clone()).or_default();
        if let Some(cid) = &r.candidate_id {
            *by_candidate.entry(cid.clone()).or_insert(0) += r.personal_votes;
        }
        party_names.entry(k).or_insert_with(|| r.party_name.clone());
    }

    let mut res = Reconciliation::default();
    let mut overshooting: BTreeSet<AreaKey> = BTreeSet::new();
    for (k, reported) in list_totals.iter() {
        let (election_type, polling_area_id, party_id) = k;
        let area = match areas.get(&(*election_type, polling_area_id.clone())) {
            Some(a) => a,
            None => continue,
        };
        let by_candidate = personal.remove(k).unwrap_or_default();
        let personal_total: u64 = by_candidate.values().sum();
        let list_only_votes = list_only.get(k).cloned().unwrap_or(0);
        let mut list_total = *reported;

        if list_only_votes + personal_total != *reported && list_only_votes > 0 {
            debug!(
                "reconcile: {:?}: list-only {} + personal {} != list total {}",
                k, list_only_votes, personal_total, reported
            );
            res.warnings.push(ReconcileWarning::ListOnlyMismatch {
                election_type: *election_type,
                polling_area_id: polling_area_id.clone(),
                party_id: party_id.clone(),
                list_only_votes,
                personal_votes: personal_total,
                list_total: *reported,
            });
        }
        if personal_total > list_total {
            let clamped_to = personal_total.min(area.valid_votes);
            warn!(
                "reconcile: {} area {} party {}: personal votes {} exceed list total {}; clamping to {}",
                election_type, polling_area_id, party_id, personal_total, list_total, clamped_to
            );
            res.warnings.push(ReconcileWarning::PersonalExceedsList {
                election_type: *election_type,
                polling_area_id: polling_area_id.clone(),
                party_id: party_id.clone(),
                personal_votes: personal_total,
                list_total,
                clamped_to,
            });
            list_total = clamped_to;
        }
        if list_total > area.valid_votes {
            warn!(
                "reconcile: {} area {} party {}: list total {} exceeds valid votes {}; clamping",
                election_type, polling_area_id, party_id, list_total, area.valid_votes
            );
            res.warnings.push(ReconcileWarning::ListExceedsValid {
                election_type: *election_type,
                polling_area_id: polling_area_id.clone(),
                party_id: party_id.clone(),
                list_total,
                valid_votes: area.valid_votes,
            });
            list_total = area.valid_votes;
        }
        if personal_total > list_total {
            overshooting.insert((*election_type, polling_area_id.clone()));
        }
        res.results.push(ReconciledAreaResult {
            election_type: *election_type,
            jurisdiction: area.jurisdiction.clone(),
            municipality: area.municipality.clone(),
            polling_area_id: polling_area_id.clone(),
            polling_area_name: area.polling_area_name.clone(),
            party_id: party_id.clone(),
            party_name: party_names.get(k).cloned().unwrap_or_default(),
            list_total,
            reported_list_total: *reported,
            list_only_votes,
            personal_votes_by_candidate: by_candidate,
            valid_votes_in_area: area.valid_votes,
        });
    }

    // Area balance: the parties must account for every valid vote.
    let mut sums: BTreeMap<AreaKey, u64> = BTreeMap::new();
    for r in res.results.iter() {
        *sums
            .entry((r.election_type, r.polling_area_id.clone()))
            .or_insert(0) += r.list_total;
    }
    for (k, area) in areas.iter() {
        let sum = sums.get(k).cloned().unwrap_or(0);
        let reason = if sum != area.valid_votes {
            FlagReason::Unbalanced
        } else if overshooting.contains(k) {
            FlagReason::PersonalExceedsValid
        } else {
            continue;
        };
        warn!(
            "reconcile: {} area {} ({}) flagged for review ({:?}): parties sum to {}, valid votes are {}",
            area.election_type, area.polling_area_id, area.jurisdiction, reason, sum, area.valid_votes
        );
        res.flagged_areas.push(AreaFlag {
            election_type: area.election_type,
            jurisdiction: area.jurisdiction.clone(),
            polling_area_id: area.polling_area_id.clone(),
            polling_area_name: area.polling_area_name.clone(),
            list_total_sum: sum,
            valid_votes: area.valid_votes,
            reason,
        });
    }
    res.areas = areas.into_values().collect();
    info!(
        "reconcile: {} area-party records over {} areas, {} clamped, {} areas flagged, {} warnings",
        res.results.len(),
        res.areas.len(),
        res.clamped_count(),
        res.flagged_areas.len(),
        res.warnings.len()
    );
    res
}
