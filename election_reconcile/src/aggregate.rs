// Grouped roll-ups over the reconciled relation.
//
// Additive figures are summed. Ratios are always recomputed from the summed
// numerator and denominator of the group; per-row percentages are never averaged.

use std::collections::{BTreeMap, BTreeSet};

use log::info;
use serde::{Serialize, Serializer};

use crate::config::*;
use crate::reconcile::{total_once_per_group, Reconciliation};

/// An exact ratio of two counts.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct Ratio {
    pub numerator: u64,
    pub denominator: u64,
}

impl Ratio {
    pub fn new(numerator: u64, denominator: u64) -> Ratio {
        Ratio {
            numerator,
            denominator,
        }
    }

    /// Full-precision percentage, `None` when the denominator is zero.
    pub fn percent(&self) -> Option<f64> {
        if self.denominator == 0 {
            None
        } else {
            Some(self.numerator as f64 * 100.0 / self.denominator as f64)
        }
    }
}

/// Rounds to one decimal, ties to even. Only used at presentation.
pub fn round_percent(x: f64) -> f64 {
    (x * 10.0).round_ties_even() / 10.0
}

pub fn serialize_percent<S: Serializer>(x: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_percent(*x))
}

pub fn serialize_percent_opt<S: Serializer>(x: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match x {
        Some(v) => s.serialize_some(&round_percent(*v)),
        None => s.serialize_none(),
    }
}

/// Sorts by `metric` descending, then by `key` ascending, and truncates.
pub fn rank_descending<T, K, FM, FK>(rows: &mut Vec<T>, metric: FM, key: FK, limit: Option<usize>)
where
    K: Ord,
    FM: Fn(&T) -> f64,
    FK: Fn(&T) -> K,
{
    rows.sort_by(|a, b| metric(b).total_cmp(&metric(a)).then_with(|| key(a).cmp(&key(b))));
    if let Some(l) = limit {
        rows.truncate(l);
    }
}

/// Which dimensions a roll-up keeps.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct GroupBy {
    pub election_type: bool,
    pub jurisdiction: bool,
    pub party: bool,
}

impl GroupBy {
    pub const JURISDICTION_PARTY: GroupBy = GroupBy {
        election_type: true,
        jurisdiction: true,
        party: true,
    };
    pub const NATIONAL_PARTY: GroupBy = GroupBy {
        election_type: true,
        jurisdiction: false,
        party: true,
    };
    pub const JURISDICTION: GroupBy = GroupBy {
        election_type: true,
        jurisdiction: true,
        party: false,
    };
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Serialize)]
pub struct GroupKey {
    pub election_type: Option<ElectionType>,
    pub jurisdiction: Option<String>,
    pub party_name: Option<String>,
}

impl GroupKey {
    fn of(by: GroupBy, election_type: ElectionType, jurisdiction: &str, party_name: Option<&str>) -> GroupKey {
        GroupKey {
            election_type: if by.election_type { Some(election_type) } else { None },
            jurisdiction: if by.jurisdiction {
                Some(jurisdiction.to_string())
            } else {
                None
            },
            party_name: if by.party {
                party_name.map(|s| s.to_string())
            } else {
                None
            },
        }
    }

    fn without_party(&self) -> GroupKey {
        GroupKey {
            party_name: None,
            ..self.clone()
        }
    }
}

/// Votes of a group and the valid votes of the surrounding group.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Rollup {
    pub election_type: Option<ElectionType>,
    pub jurisdiction: Option<String>,
    pub party_name: Option<String>,
    pub votes: u64,
    pub valid_votes: u64,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub share_percent: Option<f64>,
}

/// Sums party totals over the requested dimensions. The share denominator is
/// the valid votes of every area in the group, whether the party ran there or not.
pub fn roll_up(rec: &Reconciliation, by: GroupBy) -> Vec<Rollup> {
    let mut votes: BTreeMap<GroupKey, u64> = BTreeMap::new();
    for r in rec.results.iter() {
        let k = GroupKey::of(by, r.election_type, &r.jurisdiction, Some(&r.party_name));
        *votes.entry(k).or_insert(0) += r.list_total;
    }
    let valid = total_once_per_group(
        &rec.areas,
        |a| (a.election_type, a.polling_area_id.clone()),
        |a| GroupKey::of(by, a.election_type, &a.jurisdiction, None),
        |a| a.valid_votes,
    );
    votes
        .into_iter()
        .map(|(k, v)| {
            let denominator = valid.get(&k.without_party()).cloned().unwrap_or(0);
            Rollup {
                share_percent: Ratio::new(v, denominator).percent(),
                election_type: k.election_type,
                jurisdiction: k.jurisdiction,
                party_name: k.party_name,
                votes: v,
                valid_votes: denominator,
            }
        })
        .collect()
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct AreaPartyTotal {
    pub election_type: ElectionType,
    pub jurisdiction: String,
    pub polling_area_id: String,
    pub polling_area_name: String,
    pub party_name: String,
    pub votes: u64,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub share_percent: Option<f64>,
}

/// Per polling area party table, by jurisdiction, area, then votes descending.
pub fn area_party_totals(rec: &Reconciliation) -> Vec<AreaPartyTotal> {
    let mut res: Vec<AreaPartyTotal> = rec
        .results
        .iter()
        .map(|r| AreaPartyTotal {
            election_type: r.election_type,
            jurisdiction: r.jurisdiction.clone(),
            polling_area_id: r.polling_area_id.clone(),
            polling_area_name: r.polling_area_name.clone(),
            party_name: r.party_name.clone(),
            votes: r.list_total,
            share_percent: r.area_share().percent(),
        })
        .collect();
    res.sort_by(|a, b| {
        (a.election_type, &a.jurisdiction, &a.polling_area_id)
            .cmp(&(b.election_type, &b.jurisdiction, &b.polling_area_id))
            .then_with(|| b.votes.cmp(&a.votes))
            .then_with(|| a.party_name.cmp(&b.party_name))
    });
    res
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct TurnoutRollup {
    pub election_type: ElectionType,
    /// `None` for the national figure.
    pub jurisdiction: Option<String>,
    pub areas: usize,
    pub eligible_voters: u64,
    pub votes_cast: u64,
    pub valid_votes: u64,
    pub invalid_votes: u64,
    pub blank_votes: u64,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub turnout_percent: Option<f64>,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub valid_share_percent: Option<f64>,
}

impl TurnoutRollup {
    fn empty(election_type: ElectionType, jurisdiction: Option<String>) -> TurnoutRollup {
        TurnoutRollup {
            election_type,
            jurisdiction,
            areas: 0,
            eligible_voters: 0,
            votes_cast: 0,
            valid_votes: 0,
            invalid_votes: 0,
            blank_votes: 0,
            turnout_percent: None,
            valid_share_percent: None,
        }
    }

    fn add(&mut self, a: &AreaTotals) {
        self.areas += 1;
        self.eligible_voters += a.eligible_voters;
        self.votes_cast += a.votes_cast;
        self.valid_votes += a.valid_votes;
        self.invalid_votes += a.invalid_votes;
        self.blank_votes += a.blank_votes;
    }

    fn finish(mut self) -> TurnoutRollup {
        self.turnout_percent = Ratio::new(self.votes_cast, self.eligible_voters).percent();
        self.valid_share_percent = Ratio::new(self.valid_votes, self.votes_cast).percent();
        self
    }
}

/// Turnout per jurisdiction, then one national line per election type.
pub fn turnout(areas: &[AreaTotals]) -> Vec<TurnoutRollup> {
    let mut by_jurisdiction: BTreeMap<(ElectionType, String), TurnoutRollup> = BTreeMap::new();
    let mut national: BTreeMap<ElectionType, TurnoutRollup> = BTreeMap::new();
    for a in areas.iter() {
        by_jurisdiction
            .entry((a.election_type, a.jurisdiction.clone()))
            .or_insert_with(|| TurnoutRollup::empty(a.election_type, Some(a.jurisdiction.clone())))
            .add(a);
        national
            .entry(a.election_type)
            .or_insert_with(|| TurnoutRollup::empty(a.election_type, None))
            .add(a);
    }
    by_jurisdiction
        .into_values()
        .chain(national.into_values())
        .map(|t| t.finish())
        .collect()
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct GenderBalance {
    pub election_type: ElectionType,
    /// `None` for all parties together.
    pub party_name: Option<String>,
    pub female: u64,
    pub male: u64,
    pub unknown: u64,
    pub elected_female: u64,
    pub elected_male: u64,
    pub elected_unknown: u64,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub female_share_percent: Option<f64>,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub elected_female_share_percent: Option<f64>,
}

impl GenderBalance {
    fn empty(election_type: ElectionType, party_name: Option<String>) -> GenderBalance {
        GenderBalance {
            election_type,
            party_name,
            female: 0,
            male: 0,
            unknown: 0,
            elected_female: 0,
            elected_male: 0,
            elected_unknown: 0,
            female_share_percent: None,
            elected_female_share_percent: None,
        }
    }

    fn add(&mut self, category: CandidateCategory, elected: bool) {
        match category {
            CandidateCategory::Female => self.female += 1,
            CandidateCategory::Male => self.male += 1,
            CandidateCategory::Unknown => self.unknown += 1,
        }
        if elected {
            match category {
                CandidateCategory::Female => self.elected_female += 1,
                CandidateCategory::Male => self.elected_male += 1,
                CandidateCategory::Unknown => self.elected_unknown += 1,
            }
        }
    }

    fn finish(mut self) -> GenderBalance {
        // Shares are of the candidates whose category is known.
        self.female_share_percent = Ratio::new(self.female, self.female + self.male).percent();
        self.elected_female_share_percent =
            Ratio::new(self.elected_female, self.elected_female + self.elected_male).percent();
        self
    }
}

/// The candidates holding a seat, by (election type, jurisdiction, candidate).
pub fn elected_set(mandates: &[MandateRow]) -> BTreeSet<(ElectionType, String, String)> {
    mandates
        .iter()
        .filter(|m| m.mandate_type.is_seat())
        .filter_map(|m| {
            m.candidate_id
                .as_ref()
                .map(|c| (m.election_type, m.jurisdiction.clone(), c.clone()))
        })
        .collect()
}

pub fn gender_balance(candidates: &[CandidateRow], mandates: &[MandateRow]) -> Vec<GenderBalance> {
    let elected = elected_set(mandates);
    let mut by_party: BTreeMap<(ElectionType, String), GenderBalance> = BTreeMap::new();
    let mut overall: BTreeMap<ElectionType, GenderBalance> = BTreeMap::new();
    for c in candidates.iter() {
        let is_elected =
            elected.contains(&(c.election_type, c.jurisdiction.clone(), c.candidate_id.clone()));
        by_party
            .entry((c.election_type, c.party_name.clone()))
            .or_insert_with(|| GenderBalance::empty(c.election_type, Some(c.party_name.clone())))
            .add(c.category, is_elected);
        overall
            .entry(c.election_type)
            .or_insert_with(|| GenderBalance::empty(c.election_type, None))
            .add(c.category, is_elected);
    }
    by_party
        .into_values()
        .chain(overall.into_values())
        .map(|g| g.finish())
        .collect()
}

/// A candidate's personal votes summed over every polling area of the jurisdiction.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct CandidateTotal {
    pub election_type: ElectionType,
    pub jurisdiction: String,
    pub candidate_id: String,
    pub ballot_name: String,
    pub party_id: String,
    pub party_name: String,
    pub personal_votes: u64,
    pub elected: bool,
}

pub fn candidate_totals(vote_results: &[VoteResultRow], mandates: &[MandateRow]) -> Vec<CandidateTotal> {
    let elected = elected_set(mandates);
    let mut totals: BTreeMap<(ElectionType, String, String), CandidateTotal> = BTreeMap::new();
    for r in vote_results.iter() {
        let cid = match &r.candidate_id {
            Some(c) => c,
            None => continue,
        };
        let k = (r.election_type, r.jurisdiction.clone(), cid.clone());
        let is_elected = elected.contains(&k);
        totals
            .entry(k)
            .or_insert_with(|| CandidateTotal {
                election_type: r.election_type,
                jurisdiction: r.jurisdiction.clone(),
                candidate_id: cid.clone(),
                ballot_name: r.ballot_name.clone(),
                party_id: r.party_id.clone(),
                party_name: r.party_name.clone(),
                personal_votes: 0,
                elected: is_elected,
            })
            .personal_votes += r.personal_votes;
    }
    totals.into_values().collect()
}

pub fn top_vote_getters(totals: &[CandidateTotal], limit: Option<usize>) -> Vec<CandidateTotal> {
    let mut res = totals.to_vec();
    rank_descending(
        &mut res,
        |c| c.personal_votes as f64,
        |c| (c.election_type, c.jurisdiction.clone(), c.candidate_id.clone()),
        limit,
    );
    res
}

/// Every roll-up, in a stable order.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Aggregates {
    pub party_totals_by_jurisdiction: Vec<Rollup>,
    pub national_party_totals: Vec<Rollup>,
    pub area_party_totals: Vec<AreaPartyTotal>,
    pub turnout: Vec<TurnoutRollup>,
    pub gender_balance: Vec<GenderBalance>,
    pub top_vote_getters: Vec<CandidateTotal>,
}

pub fn build_aggregates(
    rec: &Reconciliation,
    vote_results: &[VoteResultRow],
    candidates: &[CandidateRow],
    mandates: &[MandateRow],
    settings: &AnalysisSettings,
) -> Aggregates {
    let totals = candidate_totals(vote_results, mandates);
    let res = Aggregates {
        party_totals_by_jurisdiction: roll_up(rec, GroupBy::JURISDICTION_PARTY),
        national_party_totals: roll_up(rec, GroupBy::NATIONAL_PARTY),
        area_party_totals: area_party_totals(rec),
        turnout: turnout(&rec.areas),
        gender_balance: gender_balance(candidates, mandates),
        top_vote_getters: top_vote_getters(&totals, settings.top_vote_getter_limit),
    };
    info!(
        "build_aggregates: {} jurisdiction-party totals, {} turnout lines, {} gender lines",
        res.party_totals_by_jurisdiction.len(),
        res.turnout.len(),
        res.gender_balance.len()
    );
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UpdateRecordBuilder;
    use crate::normalize::vote_result_rows;
    use crate::reconcile::reconcile;

    #[test]
    fn round_percent_ties_to_even() {
        assert_eq!(round_percent(6.25), 6.2);
        assert_eq!(round_percent(18.75), 18.8);
        assert_eq!(round_percent(69.24), 69.2);
        // 1/16 is exactly 6.25 %.
        assert_eq!(Ratio::new(1, 16).percent().map(round_percent), Some(6.2));
        assert_eq!(Ratio::new(1, 3).percent().map(round_percent), Some(33.3));
    }

    #[test]
    fn turnout_is_ratio_of_sums() {
        let a = UpdateRecordBuilder::new("A1", "M1")
            .eligible_voters(100)
            .votes_cast(90)
            .valid_votes(90)
            .party("P1", 90, 90)
            .build();
        let b = UpdateRecordBuilder::new("A2", "M1")
            .eligible_voters(1000)
            .votes_cast(500)
            .valid_votes(500)
            .party("P1", 500, 500)
            .build();
        let mut rows = vote_result_rows(&a);
        rows.extend(vote_result_rows(&b));
        let rec = reconcile(&rows);
        let t = turnout(&rec.areas);
        assert_eq!(t.len(), 2);
        let m1 = &t[0];
        assert_eq!(m1.jurisdiction, Some("M1".to_string()));
        assert_eq!(m1.eligible_voters, 1100);
        assert_eq!(m1.votes_cast, 590);
        assert_eq!(m1.turnout_percent, Ratio::new(590, 1100).percent());
        // The mean of 90 % and 50 % would be 70 %.
        assert!((m1.turnout_percent.unwrap() - 70.0).abs() > 1.0);
        assert_eq!(t[1].jurisdiction, None);
    }

    #[test]
    fn roll_up_shares_use_all_valid_votes() {
        let a = UpdateRecordBuilder::new("A1", "M1")
            .valid_votes(100)
            .party("P1", 100, 100)
            .build();
        let b = UpdateRecordBuilder::new("A2", "M1")
            .valid_votes(300)
            .party("P2", 300, 300)
            .build();
        let mut rows = vote_result_rows(&a);
        rows.extend(vote_result_rows(&b));
        let rec = reconcile(&rows);
        let r = roll_up(&rec, GroupBy::JURISDICTION_PARTY);
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].party_name, Some("P1".to_string()));
        assert_eq!(r[0].valid_votes, 400);
        assert_eq!(r[0].share_percent, Some(25.0));
        let j = roll_up(&rec, GroupBy::JURISDICTION);
        assert_eq!(j.len(), 1);
        assert_eq!(j[0].votes, 400);
        assert_eq!(j[0].share_percent, Some(100.0));
    }

    #[test]
    fn ranking_breaks_ties_by_key() {
        let mut rows = vec![("b", 2.0), ("a", 2.0), ("c", 5.0)];
        rank_descending(&mut rows, |r| r.1, |r| r.0, Some(2));
        assert_eq!(rows, vec![("c", 5.0), ("a", 2.0)]);
    }
}
