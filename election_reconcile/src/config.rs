// ********* Enumerations shared by every stage ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::aggregate::{serialize_percent_opt, Ratio};

/// The two kinds of election carried by the source system.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ElectionType {
    #[serde(rename = "municipal")]
    MunicipalCouncil,
    #[serde(rename = "regional")]
    RegionalCouncil,
}

impl ElectionType {
    pub const ALL: [ElectionType; 2] = [ElectionType::MunicipalCouncil, ElectionType::RegionalCouncil];

    pub fn label(&self) -> &'static str {
        match self {
            ElectionType::MunicipalCouncil => "municipal",
            ElectionType::RegionalCouncil => "regional",
        }
    }

    /// Interprets a free-text election designation, as found in the `Valgart` field
    /// of the payloads or in file names.
    pub fn from_designation(s: &str) -> Option<ElectionType> {
        let lower = s.to_lowercase();
        if lower.contains("kommunal") {
            Some(ElectionType::MunicipalCouncil)
        } else if lower.contains("region") {
            Some(ElectionType::RegionalCouncil)
        } else {
            None
        }
    }
}

impl Display for ElectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The jurisdiction a row belongs to: the region for regional-council rows
/// when a region is known, the municipality otherwise.
pub fn jurisdiction_of(election_type: ElectionType, municipality: &str, region: &str) -> String {
    match election_type {
        ElectionType::RegionalCouncil if !region.is_empty() => region.to_string(),
        _ => municipality.to_string(),
    }
}

/// What a single source payload describes.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum PayloadKind {
    CandidateRoster,
    AreaResults,
    MandateDistribution,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
pub enum MandateType {
    #[serde(rename = "personal")]
    PersonalSeat,
    #[serde(rename = "list")]
    ListSeat,
    #[serde(rename = "alternate")]
    Alternate,
}

impl MandateType {
    /// Alternates do not hold a seat until they are activated.
    pub fn is_seat(&self) -> bool {
        !matches!(self, MandateType::Alternate)
    }
}

/// Opaque categorical attribute attached to a candidate by an external collaborator.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum CandidateCategory {
    #[serde(rename = "F", alias = "K")]
    Female,
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "unknown", alias = "Ukendt")]
    Unknown,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
pub enum CategoryMethod {
    #[serde(rename = "manual")]
    ManualOverride,
    #[serde(rename = "lookup")]
    Lookup,
    #[serde(rename = "not_found")]
    NotFound,
    #[serde(rename = "no_data")]
    NoData,
}

// ********* Canonical input shapes ***********

/// One snapshot of a polling area's results at a point in time.
///
/// Several records may exist for the same polling area; only the one with the
/// latest `revision` is authoritative.
#[derive(PartialEq, Debug, Clone)]
pub struct UpdateRecord {
    pub polling_area_id: String,
    pub polling_area_number: String,
    pub polling_area_name: String,
    pub municipality: String,
    pub municipality_code: Option<String>,
    pub region: String,
    pub election_type: ElectionType,
    pub election_date: String,
    /// Publication instant, as published. `None` when the schema carries no such field.
    pub revision: Option<String>,
    pub eligible_voters: u64,
    pub votes_cast: u64,
    pub valid_votes: u64,
    pub invalid_votes: u64,
    pub blank_votes: u64,
    pub parties: Vec<PartyResult>,
}

/// One party's tally within an update record.
///
/// `list_total` already contains the personal votes of every candidate plus the
/// list-only ballots. It must never be added to the personal votes again.
#[derive(PartialEq, Debug, Clone)]
pub struct PartyResult {
    pub party_id: String,
    pub party_letter: String,
    pub party_name: String,
    pub list_total: u64,
    pub list_only_votes: u64,
    pub candidates: Vec<CandidateResult>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub ballot_name: String,
    pub personal_votes: u64,
}

/// Outcome of the seat allocation for one jurisdiction.
#[derive(PartialEq, Debug, Clone)]
pub struct MandateAssignment {
    pub mandate_type: MandateType,
    pub number: u64,
    pub number_on_list: Option<u64>,
    pub candidate_id: Option<String>,
    pub ballot_name: String,
    pub party_id: String,
    pub party_letter: String,
    pub party_name: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ListRoster {
    pub party_id: String,
    pub party_letter: String,
    pub party_name: String,
    pub ballot_position: String,
    pub candidates: Vec<RosterCandidate>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct RosterCandidate {
    pub candidate_id: String,
    pub full_name: String,
    pub ballot_name: String,
    pub first_name: String,
    pub last_name: String,
    pub occupation: String,
    pub residence: String,
    pub ballot_position: String,
}

// ******** Flat relations produced by the normalizer *********

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct CandidateRow {
    pub election_type: ElectionType,
    pub election_date: String,
    pub jurisdiction: String,
    pub municipality: String,
    pub municipality_code: Option<String>,
    pub region: String,
    pub revision: Option<String>,
    pub party_id: String,
    pub party_letter: String,
    pub party_name: String,
    pub list_ballot_position: String,
    pub candidate_id: String,
    pub full_name: String,
    pub ballot_name: String,
    pub first_name: String,
    pub last_name: String,
    pub occupation: String,
    pub residence: String,
    pub candidate_ballot_position: String,
    pub category: CandidateCategory,
    pub category_method: CategoryMethod,
}

/// One polling area × candidate row. The area-level and party-level figures are
/// repeated identically on every candidate row of the same area and party.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct VoteResultRow {
    pub election_type: ElectionType,
    pub election_date: String,
    pub jurisdiction: String,
    pub municipality: String,
    pub municipality_code: Option<String>,
    pub region: String,
    pub polling_area_id: String,
    pub polling_area_number: String,
    pub polling_area_name: String,
    pub revision: Option<String>,
    pub eligible_voters: u64,
    pub votes_cast: u64,
    pub valid_votes: u64,
    pub invalid_votes: u64,
    pub blank_votes: u64,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub turnout_percent: Option<f64>,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub valid_percent: Option<f64>,
    pub party_id: String,
    pub party_letter: String,
    pub party_name: String,
    pub list_total: u64,
    pub list_only_votes: u64,
    /// Absent for a party list that has no candidate in this area.
    pub candidate_id: Option<String>,
    pub ballot_name: String,
    pub personal_votes: u64,
    #[serde(serialize_with = "serialize_percent_opt")]
    pub personal_share_percent: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct MandateRow {
    pub election_type: ElectionType,
    pub election_date: String,
    pub jurisdiction: String,
    pub municipality: String,
    pub municipality_code: Option<String>,
    pub region: String,
    pub revision: Option<String>,
    pub mandate_type: MandateType,
    pub number: u64,
    pub number_on_list: Option<u64>,
    pub candidate_id: Option<String>,
    pub ballot_name: String,
    pub party_id: String,
    pub party_letter: String,
    pub party_name: String,
}

// ******** Reconciled output *********

/// Authoritative per polling area, per party record used by every downstream computation.
#[derive(PartialEq, Debug, Clone)]
pub struct ReconciledAreaResult {
    pub election_type: ElectionType,
    pub jurisdiction: String,
    pub municipality: String,
    pub polling_area_id: String,
    pub polling_area_name: String,
    pub party_id: String,
    pub party_name: String,
    pub list_total: u64,
    /// The figure as published, before any clamping.
    pub reported_list_total: u64,
    pub list_only_votes: u64,
    pub personal_votes_by_candidate: BTreeMap<String, u64>,
    pub valid_votes_in_area: u64,
}

impl ReconciledAreaResult {
    pub fn personal_votes_total(&self) -> u64 {
        self.personal_votes_by_candidate.values().sum()
    }

    pub fn was_clamped(&self) -> bool {
        self.list_total != self.reported_list_total
    }

    pub fn area_share(&self) -> Ratio {
        Ratio::new(self.list_total, self.valid_votes_in_area)
    }
}

/// Area-level figures, one per (election type, polling area).
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct AreaTotals {
    pub election_type: ElectionType,
    pub jurisdiction: String,
    pub municipality: String,
    pub polling_area_id: String,
    pub polling_area_name: String,
    pub eligible_voters: u64,
    pub votes_cast: u64,
    pub valid_votes: u64,
    pub invalid_votes: u64,
    pub blank_votes: u64,
}

// ********* External reference inputs **********

/// A jurisdiction's executive, with the party spelled as the roster spells it.
#[derive(Eq, PartialEq, Debug, Clone, Deserialize)]
pub struct Executive {
    #[serde(rename = "Kommune")]
    pub jurisdiction: String,
    #[serde(rename = "Navn")]
    pub name: String,
    #[serde(rename = "Parti")]
    pub party: String,
}

/// Official figures for one election type. Every value is optional.
#[derive(PartialEq, Debug, Clone, Default, Deserialize)]
pub struct ElectionReference {
    pub eligible: Option<u64>,
    pub cast: Option<u64>,
    pub valid: Option<u64>,
    #[serde(rename = "turnoutPercent")]
    pub turnout_percent: Option<f64>,
    #[serde(default)]
    pub parties: BTreeMap<String, Option<u64>>,
    /// Jurisdiction, then party, to the expected party total.
    #[serde(default)]
    pub jurisdictions: BTreeMap<String, BTreeMap<String, Option<u64>>>,
}

#[derive(PartialEq, Debug, Clone, Default, Deserialize)]
pub struct ReferenceTotals {
    pub municipal: Option<ElectionReference>,
    pub regional: Option<ElectionReference>,
}

impl ReferenceTotals {
    pub fn for_election(&self, election_type: ElectionType) -> Option<&ElectionReference> {
        match election_type {
            ElectionType::MunicipalCouncil => self.municipal.as_ref(),
            ElectionType::RegionalCouncil => self.regional.as_ref(),
        }
    }
}

// ********* Configuration **********

/// External collaborator that supplies a category for a first name.
///
/// The engine never computes categories itself.
pub trait CategoryLookup {
    fn lookup(&self, first_name: &str) -> Option<CandidateCategory>;
}

/// A lookup that knows nothing.
pub struct NoCategoryLookup;

impl CategoryLookup for NoCategoryLookup {
    fn lookup(&self, _first_name: &str) -> Option<CandidateCategory> {
        None
    }
}

/// Manually curated first name → category table. Loaded once per run and only read afterwards.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct CategoryOverrides {
    entries: BTreeMap<String, CandidateCategory>,
}

impl CategoryOverrides {
    pub fn new(entries: BTreeMap<String, CandidateCategory>) -> CategoryOverrides {
        CategoryOverrides { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<CandidateCategory> {
        self.entries.get(name).cloned()
    }
}

/// Maps the party spellings used by the executive roster and by the seat
/// allocation onto one canonical name.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PartyNameTable {
    aliases: BTreeMap<String, String>,
}

impl PartyNameTable {
    pub fn new(aliases: BTreeMap<String, String>) -> PartyNameTable {
        PartyNameTable { aliases }
    }

    pub fn normalize(&self, party: &str) -> String {
        let trimmed = party.trim();
        self.aliases
            .get(trimmed)
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }
}

impl Default for PartyNameTable {
    fn default() -> PartyNameTable {
        let aliases = [
            ("SF - Socialistisk Folkeparti", "Socialistisk Folkeparti"),
            ("Venstre, Danmarks Liberale Parti", "Venstre"),
            ("Det Konservative Folkeparti", "Konservative"),
            ("Enhedslisten - De Rød-Grønne", "Enhedslisten"),
            ("Danmarksdemokraterne - Inger Støjberg", "Danmarksdemokraterne"),
        ]
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
        PartyNameTable { aliases }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct NormalizerSettings {
    /// Payloads dated outside the target cycle do not contain this substring in their date.
    pub election_cycle_marker: Option<String>,
    /// Source names containing any of these markers are verification data.
    pub verification_markers: Vec<String>,
    pub category_overrides: CategoryOverrides,
}

impl Default for NormalizerSettings {
    fn default() -> NormalizerSettings {
        NormalizerSettings {
            election_cycle_marker: Some("-2025".to_string()),
            verification_markers: vec!["verifikation".to_string()],
            category_overrides: CategoryOverrides::default(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisSettings {
    /// Party totals below this are too small for a dependency ratio to mean anything.
    pub noise_floor: u64,
    pub dependency_saturation_percent: f64,
    pub stronghold_min_deviation: f64,
    pub stronghold_min_mean_share: f64,
    pub robbed_limit: Option<usize>,
    pub dependency_limit: Option<usize>,
    pub stronghold_limit: Option<usize>,
    pub top_vote_getter_limit: Option<usize>,
}

impl AnalysisSettings {
    pub const DEFAULT_SETTINGS: AnalysisSettings = AnalysisSettings {
        noise_floor: 50,
        dependency_saturation_percent: 99.9,
        stronghold_min_deviation: 10.0,
        stronghold_min_mean_share: 2.0,
        robbed_limit: Some(100),
        dependency_limit: Some(100),
        stronghold_limit: Some(200),
        top_vote_getter_limit: Some(100),
    };
}

#[derive(PartialEq, Debug, Clone)]
pub struct ValidationSettings {
    pub national_tolerance_percent: f64,
    pub party_tolerance_percent: f64,
    pub low_turnout_warning: f64,
    pub high_turnout_warning: f64,
}

impl ValidationSettings {
    pub const DEFAULT_SETTINGS: ValidationSettings = ValidationSettings {
        national_tolerance_percent: 0.1,
        party_tolerance_percent: 0.5,
        low_turnout_warning: 30.0,
        high_turnout_warning: 95.0,
    };
}

#[derive(PartialEq, Debug, Clone)]
pub struct EngineSettings {
    pub normalizer: NormalizerSettings,
    pub analysis: AnalysisSettings,
    pub validation: ValidationSettings,
    pub party_names: PartyNameTable,
}

impl Default for EngineSettings {
    fn default() -> EngineSettings {
        EngineSettings {
            normalizer: NormalizerSettings::default(),
            analysis: AnalysisSettings::DEFAULT_SETTINGS,
            validation: ValidationSettings::DEFAULT_SETTINGS,
            party_names: PartyNameTable::default(),
        }
    }
}

// ******** Errors *********

/// Errors that prevent the engine from producing a relation.
///
/// Per-row and per-jurisdiction problems are never reported through this type;
/// they become warnings, flags or skips.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ReconcileErrors {
    /// The payload parsed as JSON but matches neither schema generation.
    MalformedPayload { source_name: String, reason: String },
    /// No payload at all was handed to the engine.
    EmptySnapshot,
    /// Every relation the analyses need ended up empty.
    NoUsableRelations,
}

impl Error for ReconcileErrors {}

impl Display for ReconcileErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileErrors::MalformedPayload {
                source_name,
                reason,
            } => write!(f, "malformed payload {}: {}", source_name, reason),
            ReconcileErrors::EmptySnapshot => write!(f, "the snapshot contains no payload"),
            ReconcileErrors::NoUsableRelations => write!(
                f,
                "no vote results and no mandates survived normalization and deduplication"
            ),
        }
    }
}
