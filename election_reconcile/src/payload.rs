// The two schema generations shipped by the source system, and their
// resolution into a single canonical document.

use log::debug;
use serde::Deserialize;
use serde_json::Value as JSValue;

use crate::config::*;

// ********* schema-v2 *********

/// Second generation: flat documents carrying a top-level `Valgart`.
#[derive(Debug, Clone, Deserialize)]
pub struct V2Document {
    #[serde(rename = "Valgart")]
    pub election_designation: Option<String>,
    #[serde(rename = "Valgdag")]
    pub election_date: Option<String>,
    #[serde(rename = "AfstemningsområdeDagiId")]
    pub area_id: Option<JSValue>,
    #[serde(rename = "AfstemningsområdeNummer")]
    pub area_number: Option<JSValue>,
    #[serde(rename = "Afstemningsområde")]
    pub area_name: Option<String>,
    #[serde(rename = "Kommune")]
    pub municipality: Option<String>,
    #[serde(rename = "Kommunekode")]
    pub municipality_code: Option<JSValue>,
    #[serde(rename = "KommuneDagiId")]
    pub municipality_dagi_id: Option<JSValue>,
    #[serde(rename = "Region")]
    pub region: Option<String>,
    #[serde(rename = "RegionDagiId")]
    pub region_dagi_id: Option<JSValue>,
    #[serde(rename = "FrigivelsesTidspunktUTC")]
    pub released_at: Option<String>,
    #[serde(rename = "OpdateringsTidspunktUTC")]
    pub updated_at: Option<String>,
    #[serde(rename = "AntalStemmeberettigedeVælgere")]
    pub eligible: Option<JSValue>,
    #[serde(rename = "AfgivneStemmer")]
    pub cast: Option<JSValue>,
    #[serde(rename = "GyldigeStemmer")]
    pub valid: Option<JSValue>,
    #[serde(rename = "UgyldigeStemmerUdoverBlanke")]
    pub invalid: Option<JSValue>,
    #[serde(rename = "BlankeUgyldigeFremmødteStemmer")]
    pub blank_in_person: Option<JSValue>,
    #[serde(rename = "BlankeUgyldigeBrevstemmer")]
    pub blank_postal: Option<JSValue>,
    #[serde(rename = "Stemmeberettigede")]
    pub eligible_fallback: Option<JSValue>,
    #[serde(rename = "UgyldigeStemmer")]
    pub invalid_fallback: Option<JSValue>,
    #[serde(rename = "BlankeStemmer")]
    pub blank_fallback: Option<JSValue>,
    #[serde(rename = "Kandidatlister")]
    pub lists: Option<Vec<V2List>>,
    #[serde(rename = "PersonligeMandater")]
    pub personal_mandates: Option<Vec<V2PersonalMandate>>,
    #[serde(rename = "ListeMandater")]
    pub list_mandates: Option<Vec<V2ListMandate>>,
    #[serde(rename = "Kandidatliste")]
    pub alternate_lists: Option<Vec<V2AlternateList>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V2List {
    #[serde(rename = "KandidatlisteId")]
    pub id: Option<JSValue>,
    #[serde(rename = "Bogstavbetegnelse")]
    pub letter: Option<String>,
    #[serde(rename = "Navn")]
    pub name: Option<String>,
    #[serde(rename = "Stemmer")]
    pub votes: Option<JSValue>,
    #[serde(rename = "Listestemmer")]
    pub list_only_votes: Option<JSValue>,
    #[serde(rename = "Stemmeseddelsplacering")]
    pub ballot_position: Option<JSValue>,
    #[serde(rename = "Kandidater")]
    pub candidates: Option<Vec<V2Candidate>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V2Candidate {
    #[serde(rename = "Id")]
    pub id: Option<JSValue>,
    #[serde(rename = "Navn")]
    pub name: Option<String>,
    #[serde(rename = "Stemmeseddelnavn")]
    pub ballot_name: Option<String>,
    #[serde(rename = "Stemmer")]
    pub votes: Option<JSValue>,
    #[serde(rename = "PersonligeStemmer")]
    pub personal_votes: Option<JSValue>,
    #[serde(rename = "Stilling")]
    pub occupation: Option<String>,
    #[serde(rename = "BopaelPaaStemmeseddel")]
    pub residence: Option<String>,
    #[serde(rename = "Stemmeseddelsplacering")]
    pub ballot_position: Option<JSValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V2PersonalMandate {
    #[serde(rename = "Nummer")]
    pub number: Option<JSValue>,
    #[serde(rename = "MandatNummer")]
    pub mandate_number: Option<JSValue>,
    #[serde(rename = "NummerAnførtPåListen")]
    pub number_on_list: Option<JSValue>,
    #[serde(rename = "KandidatId")]
    pub candidate_id: Option<JSValue>,
    #[serde(rename = "Stemmeseddelnavn")]
    pub ballot_name: Option<String>,
    #[serde(rename = "KandidatlisteId")]
    pub list_id: Option<JSValue>,
    #[serde(rename = "KandidatlisteNavn")]
    pub list_name: Option<String>,
    #[serde(rename = "Bogstavbetegnelse")]
    pub letter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V2ListMandate {
    #[serde(rename = "Nummer")]
    pub number: Option<JSValue>,
    #[serde(rename = "MandatNummer")]
    pub mandate_number: Option<JSValue>,
    #[serde(rename = "KandidatlisteId")]
    pub list_id: Option<JSValue>,
    #[serde(rename = "KandidatlisteNavn")]
    pub list_name: Option<String>,
    #[serde(rename = "Bogstavbetegnelse")]
    pub letter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V2AlternateList {
    #[serde(rename = "KandidatlisteId")]
    pub list_id: Option<JSValue>,
    #[serde(rename = "KandidatlisteNavn")]
    pub list_name: Option<String>,
    #[serde(rename = "Bogstavbetegnelse")]
    pub letter: Option<String>,
    #[serde(rename = "Stedfortrædere")]
    pub alternates: Option<Vec<V2Alternate>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V2Alternate {
    #[serde(rename = "Nummer")]
    pub number: Option<JSValue>,
    #[serde(rename = "KandidatId")]
    pub candidate_id: Option<JSValue>,
    #[serde(rename = "Stemmeseddelnavn")]
    pub ballot_name: Option<String>,
}

// ********* schema-v1 *********

/// First generation: the body is nested under `Valg` or `Valgresultater` and
/// refers to places, lists and candidates through reference objects.
#[derive(Debug, Clone, Deserialize)]
pub struct V1Document {
    #[serde(rename = "Id")]
    pub id: Option<JSValue>,
    #[serde(rename = "Navn")]
    pub name: Option<String>,
    #[serde(rename = "ValgNavn")]
    pub election_name: Option<String>,
    #[serde(rename = "Dato")]
    pub date: Option<String>,
    #[serde(rename = "ValgDato")]
    pub election_date: Option<String>,
    #[serde(rename = "Valgdag")]
    pub election_day: Option<String>,
    #[serde(rename = "KommuneReference")]
    pub municipality: Option<V1Reference>,
    #[serde(rename = "RegionReference")]
    pub region: Option<V1Reference>,
    #[serde(rename = "AfstemningsområdeReference")]
    pub area: Option<V1Reference>,
    #[serde(rename = "AfstemningsområdeDagiId")]
    pub area_id: Option<JSValue>,
    #[serde(rename = "Stemmeberettigede")]
    pub eligible: Option<JSValue>,
    #[serde(rename = "AfgivneStemmer")]
    pub cast: Option<JSValue>,
    #[serde(rename = "GyldigeStemmer")]
    pub valid: Option<JSValue>,
    #[serde(rename = "UgyldigeStemmer")]
    pub invalid: Option<JSValue>,
    #[serde(rename = "BlankeStemmer")]
    pub blank: Option<JSValue>,
    #[serde(rename = "Kandidatlister")]
    pub lists: Option<Vec<V1List>>,
    #[serde(rename = "PersonligeMandater")]
    pub personal_mandates: Option<Vec<V1Mandate>>,
    #[serde(rename = "ListeMandater")]
    pub list_mandates: Option<Vec<V1Mandate>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct V1Reference {
    #[serde(rename = "Id")]
    pub id: Option<JSValue>,
    #[serde(rename = "Kode")]
    pub code: Option<JSValue>,
    #[serde(rename = "Nummer")]
    pub number: Option<JSValue>,
    #[serde(rename = "Navn")]
    pub name: Option<String>,
    #[serde(rename = "Bogstav")]
    pub letter: Option<String>,
    #[serde(rename = "Fornavn")]
    pub first_name: Option<String>,
    #[serde(rename = "Efternavn")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1List {
    #[serde(rename = "Id")]
    pub id: Option<JSValue>,
    #[serde(rename = "Bogstav")]
    pub letter: Option<String>,
    #[serde(rename = "Navn")]
    pub name: Option<String>,
    #[serde(rename = "Stemmer")]
    pub votes: Option<JSValue>,
    #[serde(rename = "Listestemmer")]
    pub list_only_votes: Option<JSValue>,
    #[serde(rename = "Stemmeseddelplacering")]
    pub ballot_position: Option<JSValue>,
    #[serde(rename = "Kandidater")]
    pub candidates: Option<Vec<V1Candidate>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1Candidate {
    #[serde(rename = "Id")]
    pub id: Option<JSValue>,
    #[serde(rename = "Fornavn")]
    pub first_name: Option<String>,
    #[serde(rename = "Efternavn")]
    pub last_name: Option<String>,
    #[serde(rename = "Stemmeseddelnavn")]
    pub ballot_name: Option<String>,
    #[serde(rename = "PersonligeStemmer")]
    pub personal_votes: Option<JSValue>,
    #[serde(rename = "Stemmer")]
    pub votes: Option<JSValue>,
    #[serde(rename = "Stilling")]
    pub occupation: Option<String>,
    #[serde(rename = "Bopæl")]
    pub residence: Option<String>,
    #[serde(rename = "Placering")]
    pub ballot_position: Option<JSValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1Mandate {
    #[serde(rename = "MandatNummer")]
    pub number: Option<JSValue>,
    #[serde(rename = "KandidatReference")]
    pub candidate: Option<V1Reference>,
    #[serde(rename = "KandidatlisteReference")]
    pub list: Option<V1Reference>,
}

// ********* The discriminated union *********

/// A decoded payload, tagged with its schema generation.
#[derive(Debug, Clone)]
pub enum Payload {
    V1(V1Document),
    V2(V2Document),
}

/// Fields shared by every canonical document.
#[derive(PartialEq, Debug, Clone)]
pub struct DocumentHeader {
    pub election_type: ElectionType,
    pub election_date: String,
    pub municipality: String,
    pub municipality_code: Option<String>,
    pub region: String,
    pub revision: Option<String>,
}

impl DocumentHeader {
    pub fn jurisdiction(&self) -> String {
        jurisdiction_of(self.election_type, &self.municipality, &self.region)
    }
}

/// The one shape every component after the normalizer boundary sees.
#[derive(PartialEq, Debug, Clone)]
pub enum CanonicalDocument {
    Roster {
        header: DocumentHeader,
        lists: Vec<ListRoster>,
    },
    Results(UpdateRecord),
    Mandates {
        header: DocumentHeader,
        assignments: Vec<MandateAssignment>,
    },
}

/// A payload together with everything the boundary knows about it.
#[derive(Debug, Clone)]
pub struct SourcePayload {
    pub source_name: String,
    pub kind: PayloadKind,
    pub election_type: ElectionType,
    pub payload: Payload,
}

impl SourcePayload {
    /// Decodes a payload and settles its kind and election type.
    ///
    /// The hints usually come from the file name. A declared election type wins
    /// over the hint; a kind hint wins over the kind inferred from the content.
    pub fn resolve(
        source_name: &str,
        kind_hint: Option<PayloadKind>,
        election_type_hint: Option<ElectionType>,
        value: JSValue,
    ) -> Result<SourcePayload, ReconcileErrors> {
        let payload = Payload::decode(source_name, value)?;
        let kind = kind_hint.unwrap_or_else(|| payload.infer_kind());
        let election_type = payload
            .declared_election_type()
            .or(election_type_hint)
            .ok_or_else(|| ReconcileErrors::MalformedPayload {
                source_name: source_name.to_string(),
                reason: "the election type cannot be determined".to_string(),
            })?;
        Ok(SourcePayload {
            source_name: source_name.to_string(),
            kind,
            election_type,
            payload,
        })
    }

    pub fn canonical(&self) -> CanonicalDocument {
        self.payload.canonical(self.kind, self.election_type)
    }
}

impl Payload {
    /// Detects the schema generation by the presence of `Valgart` and decodes it.
    pub fn decode(source_name: &str, value: JSValue) -> Result<Payload, ReconcileErrors> {
        let malformed = |reason: String| ReconcileErrors::MalformedPayload {
            source_name: source_name.to_string(),
            reason,
        };
        let obj = match value {
            JSValue::Object(obj) => obj,
            _ => return Err(malformed("the top level is not a JSON object".to_string())),
        };
        if obj.contains_key("Valgart") {
            debug!("decode: {} is schema-v2", source_name);
            let doc: V2Document = serde_json::from_value(JSValue::Object(obj))
                .map_err(|e| malformed(format!("schema-v2: {}", e)))?;
            return Ok(Payload::V2(doc));
        }
        let inner_key: Option<&str> = ["Valg", "Valgresultater"]
            .iter()
            .copied()
            .find(|k| matches!(obj.get(*k), Some(JSValue::Object(_))));
        let body = match inner_key {
            Some(k) => obj.get(k).cloned().unwrap_or(JSValue::Null),
            None => JSValue::Object(obj),
        };
        debug!("decode: {} is schema-v1", source_name);
        let doc: V1Document =
            serde_json::from_value(body).map_err(|e| malformed(format!("schema-v1: {}", e)))?;
        Ok(Payload::V1(doc))
    }

    pub fn schema_name(&self) -> &'static str {
        match self {
            Payload::V1(_) => "schema-v1",
            Payload::V2(_) => "schema-v2",
        }
    }

    pub fn declared_election_type(&self) -> Option<ElectionType> {
        match self {
            Payload::V2(d) => d
                .election_designation
                .as_deref()
                .and_then(ElectionType::from_designation),
            Payload::V1(d) => d
                .election_name
                .as_deref()
                .or(d.name.as_deref())
                .and_then(ElectionType::from_designation),
        }
    }

    /// The election date, or an empty string when the payload carries none.
    pub fn election_date(&self) -> String {
        match self {
            Payload::V2(d) => d.election_date.clone().unwrap_or_default(),
            Payload::V1(d) => v1_date(d),
        }
    }

    /// Guesses the payload kind from its content when the file name carries no marker.
    pub fn infer_kind(&self) -> PayloadKind {
        let (has_valid, has_mandates) = match self {
            Payload::V2(d) => (
                d.valid.is_some(),
                d.personal_mandates.is_some() || d.list_mandates.is_some(),
            ),
            Payload::V1(d) => (
                d.valid.is_some(),
                d.personal_mandates.is_some() || d.list_mandates.is_some(),
            ),
        };
        if has_valid {
            PayloadKind::AreaResults
        } else if has_mandates {
            PayloadKind::MandateDistribution
        } else {
            PayloadKind::CandidateRoster
        }
    }

    pub fn canonical(&self, kind: PayloadKind, election_type: ElectionType) -> CanonicalDocument {
        match self {
            Payload::V2(d) => v2_canonical(d, kind, election_type),
            Payload::V1(d) => v1_canonical(d, kind, election_type),
        }
    }
}

fn v2_header(d: &V2Document, election_type: ElectionType) -> DocumentHeader {
    let municipality_code = read_js_opt_text(&d.municipality_code)
        .or_else(|| read_js_opt_text(&d.municipality_dagi_id));
    DocumentHeader {
        election_type,
        election_date: d.election_date.clone().unwrap_or_default(),
        municipality: d.municipality.clone().unwrap_or_default(),
        municipality_code,
        region: d.region.clone().unwrap_or_default(),
        revision: non_empty(&d.released_at).or_else(|| non_empty(&d.updated_at)),
    }
}

fn v2_canonical(d: &V2Document, kind: PayloadKind, election_type: ElectionType) -> CanonicalDocument {
    let header = v2_header(d, election_type);
    let lists = d.lists.as_deref().unwrap_or(&[]);
    match kind {
        PayloadKind::CandidateRoster => {
            let lists = lists
                .iter()
                .map(|l| ListRoster {
                    party_id: read_js_text(&l.id),
                    party_letter: l.letter.clone().unwrap_or_default(),
                    party_name: l.name.clone().unwrap_or_default(),
                    ballot_position: read_js_text(&l.ballot_position),
                    candidates: l
                        .candidates
                        .as_deref()
                        .unwrap_or(&[])
                        .iter()
                        .map(|c| {
                            let full_name = c.name.clone().unwrap_or_default();
                            let (first_name, last_name) = split_full_name(&full_name);
                            RosterCandidate {
                                candidate_id: read_js_text(&c.id),
                                ballot_name: c.ballot_name.clone().unwrap_or_else(|| full_name.clone()),
                                full_name,
                                first_name,
                                last_name,
                                occupation: c.occupation.clone().unwrap_or_default(),
                                residence: c.residence.clone().unwrap_or_default(),
                                ballot_position: read_js_text(&c.ballot_position),
                            }
                        })
                        .collect(),
                })
                .collect();
            CanonicalDocument::Roster { header, lists }
        }
        PayloadKind::AreaResults => {
            let blank = match read_js_count(&d.blank_in_person) + read_js_count(&d.blank_postal) {
                0 => read_js_count(&d.blank_fallback),
                split => split,
            };
            let parties = lists
                .iter()
                .map(|l| PartyResult {
                    party_id: read_js_text(&l.id),
                    party_letter: l.letter.clone().unwrap_or_default(),
                    party_name: l.name.clone().unwrap_or_default(),
                    list_total: read_js_count(&l.votes),
                    list_only_votes: read_js_count(&l.list_only_votes),
                    candidates: l
                        .candidates
                        .as_deref()
                        .unwrap_or(&[])
                        .iter()
                        .map(|c| CandidateResult {
                            candidate_id: read_js_text(&c.id),
                            ballot_name: c.ballot_name.clone().unwrap_or_default(),
                            personal_votes: read_js_count(first_present(&c.votes, &c.personal_votes)),
                        })
                        .collect(),
                })
                .collect();
            CanonicalDocument::Results(UpdateRecord {
                polling_area_id: read_js_text(&d.area_id),
                polling_area_number: read_js_text(&d.area_number),
                polling_area_name: d.area_name.clone().unwrap_or_default(),
                municipality: header.municipality,
                municipality_code: header.municipality_code,
                region: header.region,
                election_type,
                election_date: header.election_date,
                revision: header.revision,
                eligible_voters: read_js_count(first_present(&d.eligible, &d.eligible_fallback)),
                votes_cast: read_js_count(&d.cast),
                valid_votes: read_js_count(&d.valid),
                invalid_votes: read_js_count(first_present(&d.invalid, &d.invalid_fallback)),
                blank_votes: blank,
                parties,
            })
        }
        PayloadKind::MandateDistribution => {
            let mut assignments: Vec<MandateAssignment> = Vec::new();
            for m in d.personal_mandates.as_deref().unwrap_or(&[]) {
                assignments.push(MandateAssignment {
                    mandate_type: MandateType::PersonalSeat,
                    number: read_js_count(first_present(&m.number, &m.mandate_number)),
                    number_on_list: read_js_opt_count(&m.number_on_list),
                    candidate_id: read_js_opt_text(&m.candidate_id),
                    ballot_name: m.ballot_name.clone().unwrap_or_default(),
                    party_id: read_js_text(&m.list_id),
                    party_letter: m.letter.clone().unwrap_or_default(),
                    party_name: m.list_name.clone().unwrap_or_default(),
                });
            }
            for m in d.list_mandates.as_deref().unwrap_or(&[]) {
                assignments.push(MandateAssignment {
                    mandate_type: MandateType::ListSeat,
                    number: read_js_count(first_present(&m.number, &m.mandate_number)),
                    number_on_list: None,
                    candidate_id: None,
                    ballot_name: String::new(),
                    party_id: read_js_text(&m.list_id),
                    party_letter: m.letter.clone().unwrap_or_default(),
                    party_name: m.list_name.clone().unwrap_or_default(),
                });
            }
            for l in d.alternate_lists.as_deref().unwrap_or(&[]) {
                for a in l.alternates.as_deref().unwrap_or(&[]) {
                    assignments.push(MandateAssignment {
                        mandate_type: MandateType::Alternate,
                        number: read_js_count(&a.number),
                        number_on_list: None,
                        candidate_id: read_js_opt_text(&a.candidate_id),
                        ballot_name: a.ballot_name.clone().unwrap_or_default(),
                        party_id: read_js_text(&l.list_id),
                        party_letter: l.letter.clone().unwrap_or_default(),
                        party_name: l.list_name.clone().unwrap_or_default(),
                    });
                }
            }
            CanonicalDocument::Mandates { header, assignments }
        }
    }
}

fn v1_date(d: &V1Document) -> String {
    d.date
        .clone()
        .or_else(|| d.election_date.clone())
        .or_else(|| d.election_day.clone())
        .unwrap_or_default()
}

fn v1_header(d: &V1Document, election_type: ElectionType) -> DocumentHeader {
    let municipality = d.municipality.clone().unwrap_or_default();
    let region = d.region.clone().unwrap_or_default();
    DocumentHeader {
        election_type,
        election_date: v1_date(d),
        municipality: municipality.name.unwrap_or_default(),
        municipality_code: read_js_opt_text(&municipality.code),
        region: region.name.unwrap_or_default(),
        revision: None,
    }
}

fn v1_canonical(d: &V1Document, kind: PayloadKind, election_type: ElectionType) -> CanonicalDocument {
    let header = v1_header(d, election_type);
    let lists = d.lists.as_deref().unwrap_or(&[]);
    match kind {
        PayloadKind::CandidateRoster => {
            let lists = lists
                .iter()
                .map(|l| ListRoster {
                    party_id: read_js_text(&l.id),
                    party_letter: l.letter.clone().unwrap_or_default(),
                    party_name: l.name.clone().unwrap_or_default(),
                    ballot_position: read_js_text(&l.ballot_position),
                    candidates: l
                        .candidates
                        .as_deref()
                        .unwrap_or(&[])
                        .iter()
                        .map(|c| {
                            let first_name = c.first_name.clone().unwrap_or_default();
                            let last_name = c.last_name.clone().unwrap_or_default();
                            let full_name = join_name(&first_name, &last_name);
                            RosterCandidate {
                                candidate_id: read_js_text(&c.id),
                                ballot_name: c.ballot_name.clone().unwrap_or_else(|| full_name.clone()),
                                full_name,
                                first_name,
                                last_name,
                                occupation: c.occupation.clone().unwrap_or_default(),
                                residence: c.residence.clone().unwrap_or_default(),
                                ballot_position: read_js_text(&c.ballot_position),
                            }
                        })
                        .collect(),
                })
                .collect();
            CanonicalDocument::Roster { header, lists }
        }
        PayloadKind::AreaResults => {
            let area = d.area.clone().unwrap_or_default();
            let area_number = read_js_text(&area.number);
            // Older documents identify the area by its number within the municipality.
            let polling_area_id = read_js_opt_text(&d.area_id)
                .or_else(|| read_js_opt_text(&area.id))
                .unwrap_or_else(|| {
                    format!(
                        "{}-{}",
                        header.municipality_code.clone().unwrap_or_default(),
                        area_number
                    )
                });
            let parties = lists
                .iter()
                .map(|l| PartyResult {
                    party_id: read_js_text(&l.id),
                    party_letter: l.letter.clone().unwrap_or_default(),
                    party_name: l.name.clone().unwrap_or_default(),
                    list_total: read_js_count(&l.votes),
                    list_only_votes: read_js_count(&l.list_only_votes),
                    candidates: l
                        .candidates
                        .as_deref()
                        .unwrap_or(&[])
                        .iter()
                        .map(|c| CandidateResult {
                            candidate_id: read_js_text(&c.id),
                            ballot_name: c.ballot_name.clone().unwrap_or_else(|| {
                                join_name(
                                    c.first_name.as_deref().unwrap_or(""),
                                    c.last_name.as_deref().unwrap_or(""),
                                )
                            }),
                            personal_votes: read_js_count(first_present(&c.personal_votes, &c.votes)),
                        })
                        .collect(),
                })
                .collect();
            CanonicalDocument::Results(UpdateRecord {
                polling_area_id,
                polling_area_number: area_number,
                polling_area_name: area.name.unwrap_or_default(),
                municipality: header.municipality,
                municipality_code: header.municipality_code,
                region: header.region,
                election_type,
                election_date: header.election_date,
                revision: None,
                eligible_voters: read_js_count(&d.eligible),
                votes_cast: read_js_count(&d.cast),
                valid_votes: read_js_count(&d.valid),
                invalid_votes: read_js_count(&d.invalid),
                blank_votes: read_js_count(&d.blank),
                parties,
            })
        }
        PayloadKind::MandateDistribution => {
            let mut assignments: Vec<MandateAssignment> = Vec::new();
            let personal = d
                .personal_mandates
                .as_deref()
                .unwrap_or(&[])
                .iter()
                .map(|m| (MandateType::PersonalSeat, m));
            let listed = d
                .list_mandates
                .as_deref()
                .unwrap_or(&[])
                .iter()
                .map(|m| (MandateType::ListSeat, m));
            for (mandate_type, m) in personal.chain(listed) {
                let candidate = m.candidate.clone().unwrap_or_default();
                let list = m.list.clone().unwrap_or_default();
                let candidate_id = match mandate_type {
                    MandateType::PersonalSeat => read_js_opt_text(&candidate.id),
                    _ => None,
                };
                assignments.push(MandateAssignment {
                    mandate_type,
                    number: read_js_count(&m.number),
                    number_on_list: None,
                    candidate_id,
                    ballot_name: join_name(
                        candidate.first_name.as_deref().unwrap_or(""),
                        candidate.last_name.as_deref().unwrap_or(""),
                    ),
                    party_id: read_js_text(&list.id),
                    party_letter: list.letter.unwrap_or_default(),
                    party_name: list.name.unwrap_or_default(),
                });
            }
            CanonicalDocument::Mandates { header, assignments }
        }
    }
}

// ********* Tolerant field readers *********

fn first_present<'a>(a: &'a Option<JSValue>, b: &'a Option<JSValue>) -> &'a Option<JSValue> {
    match a {
        Some(JSValue::Null) | None => b,
        _ => a,
    }
}

fn non_empty(x: &Option<String>) -> Option<String> {
    x.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

/// Identifiers show up both as strings and as numbers.
pub fn read_js_text(x: &Option<JSValue>) -> String {
    read_js_opt_text(x).unwrap_or_default()
}

pub fn read_js_opt_text(x: &Option<JSValue>) -> Option<String> {
    match x {
        Some(JSValue::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(JSValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Counts: missing, null and unreadable values become 0.
pub fn read_js_count(x: &Option<JSValue>) -> u64 {
    read_js_opt_count(x).unwrap_or(0)
}

pub fn read_js_opt_count(x: &Option<JSValue>) -> Option<u64> {
    match x {
        Some(JSValue::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Some(JSValue::String(s)) => s.trim().parse::<u64>().ok(),
        None | Some(JSValue::Null) => None,
        Some(other) => {
            debug!("read_js_count: ignoring unreadable count {:?}", other);
            None
        }
    }
}

fn split_full_name(full_name: &str) -> (String, String) {
    match full_name.trim().split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (full_name.trim().to_string(), String::new()),
    }
}

fn join_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last).trim().to_string()
}
