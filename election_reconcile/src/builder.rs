pub use crate::config::*;

/// A builder for canonical update records.
///
/// Mostly useful for tests and for feeding the engine from sources that are
/// not one of the two payload schemas.
///
/// ```
/// use election_reconcile::builder::UpdateRecordBuilder;
/// use election_reconcile::reconcile::reconcile;
/// use election_reconcile::normalize::vote_result_rows;
///
/// let record = UpdateRecordBuilder::new("A1", "Aarhus")
///     .revision("2025-11-18T22:00:00Z")
///     .valid_votes(105)
///     .party("P1", 105, 93)
///     .candidate("C1", 12)
///     .build();
///
/// let reconciled = reconcile(&vote_result_rows(&record));
/// assert_eq!(reconciled.results[0].list_total, 105);
/// assert!(reconciled.flagged_areas.is_empty());
/// ```
pub struct UpdateRecordBuilder {
    pub(crate) _record: UpdateRecord,
}

impl UpdateRecordBuilder {
    /// Starts a municipal-council record dated 18-11-2025, with every count at zero.
    pub fn new(polling_area_id: &str, municipality: &str) -> UpdateRecordBuilder {
        UpdateRecordBuilder {
            _record: UpdateRecord {
                polling_area_id: polling_area_id.to_string(),
                polling_area_number: String::new(),
                polling_area_name: polling_area_id.to_string(),
                municipality: municipality.to_string(),
                municipality_code: None,
                region: String::new(),
                election_type: ElectionType::MunicipalCouncil,
                election_date: "18-11-2025".to_string(),
                revision: None,
                eligible_voters: 0,
                votes_cast: 0,
                valid_votes: 0,
                invalid_votes: 0,
                blank_votes: 0,
                parties: Vec::new(),
            },
        }
    }

    pub fn election_type(mut self, election_type: ElectionType) -> UpdateRecordBuilder {
        self._record.election_type = election_type;
        self
    }

    pub fn region(mut self, region: &str) -> UpdateRecordBuilder {
        self._record.region = region.to_string();
        self
    }

    pub fn revision(mut self, revision: &str) -> UpdateRecordBuilder {
        self._record.revision = Some(revision.to_string());
        self
    }

    pub fn eligible_voters(mut self, count: u64) -> UpdateRecordBuilder {
        self._record.eligible_voters = count;
        self
    }

    pub fn votes_cast(mut self, count: u64) -> UpdateRecordBuilder {
        self._record.votes_cast = count;
        self
    }

    pub fn valid_votes(mut self, count: u64) -> UpdateRecordBuilder {
        self._record.valid_votes = count;
        self
    }

    pub fn invalid_votes(mut self, count: u64) -> UpdateRecordBuilder {
        self._record.invalid_votes = count;
        self
    }

    pub fn blank_votes(mut self, count: u64) -> UpdateRecordBuilder {
        self._record.blank_votes = count;
        self
    }

    /// Adds a party list. The identifier doubles as the display name.
    ///
    /// list_total: every vote for the party in the area, personal votes included.
    pub fn party(mut self, party_id: &str, list_total: u64, list_only_votes: u64) -> UpdateRecordBuilder {
        self._record.parties.push(PartyResult {
            party_id: party_id.to_string(),
            party_letter: String::new(),
            party_name: party_id.to_string(),
            list_total,
            list_only_votes,
            candidates: Vec::new(),
        });
        self
    }

    /// Adds a candidate to the last party added. Starts an unnamed party if there is none.
    pub fn candidate(mut self, candidate_id: &str, personal_votes: u64) -> UpdateRecordBuilder {
        if self._record.parties.is_empty() {
            self = self.party("", 0, 0);
        }
        if let Some(p) = self._record.parties.last_mut() {
            p.candidates.push(CandidateResult {
                candidate_id: candidate_id.to_string(),
                ballot_name: candidate_id.to_string(),
                personal_votes,
            });
        }
        self
    }

    pub fn build(self) -> UpdateRecord {
        self._record
    }
}
