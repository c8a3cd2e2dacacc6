use log::{debug, info, warn};
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use election_reconcile::aggregate::{serialize_percent_opt, Aggregates};
use election_reconcile::analysis::Skip;
use election_reconcile::reconcile::{AreaFlag, Reconciliation};
use election_reconcile::validate::ValidationSummary;
use election_reconcile::*;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_payload;
pub mod io_xlsx;

use crate::recon::config_reader::*;
use crate::recon::io_csv::{read_executives_csv, write_rows};
use crate::recon::io_payload::{read_snapshot, FileFailure};
use crate::recon::io_xlsx::read_executives_excel;

#[derive(Debug, Snafu)]
pub enum ReconError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing JSON output"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error walking the input directory {path}"))]
    WalkingDirectory {
        source: walkdir::Error,
        path: String,
    },
    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Excel file {path} has no worksheet"))]
    EmptyExcel { path: String },
    #[snafu(display("Excel file {path}, line {lineno}: unexpected cell {content}"))]
    ExcelWrongCellType {
        path: String,
        lineno: u64,
        content: String,
    },
    #[snafu(display("Error reading CSV file {path}"))]
    CsvRead { source: csv::Error, path: String },
    #[snafu(display("Error writing CSV file {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("No input directory given (use --input)"))]
    MissingInput {},
    #[snafu(display("{source}"))]
    Core { source: ReconcileErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ReconResult<T> = Result<T, ReconError>;

/// What happened during a run: written to `run_summary.json`.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(skip)]
    pub output_directory: String,
    pub files_found: usize,
    pub files_failed: Vec<FileFailure>,
    pub payloads_received: usize,
    pub payloads_accepted: usize,
    pub payloads_out_of_cycle: usize,
    pub payloads_verification: usize,
    pub candidates: usize,
    pub vote_results: usize,
    pub mandates: usize,
    pub candidates_removed: usize,
    pub vote_results_removed: usize,
    pub mandates_removed: usize,
    pub mandate_parties_resolved: usize,
    pub clamped_results: usize,
    pub reconcile_warnings: usize,
    pub flagged_areas: Vec<AreaFlag>,
    pub analysis_skips: Vec<Skip>,
    pub validation: ValidationSummary,
}

/// One line of `reconciled_area_party_*.csv`.
#[derive(PartialEq, Debug, Clone, Serialize)]
struct ReconciledRow {
    election_type: ElectionType,
    jurisdiction: String,
    municipality: String,
    polling_area_id: String,
    polling_area_name: String,
    party_id: String,
    party_name: String,
    list_total: u64,
    reported_list_total: u64,
    list_only_votes: u64,
    personal_votes: u64,
    candidates: usize,
    valid_votes_in_area: u64,
    #[serde(serialize_with = "serialize_percent_opt")]
    area_share_percent: Option<f64>,
    clamped: bool,
    flagged: bool,
}

fn reconciled_rows(rec: &Reconciliation) -> Vec<ReconciledRow> {
    rec.results
        .iter()
        .map(|r| ReconciledRow {
            election_type: r.election_type,
            jurisdiction: r.jurisdiction.clone(),
            municipality: r.municipality.clone(),
            polling_area_id: r.polling_area_id.clone(),
            polling_area_name: r.polling_area_name.clone(),
            party_id: r.party_id.clone(),
            party_name: r.party_name.clone(),
            list_total: r.list_total,
            reported_list_total: r.reported_list_total,
            list_only_votes: r.list_only_votes,
            personal_votes: r.personal_votes_total(),
            candidates: r.personal_votes_by_candidate.len(),
            valid_votes_in_area: r.valid_votes_in_area,
            area_share_percent: r.area_share().percent(),
            clamped: r.was_clamped(),
            flagged: rec.is_flagged(r.election_type, &r.polling_area_id),
        })
        .collect()
}

/// Writes `{stem}_municipal.csv`, `{stem}_regional.csv` and `{stem}_all.csv`.
fn write_by_election_type<T, F>(dir: &Path, stem: &str, rows: &[T], election_type: F) -> ReconResult<()>
where
    T: Serialize,
    F: Fn(&T) -> ElectionType,
{
    for et in ElectionType::ALL.iter() {
        let selected: Vec<&T> = rows.iter().filter(|r| election_type(r) == *et).collect();
        write_rows(&dir.join(format!("{}_{}.csv", stem, et.label())), &selected)?;
    }
    write_rows(&dir.join(format!("{}_all.csv", stem)), rows)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> ReconResult<()> {
    let pretty = serde_json::to_string_pretty(value).context(SerializingJsonSnafu {})?;
    fs::write(path, format!("{}\n", pretty)).context(WritingFileSnafu {
        path: path.display().to_string(),
    })?;
    debug!("write_json: wrote {}", path.display());
    Ok(())
}

fn write_outputs(out_p: &Path, out: &CoreOutput) -> ReconResult<()> {
    write_by_election_type(out_p, "candidates", &out.candidates, |r| r.election_type)?;
    write_by_election_type(out_p, "vote_results", &out.vote_results, |r| r.election_type)?;
    write_by_election_type(out_p, "mandates", &out.mandates, |r| r.election_type)?;
    write_by_election_type(
        out_p,
        "reconciled_area_party",
        &reconciled_rows(&out.reconciliation),
        |r| r.election_type,
    )?;

    let aggregates = &out.aggregates;
    // The national lines follow the jurisdiction lines, with an empty jurisdiction.
    let party_totals: Vec<_> = aggregates
        .party_totals_by_jurisdiction
        .iter()
        .chain(aggregates.national_party_totals.iter())
        .collect();
    write_rows(&out_p.join("party_totals_by_jurisdiction.csv"), &party_totals)?;
    write_rows(&out_p.join("area_party_totals.csv"), &aggregates.area_party_totals)?;
    write_rows(&out_p.join("turnout_by_jurisdiction.csv"), &aggregates.turnout)?;
    write_rows(&out_p.join("gender_balance.csv"), &aggregates.gender_balance)?;
    write_rows(&out_p.join("top_vote_getters.csv"), &aggregates.top_vote_getters)?;

    let analyses = &out.analyses;
    write_rows(&out_p.join("robbed_candidates.csv"), &analyses.robbed_candidates.rows)?;
    write_rows(&out_p.join("dependency_ratio.csv"), &analyses.dependency.rows)?;
    write_rows(&out_p.join("strongholds.csv"), &analyses.strongholds.rows)?;
    write_rows(&out_p.join("thin_majorities.csv"), &analyses.thin_majorities.rows)?;

    write_json(&out_p.join("aggregates.json"), aggregates)?;
    write_json(&out_p.join("validation_report.json"), &out.validation)?;
    Ok(())
}

fn build_summary(out_p: &Path, files_found: usize, failures: Vec<FileFailure>, out: &CoreOutput) -> RunSummary {
    let analyses = &out.analyses;
    let analysis_skips: Vec<Skip> = analyses
        .robbed_candidates
        .skipped
        .iter()
        .chain(analyses.dependency.skipped.iter())
        .chain(analyses.strongholds.skipped.iter())
        .chain(analyses.thin_majorities.skipped.iter())
        .cloned()
        .collect();
    RunSummary {
        output_directory: out_p.display().to_string(),
        files_found,
        files_failed: failures,
        payloads_received: out.payloads.received,
        payloads_accepted: out.payloads.accepted,
        payloads_out_of_cycle: out.payloads.out_of_cycle,
        payloads_verification: out.payloads.verification,
        candidates: out.candidates.len(),
        vote_results: out.vote_results.len(),
        mandates: out.mandates.len(),
        candidates_removed: out.dedup.candidates_removed,
        vote_results_removed: out.dedup.vote_results_removed,
        mandates_removed: out.dedup.mandates_removed,
        mandate_parties_resolved: out.mandate_parties_resolved,
        clamped_results: out.reconciliation.clamped_count(),
        reconcile_warnings: out.reconciliation.warnings.len(),
        flagged_areas: out.reconciliation.flagged_areas.clone(),
        analysis_skips,
        validation: out.validation.summary.clone(),
    }
}

fn read_executives(path: &str) -> ReconResult<Vec<Executive>> {
    let lower = path.to_lowercase();
    let executives = if lower.ends_with(".xlsx") || lower.ends_with(".xlsm") {
        read_executives_excel(path)?
    } else {
        read_executives_csv(path)?
    };
    info!("read_executives: {} executives read from {}", executives.len(), path);
    Ok(executives)
}

/// Compares the computed aggregates with the aggregates of a previous run.
///
/// Both sides go through the same JSON value representation, so that key order
/// and number formatting do not matter.
fn check_reference(reference_path: &str, aggregates: &Aggregates) -> ReconResult<()> {
    let reference_js = read_json_file(reference_path)?;
    let computed_js = serde_json::to_value(aggregates).context(SerializingJsonSnafu {})?;
    let pretty_reference = serde_json::to_string_pretty(&reference_js).context(SerializingJsonSnafu {})?;
    let pretty_computed = serde_json::to_string_pretty(&computed_js).context(SerializingJsonSnafu {})?;
    if pretty_reference != pretty_computed {
        warn!("check_reference: found differences with the reference aggregates");
        print_diff(pretty_reference.as_str(), pretty_computed.as_ref(), "\n");
        whatever!("Difference detected between the computed aggregates and the reference aggregates")
    }
    info!("check_reference: aggregates match {}", reference_path);
    Ok(())
}

/// Runs the full pipeline over a directory of published updates and writes
/// every table and report into the output directory.
pub fn run_pipeline(
    input: &Option<String>,
    out: &Option<String>,
    config_path: &Option<String>,
    reference_totals_path: &Option<String>,
    executives_path: &Option<String>,
    category_overrides_path: &Option<String>,
    reference_path: &Option<String>,
) -> ReconResult<RunSummary> {
    let input = input.clone().context(MissingInputSnafu {})?;
    let input_p = Path::new(input.as_str());
    if !input_p.is_dir() {
        whatever!("The input directory {} does not exist", input)
    }
    let out_p: PathBuf = match out {
        Some(o) => PathBuf::from(o),
        None => input_p.join("reconciled"),
    };

    let settings = read_settings(config_path, category_overrides_path)?;
    debug!("run_pipeline: settings: {:?}", settings);
    let reference_totals = match reference_totals_path {
        Some(p) => Some(read_reference_totals(p)?),
        None => None,
    };
    let executives = match executives_path {
        Some(p) => Some(read_executives(p)?),
        None => None,
    };

    fs::create_dir_all(&out_p).context(WritingFileSnafu {
        path: out_p.display().to_string(),
    })?;

    let snapshot = read_snapshot(input_p, Some(out_p.as_path()))?;
    info!(
        "run_pipeline: {} files found, {} payloads decoded, {} files failed",
        snapshot.files_found,
        snapshot.payloads.len(),
        snapshot.failures.len()
    );

    let core = run_core(
        &snapshot.payloads,
        &settings,
        &NoCategoryLookup,
        executives.as_deref(),
        reference_totals.as_ref(),
    )
    .context(CoreSnafu {})?;

    for f in core.validation.failures() {
        warn!("run_pipeline: check failed: {} {}", f.name, f.detail);
    }

    write_outputs(&out_p, &core)?;
    let summary = build_summary(&out_p, snapshot.files_found, snapshot.failures, &core);
    write_json(&out_p.join("run_summary.json"), &summary)?;
    info!("run_pipeline: outputs written to {}", out_p.display());

    if let Some(p) = reference_path {
        check_reference(p, &core.aggregates)?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(root: &Path, relative: &str, content: &str) {
        let p = root.join(relative);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }

    fn results(area: &str, released: &str, votes: u64) -> JSValue {
        json!({
            "Valgart": "Kommunalvalg",
            "Valgdag": "18-11-2025",
            "AfstemningsområdeDagiId": area,
            "Afstemningsområde": format!("Skole {}", area),
            "Kommune": "Aarhus",
            "FrigivelsesTidspunktUTC": released,
            "AntalStemmeberettigedeVælgere": 1000,
            "AfgivneStemmer": votes + 10,
            "GyldigeStemmer": votes,
            "UgyldigeStemmerUdoverBlanke": 4,
            "BlankeUgyldigeFremmødteStemmer": 5,
            "BlankeUgyldigeBrevstemmer": 1,
            "Kandidatlister": [
                {"KandidatlisteId": "A", "Bogstavbetegnelse": "A", "Navn": "Socialdemokratiet",
                 "Stemmer": votes, "Listestemmer": votes / 2,
                 "Kandidater": [
                    {"Id": "C1", "Stemmeseddelnavn": "Anna Holm", "Stemmer": votes / 4},
                    {"Id": "C2", "Stemmeseddelnavn": "Bo Lund", "Stemmer": votes / 4}
                 ]}
            ]
        })
    }

    fn input_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let roster = json!({
            "Valgart": "Kommunalvalg",
            "Valgdag": "18-11-2025",
            "Kommune": "Aarhus",
            "FrigivelsesTidspunktUTC": "2025-11-01T10:00:00Z",
            "Kandidatlister": [
                {"KandidatlisteId": "A", "Bogstavbetegnelse": "A", "Navn": "Socialdemokratiet",
                 "Kandidater": [
                    {"Id": "C1", "Navn": "Anna Marie Holm", "Stemmeseddelnavn": "Anna Holm"},
                    {"Id": "C2", "Navn": "Bo Lund", "Stemmeseddelnavn": "Bo Lund"}
                 ]}
            ]
        });
        let mandates = json!({
            "Valgart": "Kommunalvalg",
            "Valgdag": "18-11-2025",
            "Kommune": "Aarhus",
            "FrigivelsesTidspunktUTC": "2025-11-19T03:00:00Z",
            "PersonligeMandater": [
                {"Nummer": 1, "KandidatId": "C1", "KandidatlisteId": "A", "KandidatlisteNavn": "Socialdemokratiet"}
            ]
        });
        write(root, "kommunalvalg/kandidat-data/kandidat-data-aarhus.json", &roster.to_string());
        write(
            root,
            "kommunalvalg/valgresultater/valgresultater-7001-a.json",
            &results("7001", "2025-11-18T21:00:00Z", 400).to_string(),
        );
        // A later update of the same area, with a byte-order mark.
        write(
            root,
            "kommunalvalg/valgresultater/valgresultater-7001-b.json",
            &format!("\u{feff}{}", results("7001", "2025-11-18T23:00:00Z", 480)),
        );
        write(
            root,
            "kommunalvalg/valgresultater/valgresultater-7002.json",
            &results("7002", "2025-11-18T22:00:00Z", 300).to_string(),
        );
        write(root, "kommunalvalg/mandatfordeling/mandatfordeling-aarhus.json", &mandates.to_string());
        write(
            root,
            "verifikation/valgresultater-9999.json",
            &results("9999", "2025-11-18T22:00:00Z", 100).to_string(),
        );
        write(root, "kommunalvalg/valgresultater/broken.json", "{\"Valgart\": ");
        write(root, "kommunalvalg/README.txt", "not a payload");
        dir
    }

    fn run(input: &Path, out: Option<&Path>) -> ReconResult<RunSummary> {
        run_pipeline(
            &Some(input.display().to_string()),
            &out.map(|o| o.display().to_string()),
            &None,
            &None,
            &None,
            &None,
            &None,
        )
    }

    #[test]
    fn runs_are_byte_identical() {
        let input = input_tree();
        let out1 = tempfile::tempdir().unwrap();
        let out2 = tempfile::tempdir().unwrap();
        let s1 = run(input.path(), Some(out1.path())).unwrap();
        let s2 = run(input.path(), Some(out2.path())).unwrap();
        assert_eq!(s1.files_found, 7);
        assert_eq!(s1.files_failed.len(), 1);
        assert_eq!(s1.payloads_verification, 1);
        assert_eq!(s1.vote_results_removed, 2);
        assert_eq!(s1.validation, s2.validation);

        let mut names: Vec<String> = fs::read_dir(out1.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert!(names.contains(&"aggregates.json".to_string()));
        assert!(names.contains(&"vote_results_all.csv".to_string()));
        assert!(names.contains(&"reconciled_area_party_regional.csv".to_string()));
        for name in names.iter() {
            let b1 = fs::read(out1.path().join(name)).unwrap();
            let b2 = fs::read(out2.path().join(name)).unwrap();
            assert_eq!(b1, b2, "{} differs between runs", name);
        }
    }

    #[test]
    fn newest_update_is_written() {
        let input = input_tree();
        let out = tempfile::tempdir().unwrap();
        run(input.path(), Some(out.path())).unwrap();
        let reconciled = fs::read_to_string(out.path().join("reconciled_area_party_municipal.csv")).unwrap();
        assert!(reconciled.contains("7001"));
        assert!(reconciled.contains(",480,"));
        assert!(!reconciled.contains(",400,"));
    }

    #[test]
    fn default_output_is_not_read_back() {
        let input = input_tree();
        let s1 = run(input.path(), None).unwrap();
        let s2 = run(input.path(), None).unwrap();
        assert!(input.path().join("reconciled").join("run_summary.json").exists());
        assert_eq!(s1.files_found, s2.files_found);
        assert_eq!(s1.files_failed, s2.files_failed);
    }

    #[test]
    fn reference_aggregates() {
        let input = input_tree();
        let out1 = tempfile::tempdir().unwrap();
        run(input.path(), Some(out1.path())).unwrap();
        let reference = out1.path().join("aggregates.json").display().to_string();

        let out2 = tempfile::tempdir().unwrap();
        let same = run_pipeline(
            &Some(input.path().display().to_string()),
            &Some(out2.path().display().to_string()),
            &None,
            &None,
            &None,
            &None,
            &Some(reference),
        );
        assert!(same.is_ok());

        let tampered = out1.path().join("tampered.json");
        fs::write(&tampered, "{\"party_totals_by_jurisdiction\": []}").unwrap();
        let different = run_pipeline(
            &Some(input.path().display().to_string()),
            &Some(out2.path().display().to_string()),
            &None,
            &None,
            &None,
            &None,
            &Some(tampered.display().to_string()),
        );
        assert!(different.is_err());
    }

    #[test]
    fn fatal_errors() {
        assert!(matches!(
            run_pipeline(&None, &None, &None, &None, &None, &None, &None),
            Err(ReconError::MissingInput {})
        ));
        let empty = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        assert!(matches!(
            run(empty.path(), Some(out.path())),
            Err(ReconError::Core {
                source: ReconcileErrors::EmptySnapshot
            })
        ));
    }
}
