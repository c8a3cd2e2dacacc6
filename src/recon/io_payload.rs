// Reading of the published JSON updates from a directory tree.

use crate::recon::io_common::*;
use crate::recon::*;

use election_reconcile::payload::SourcePayload;
use walkdir::{DirEntry, WalkDir};

/// A file that could not be turned into a payload. The run goes on without it.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct Snapshot {
    pub files_found: usize,
    pub payloads: Vec<SourcePayload>,
    pub failures: Vec<FileFailure>,
}

fn read_payload(root: &Path, path: &Path) -> Result<SourcePayload, String> {
    let name = source_name(root, path);
    let contents = fs::read_to_string(path).map_err(|e| format!("cannot read: {}", e))?;
    // Some publications start with a byte-order mark.
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(&contents);
    let js: JSValue = serde_json::from_str(contents).map_err(|e| format!("invalid JSON: {}", e))?;
    SourcePayload::resolve(
        &name,
        kind_from_file_name(path),
        election_type_from_path(&name),
        js,
    )
    .map_err(|e| e.to_string())
}

fn is_excluded(entry: &DirEntry, exclude: Option<&Path>) -> bool {
    match exclude {
        Some(ex) if entry.file_type().is_dir() => {
            entry.path() == ex
                || match (fs::canonicalize(entry.path()), fs::canonicalize(ex)) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
        }
        _ => false,
    }
}

/// Reads every `.json` file below `root`, in file name order.
///
/// Files that cannot be read, parsed or classified are logged and counted,
/// never fatal. The directory `exclude` (usually the output directory) is not
/// entered.
pub fn read_snapshot(root: &Path, exclude: Option<&Path>) -> ReconResult<Snapshot> {
    let mut snapshot = Snapshot {
        files_found: 0,
        payloads: Vec::new(),
        failures: Vec::new(),
    };
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e, exclude));
    for entry_r in walker {
        let entry = entry_r.context(WalkingDirectorySnafu {
            path: root.display().to_string(),
        })?;
        if !entry.file_type().is_file() || !is_payload_file(entry.path()) {
            continue;
        }
        snapshot.files_found += 1;
        match read_payload(root, entry.path()) {
            Ok(p) => {
                debug!(
                    "read_snapshot: {} as {:?} {}",
                    p.source_name, p.kind, p.election_type
                );
                snapshot.payloads.push(p);
            }
            Err(reason) => {
                let path = source_name(root, entry.path());
                warn!("read_snapshot: skipping {}: {}", path, reason);
                snapshot.failures.push(FileFailure { path, reason });
            }
        }
    }
    info!(
        "read_snapshot: {} payloads from {} files under {}",
        snapshot.payloads.len(),
        snapshot.files_found,
        root.display()
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_read_in_name_order_and_failures_counted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("kommunalvalg")).unwrap();
        fs::create_dir_all(root.join("out")).unwrap();
        let doc = r#"{"Valgdag": "18-11-2025", "Kommune": "Aarhus", "GyldigeStemmer": 3}"#;
        fs::write(root.join("kommunalvalg/b-valgresultater.json"), doc).unwrap();
        fs::write(root.join("kommunalvalg/a-valgresultater.json"), format!("\u{feff}{}", doc)).unwrap();
        // No election type anywhere.
        fs::write(root.join("unknown.json"), doc).unwrap();
        fs::write(root.join("kommunalvalg/notes.txt"), "x").unwrap();
        fs::write(root.join("out/aggregates.json"), "{}").unwrap();

        let snapshot = read_snapshot(root, Some(root.join("out").as_path())).unwrap();
        assert_eq!(snapshot.files_found, 3);
        let names: Vec<&str> = snapshot.payloads.iter().map(|p| p.source_name.as_str()).collect();
        assert_eq!(names, vec!["kommunalvalg/a-valgresultater.json", "kommunalvalg/b-valgresultater.json"]);
        assert_eq!(snapshot.payloads[0].election_type, ElectionType::MunicipalCouncil);
        assert_eq!(snapshot.payloads[0].kind, PayloadKind::AreaResults);
        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].path, "unknown.json");
    }
}
