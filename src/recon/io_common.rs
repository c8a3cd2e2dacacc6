use std::path::Path;

use election_reconcile::{ElectionType, PayloadKind};

pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// The name a payload is known by: its path relative to the input root, with
/// forward slashes.
pub fn source_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<String>>()
        .join("/")
}

/// The payload kind announced by the file name, if any.
pub fn kind_from_file_name(path: &Path) -> Option<PayloadKind> {
    let name = simplify_file_name(path).to_lowercase();
    if name.contains("kandidat-data") {
        Some(PayloadKind::CandidateRoster)
    } else if name.contains("valgresultater") {
        Some(PayloadKind::AreaResults)
    } else if name.contains("mandatfordeling") {
        Some(PayloadKind::MandateDistribution)
    } else {
        None
    }
}

/// The election type announced by the path (`kommunalvalg`, `regionsrådsvalg`,
/// `region`), if any.
pub fn election_type_from_path(source_name: &str) -> Option<ElectionType> {
    ElectionType::from_designation(source_name)
}

pub fn is_payload_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let p = Path::new("/data/Regionsrådsvalg/valgresultater/valgresultater-101-7.json");
        assert_eq!(kind_from_file_name(p), Some(PayloadKind::AreaResults));
        assert_eq!(
            election_type_from_path(&source_name(Path::new("/data"), p)),
            Some(ElectionType::RegionalCouncil)
        );
        let p = Path::new("/data/kommunalvalg/Kandidat-Data-Aarhus.json");
        assert_eq!(kind_from_file_name(p), Some(PayloadKind::CandidateRoster));
        assert_eq!(
            election_type_from_path(&source_name(Path::new("/data"), p)),
            Some(ElectionType::MunicipalCouncil)
        );
        assert_eq!(kind_from_file_name(Path::new("/data/x/mandatfordeling.json")), Some(PayloadKind::MandateDistribution));
        assert_eq!(kind_from_file_name(Path::new("/data/x/other.json")), None);
        assert_eq!(election_type_from_path("x/other.json"), None);
    }

    #[test]
    fn payload_files() {
        assert!(is_payload_file(Path::new("a/b.json")));
        assert!(is_payload_file(Path::new("a/b.JSON")));
        assert!(!is_payload_file(Path::new("a/b.csv")));
        assert!(!is_payload_file(Path::new("a/json")));
        assert_eq!(source_name(Path::new("/in"), Path::new("/in/a/b.json")), "a/b.json");
    }
}
