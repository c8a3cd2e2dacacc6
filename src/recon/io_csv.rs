// Primitives for reading and writing CSV files.

use crate::recon::*;

/// Writes one CSV file, the header taken from the field names of the rows.
/// A table without rows is written as an empty file.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> ReconResult<()> {
    let path_s = path.display().to_string();
    let mut wtr = csv::Writer::from_path(path).context(CsvWriteSnafu { path: path_s.clone() })?;
    for row in rows.iter() {
        wtr.serialize(row).context(CsvWriteSnafu { path: path_s.clone() })?;
    }
    wtr.flush().context(WritingFileSnafu { path: path_s.clone() })?;
    debug!("write_rows: {} rows to {}", rows.len(), path_s);
    Ok(())
}

/// Reads the executive roster, with the header `Kommune,Navn,Parti`.
///
/// Lines without a jurisdiction are skipped.
pub fn read_executives_csv(path: &str) -> ReconResult<Vec<Executive>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvReadSnafu { path })?;
    let mut res: Vec<Executive> = Vec::new();
    for (idx, line_r) in rdr.deserialize::<Executive>().enumerate() {
        let executive = line_r.context(CsvReadSnafu { path })?;
        debug!("read_executives_csv: line {}: {:?}", idx + 2, executive);
        if executive.jurisdiction.is_empty() {
            warn!("read_executives_csv: line {} has no jurisdiction", idx + 2);
            continue;
        }
        res.push(executive);
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Line {
        name: String,
        share: Option<f64>,
    }

    #[test]
    fn rows_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("t.csv");
        let rows = vec![
            Line {
                name: "Aarhus, midt".to_string(),
                share: Some(12.5),
            },
            Line {
                name: "Vest".to_string(),
                share: None,
            },
        ];
        write_rows(&p, &rows).unwrap();
        assert_eq!(
            fs::read_to_string(&p).unwrap(),
            "name,share\n\"Aarhus, midt\",12.5\nVest,\n"
        );
        let empty: Vec<Line> = Vec::new();
        write_rows(&p, &empty).unwrap();
        assert_eq!(fs::read_to_string(&p).unwrap(), "");
    }

    #[test]
    fn executive_roster() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("borgmestre.csv");
        fs::write(
            &p,
            "Kommune,Navn,Parti\nAarhus, Anders And ,Socialdemokratiet\n,Nobody,Venstre\nOdense,Bo Berg,\"Venstre, Danmarks Liberale Parti\"\n",
        )
        .unwrap();
        let executives = read_executives_csv(p.to_str().unwrap()).unwrap();
        assert_eq!(executives.len(), 2);
        assert_eq!(executives[0].name, "Anders And");
        assert_eq!(executives[1].party, "Venstre, Danmarks Liberale Parti");
    }
}
