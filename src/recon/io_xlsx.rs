// Reading of the executive roster from an Excel workbook.

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::recon::*;

const HEADER: [&str; 3] = ["Kommune", "Navn", "Parti"];

fn read_cell(path: &str, lineno: u64, cell: &DataType) -> ReconResult<String> {
    match cell {
        DataType::String(s) => Ok(s.trim().to_string()),
        DataType::Empty => Ok("".to_string()),
        DataType::Int(i) => Ok(i.to_string()),
        DataType::Float(f) => Ok(f.to_string()),
        _ => Err(ReconError::ExcelWrongCellType {
            path: path.to_string(),
            lineno,
            content: format!("{:?}", cell),
        }),
    }
}

/// Reads the first worksheet. The first row must carry the columns
/// `Kommune`, `Navn` and `Parti`, in any order.
pub fn read_executives_excel(path: &str) -> ReconResult<Vec<Executive>> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyExcelSnafu { path })?
        .context(OpeningExcelSnafu { path })?;

    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu { path })?;
    debug!("read_executives_excel: header: {:?}", header);
    let mut columns: Vec<usize> = Vec::new();
    for name in HEADER.iter() {
        let idx = header
            .iter()
            .position(|c| matches!(c, DataType::String(s) if s.trim() == *name));
        match idx {
            Some(i) => columns.push(i),
            None => whatever!("Excel file {} has no column {}", path, name),
        }
    }

    let mut res: Vec<Executive> = Vec::new();
    for (idx, row) in iter.enumerate() {
        let lineno = (idx + 2) as u64;
        let mut values: Vec<String> = Vec::new();
        for col in columns.iter() {
            let v = match row.get(*col) {
                Some(cell) => read_cell(path, lineno, cell)?,
                None => "".to_string(),
            };
            values.push(v);
        }
        if values[0].is_empty() {
            debug!("read_executives_excel: line {} has no jurisdiction", lineno);
            continue;
        }
        res.push(Executive {
            jurisdiction: values[0].clone(),
            name: values[1].clone(),
            party: values[2].clone(),
        });
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells() {
        assert_eq!(read_cell("x.xlsx", 2, &DataType::String(" Aarhus ".to_string())).unwrap(), "Aarhus");
        assert_eq!(read_cell("x.xlsx", 2, &DataType::Int(751)).unwrap(), "751");
        assert_eq!(read_cell("x.xlsx", 2, &DataType::Empty).unwrap(), "");
        assert!(matches!(
            read_cell("x.xlsx", 3, &DataType::Bool(true)),
            Err(ReconError::ExcelWrongCellType { lineno: 3, .. })
        ));
    }

    #[test]
    fn missing_workbook() {
        assert!(matches!(
            read_executives_excel("/nonexistent/borgmestre.xlsx"),
            Err(ReconError::OpeningExcel { .. })
        ));
    }
}
