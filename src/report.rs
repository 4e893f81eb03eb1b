//! CSV output of histories and run summaries.
//!
//! Every row type is a `serde::Serialize` struct; the `csv` writer derives the header from the
//! field names, so a row type needs nothing else to be written.

use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::Path;

use csv::Writer;
use serde::Serialize;

use crate::error::SimError;

// Checks that the path is valid. Creates the file and all parent directories if
// they do not exist. Returns the file if successful.
fn generate_validate_filepath(path: &Path) -> Result<File, SimError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            Ok(file)
        }
        _ => Err(SimError::Report(format!(
            "output files must be CSVs, got {}",
            path.display()
        ))),
    }
}

/// Writes `rows` with a header line to the CSV file at `path`, replacing any existing file.
///
/// # Errors
///
/// Fails if `path` does not end in `.csv`, the file cannot be created, or a row cannot be
/// serialized.
pub fn write_csv<R: Serialize>(
    rows: impl IntoIterator<Item = R>,
    path: &Path,
) -> Result<(), SimError> {
    let file = generate_validate_filepath(path)?;
    write_csv_to(rows, file)
}

/// Writes `rows` with a header line to `writer`.
///
/// # Errors
///
/// Fails if a row cannot be serialized or written.
pub fn write_csv_to<R: Serialize, W: Write>(
    rows: impl IntoIterator<Item = R>,
    writer: W,
) -> Result<(), SimError> {
    let mut writer = Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct SampleRow {
        id: u32,
        value: String,
        time: Option<f64>,
    }

    fn rows() -> Vec<SampleRow> {
        vec![
            SampleRow {
                id: 1,
                value: "first".to_string(),
                time: Some(0.5),
            },
            SampleRow {
                id: 2,
                value: "second".to_string(),
                time: None,
            },
        ]
    }

    #[test]
    fn writes_header_and_rows() {
        let mut buffer = Vec::new();
        write_csv_to(rows(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "id,value,time\n1,first,0.5\n2,second,\n");
    }

    #[test]
    fn directory_creation_writing_works() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("run_0").join("sample.csv");
        write_csv(rows(), &file_path).unwrap();
        assert!(file_path.exists(), "CSV file should exist");

        let mut reader = csv::Reader::from_path(file_path).unwrap();
        let read: Vec<SampleRow> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(read, rows());
    }

    #[test]
    fn only_csvs_allowed() {
        let temp_dir = tempdir().unwrap();
        let err = write_csv(rows(), &temp_dir.path().join("sample.tsv")).unwrap_err();
        assert!(matches!(err, SimError::Report(_)));
    }
}
