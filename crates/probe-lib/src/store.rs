//! Append-only delimited store for feature rows
//!
//! The file is opened, appended and closed on every write. Whether a header
//! is needed is decided per append from the file on disk, so restarts never
//! produce a second header.

use crate::models::FeatureRow;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Row-oriented store backed by one delimited text file
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    delimiter: char,
    header_checked: AtomicBool,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>, delimiter: char) -> Self {
        Self {
            path: path.into(),
            delimiter,
            header_checked: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header line for the current schema, without line terminator
    pub fn header(&self) -> String {
        self.join(FeatureRow::COLUMNS.iter().map(|c| c.to_string()))
    }

    /// Serialize one row, without line terminator
    pub fn format_row(&self, row: &FeatureRow) -> String {
        self.join(row.fields().into_iter().map(|(_, value)| value.to_string()))
    }

    /// Append one row, writing the header first if the file is new or empty
    pub fn append(&self, row: &FeatureRow) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        if !needs_header {
            self.check_existing_header();
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);

        if needs_header {
            writeln!(writer, "{}", self.header())?;
            debug!(path = %self.path.display(), "Wrote store header");
        }
        writeln!(writer, "{}", self.format_row(row))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        Ok(())
    }

    /// Warn once if an existing file was written with a different schema
    fn check_existing_header(&self) {
        if self.header_checked.swap(true, Ordering::Relaxed) {
            return;
        }

        let first_line = File::open(&self.path)
            .ok()
            .and_then(|file| BufReader::new(file).lines().next())
            .and_then(|line| line.ok());

        if let Some(existing) = first_line {
            if existing.trim_end() != self.header() {
                warn!(
                    path = %self.path.display(),
                    "Existing store header differs from the current schema, appending anyway"
                );
            }
        }
    }

    fn join(&self, fields: impl Iterator<Item = String>) -> String {
        fields
            .map(|field| quote_field(&field, self.delimiter))
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string())
    }
}

/// Quote a field that contains the delimiter, a quote or a line break
pub fn quote_field(field: &str, delimiter: char) -> String {
    if field.contains(|c: char| c == delimiter || matches!(c, '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::queries;
    use crate::extractor::FeatureExtractor;
    use crate::models::{QueryOutput, Sample};
    use tempfile::TempDir;

    fn row() -> FeatureRow {
        let sample = Sample::new(
            "emulator-5554",
            vec![
                (
                    queries::ACTIVITY.to_string(),
                    QueryOutput::Available(
                        "mResumedActivity: ActivityRecord{1 u0 com.whatsapp/.Main t3}".to_string(),
                    ),
                ),
                (
                    queries::WIFI.to_string(),
                    QueryOutput::Available(r#"mWifiInfo SSID: "Cafe, Free", RSSI: -70"#.to_string()),
                ),
            ],
        );
        FeatureExtractor::default().extract(&sample)
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_quote_field() {
        assert_eq!(quote_field("plain", ','), "plain");
        assert_eq!(quote_field("a,b", ','), "\"a,b\"");
        assert_eq!(quote_field("say \"hi\"", ','), "\"say \"\"hi\"\"\"");
        assert_eq!(quote_field("two\nlines", ','), "\"two\nlines\"");
        assert_eq!(quote_field("a,b", ';'), "a,b");
    }

    #[test]
    fn test_header_written_once_across_store_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.csv");

        // Each store instance stands in for a separate process invocation
        for _ in 0..3 {
            let store = CsvStore::new(&path, ',');
            store.append(&row()).unwrap();
            store.append(&row()).unwrap();
        }

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], CsvStore::new(&path, ',').header());
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("timestamp,")).count(),
            1
        );
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.csv");
        std::fs::write(&path, "").unwrap();

        let store = CsvStore::new(&path, ',');
        store.append(&row()).unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("timestamp,device_serial,"));
    }

    #[test]
    fn test_row_columns_match_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("metrics.tsv");
        let store = CsvStore::new(&path, '\t');
        store.append(&row()).unwrap();

        let lines = read_lines(&path);
        let header: Vec<&str> = lines[0].split('\t').collect();
        let data: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(header, FeatureRow::COLUMNS);
        assert_eq!(data.len(), header.len());
    }

    #[test]
    fn test_fields_with_delimiter_are_quoted() {
        let store = CsvStore::new("unused.csv", ',');
        let line = store.format_row(&row());

        assert!(line.contains(",\"Cafe, Free\","));
        assert!(line.starts_with(&row().timestamp[..10]));
    }
}
