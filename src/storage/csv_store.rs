use crate::record::{Field, MergedRecord};
use crate::storage::{AppendSummary, EnrichmentSignal, RecordStore, StorageError, StorageResult, StoreIndex};
use chrono::Local;
use std::collections::{BTreeSet, HashSet};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Record store backed by a CSV file with a header row
///
/// Rows are appended in place while the header is unchanged. When an append
/// brings a column the header lacks, the whole table is rewritten through a
/// temporary file with the new column added at the end and empty cells for the
/// existing rows. Columns the harvester does not know are carried over as-is.
#[derive(Debug)]
pub struct CsvRecordStore {
    path: PathBuf,
    signal: EnrichmentSignal,
    header: Vec<String>,
    index: StoreIndex,
    loaded: bool,
}

impl CsvRecordStore {
    pub fn new(path: impl Into<PathBuf>, signal: EnrichmentSignal) -> Self {
        Self {
            path: path.into(),
            signal,
            header: Vec::new(),
            index: StoreIndex::default(),
            loaded: false,
        }
    }

    /// Creates the store and loads its index
    pub fn open(path: impl Into<PathBuf>, signal: EnrichmentSignal) -> StorageResult<Self> {
        let mut store = Self::new(path, signal);
        store.load()?;
        Ok(store)
    }

    /// Loads the index without moving an unreadable table aside
    pub fn inspect(path: impl Into<PathBuf>, signal: EnrichmentSignal) -> StorageResult<Self> {
        let mut store = Self::new(path, signal);
        if store.path.exists() {
            let (header, index) = store.read_table()?;
            store.header = header;
            store.index = index;
        }
        store.loaded = true;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current header, empty before the first row is written
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Header after writing `batch`: the existing columns in their order, then
    /// any missing required column, then any missing column the batch carries
    fn planned_header(&self, batch: &[&MergedRecord]) -> Vec<String> {
        let present: BTreeSet<Field> = batch
            .iter()
            .flat_map(|record| record.cells().map(|(field, _)| field))
            .collect();

        let mut header = self.header.clone();
        let wanted = Field::REQUIRED.iter().chain(present.iter());
        for field in wanted {
            if !header.iter().any(|column| column == field.column()) {
                header.push(field.column().to_string());
            }
        }
        header
    }

    fn read_rows(&self) -> StorageResult<Vec<Vec<String>>> {
        if self.header.is_empty() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;

        let mut rows = Vec::new();
        for row in reader.records() {
            rows.push(row?.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    /// Rewrites the table under a new header
    fn rewrite(&self, header: &[String], new_rows: &[Vec<String>]) -> StorageResult<()> {
        let existing = self.read_rows()?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut temp = NamedTempFile::new_in(&dir)?;

        {
            let mut writer = csv::WriterBuilder::new().from_writer(temp.as_file_mut());
            writer.write_record(header)?;
            for mut row in existing {
                row.resize(header.len(), String::new());
                writer.write_record(&row)?;
            }
            for row in new_rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }

        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Reads the header and the id -> has-details index
    fn read_table(&self) -> StorageResult<(Vec<String>, StoreIndex)> {
        let mut index = StoreIndex::default();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if header.iter().all(|column| column.is_empty()) {
            return Ok((Vec::new(), index));
        }

        let id_column = header
            .iter()
            .position(|column| column == Field::RecordId.column())
            .ok_or_else(|| StorageError::MissingIdColumn {
                path: self.path.display().to_string(),
                column: Field::RecordId.column().to_string(),
            })?;
        let signal_column = header
            .iter()
            .position(|column| column == self.signal.column());

        for row in reader.records() {
            let row = row?;
            let Some(id) = row.get(id_column).map(str::trim).filter(|id| !id.is_empty()) else {
                continue;
            };
            let enriched = self
                .signal
                .is_enriched_cell(signal_column.and_then(|c| row.get(c)));
            index.has_details.entry(id.to_string()).or_insert(enriched);
        }

        Ok((header, index))
    }

    fn quarantine(&self) -> StorageResult<PathBuf> {
        let mut target = self.path.clone().into_os_string();
        target.push(format!(".corrupt-{}", Local::now().format("%Y%m%d%H%M%S")));
        let target = PathBuf::from(target);
        std::fs::rename(&self.path, &target)?;
        Ok(target)
    }

    fn append_rows(&self, rows: &[Vec<String>]) -> StorageResult<()> {
        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;

        // An interrupted write can leave the last row unterminated
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                tracing::warn!("Record table {} ends mid-row, terminating it", self.path.display());
                file.write_all(b"\n")?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn row_for(header: &[String], record: &MergedRecord) -> Vec<String> {
    header
        .iter()
        .map(|column| {
            Field::from_column(column)
                .and_then(|field| record.get(field))
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

impl RecordStore for CsvRecordStore {
    /// Rebuilds the index from the table on disk
    ///
    /// A table that exists but cannot be read as CSV, or has no id column, is
    /// moved aside to `<path>.corrupt-<timestamp>` and the store starts empty.
    /// IO errors are returned.
    fn load(&mut self) -> StorageResult<StoreIndex> {
        self.header.clear();
        self.index = StoreIndex::default();
        self.loaded = true;

        if !self.path.exists() {
            return Ok(self.index.clone());
        }

        match self.read_table() {
            Ok((header, index)) => {
                self.header = header;
                self.index = index;
                tracing::info!(
                    "Loaded {} records ({} with details) from {}",
                    self.index.len(),
                    self.index.enriched_count(),
                    self.path.display()
                );
            }
            Err(e) if e.is_corruption() => {
                let moved_to = self.quarantine()?;
                tracing::warn!(
                    "Record table {} is unreadable ({}); moved to {} and starting a new table",
                    self.path.display(),
                    e,
                    moved_to.display()
                );
            }
            Err(e) => return Err(e),
        }
        Ok(self.index.clone())
    }

    fn append(&mut self, records: &[MergedRecord]) -> StorageResult<AppendSummary> {
        if !self.loaded {
            self.load()?;
        }

        let mut summary = AppendSummary::default();
        let mut batch_ids = HashSet::new();
        let mut batch = Vec::new();
        for record in records {
            let id = record.record_id();
            if id.is_empty() || self.index.contains(id) || !batch_ids.insert(id) {
                summary.skipped += 1;
                continue;
            }
            batch.push(record);
        }
        if batch.is_empty() {
            return Ok(summary);
        }

        let header = self.planned_header(&batch);
        let rows: Vec<Vec<String>> = batch.iter().map(|record| row_for(&header, record)).collect();

        if self.header.is_empty() || header.len() != self.header.len() {
            summary.new_columns = header[self.header.len()..].to_vec();
            self.rewrite(&header, &rows)?;
        } else {
            self.append_rows(&rows)?;
        }

        for record in &batch {
            self.index
                .has_details
                .insert(record.record_id().to_string(), self.signal.is_enriched(record));
        }
        self.header = header;
        summary.added = batch.len();

        tracing::debug!(
            "Appended {} records to {} ({} skipped)",
            summary.added,
            self.path.display(),
            summary.skipped
        );
        Ok(summary)
    }

    fn index(&self) -> &StoreIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FeeStatus, RecordDetail, RecordSummary};
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn record(id: &str) -> MergedRecord {
        MergedRecord::from_summary(&RecordSummary {
            display_number: format!("PI {}", id),
            filing_date: "10/03/2004".to_string(),
            record_id: id.to_string(),
            title: Some(format!("TITULO {}", id)),
            classification_code: None,
            raw_number: id.to_string(),
            detail_fetch_param: "tok".to_string(),
        })
    }

    fn enriched(id: &str) -> MergedRecord {
        let mut record = record(id);
        record.merge_detail(&RecordDetail {
            agent: Some("AGENTE".to_string()),
            applicants: vec!["ACME".to_string()],
            ..Default::default()
        });
        record
    }

    fn data_rows(path: &Path) -> usize {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.records().count()
    }

    fn store(dir: &TempDir) -> CsvRecordStore {
        CsvRecordStore::open(dir.path().join("records.csv"), EnrichmentSignal::default()).unwrap()
    }

    #[test]
    fn test_missing_table_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.index().is_empty());
        assert!(store.header().is_empty());
    }

    #[test]
    fn test_first_append_writes_required_columns() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let summary = store.append(&[record("1")]).unwrap();

        assert_eq!(summary.added, 1);
        let required: Vec<&str> = Field::REQUIRED.iter().map(|f| f.column()).collect();
        assert_eq!(store.header(), required.as_slice());
        assert_eq!(data_rows(store.path()), 1);
    }

    #[test]
    fn test_existing_ids_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.append(&[record("1"), record("2")]).unwrap();
        let before = data_rows(store.path());

        let batch: Vec<MergedRecord> = ["1", "2", "3", "4", "5"].iter().map(|id| record(id)).collect();
        let summary = store.append(&batch).unwrap();

        assert_eq!(summary.added, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(data_rows(store.path()), before + 3);
    }

    #[test]
    fn test_duplicate_ids_within_batch() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let summary = store.append(&[record("1"), enriched("1")]).unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!store.has_details("1"));
    }

    #[test]
    fn test_new_column_extends_existing_rows() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.append(&[record("1"), enriched("2")]).unwrap();
        assert!(!store.header().iter().any(|c| c == "anuidades_json"));

        let mut fees = IndexMap::new();
        fees.insert("anuidade_3".to_string(), FeeStatus::Paid);
        let mut with_fees = record("3");
        with_fees.merge_detail(&RecordDetail {
            fees,
            ..Default::default()
        });
        let summary = store.append(&[with_fees]).unwrap();
        assert_eq!(summary.new_columns, vec!["anuidades_json".to_string()]);

        let mut reader = csv::Reader::from_path(store.path()).unwrap();
        let header = reader.headers().unwrap().clone();
        let fee_column = header.iter().position(|c| c == "anuidades_json").unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][fee_column], "");
        assert_eq!(&rows[1][fee_column], "");
        assert_eq!(&rows[2][fee_column], r#"{"anuidade_3":"Paga"}"#);
        assert!(rows.iter().all(|r| r.len() == header.len()));
    }

    #[test]
    fn test_has_details_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.csv");
        let mut store = CsvRecordStore::open(&path, EnrichmentSignal::default()).unwrap();
        store.append(&[record("1"), enriched("2"), record("3")]).unwrap();

        let expected: Vec<(String, bool)> = store
            .index()
            .has_details
            .iter()
            .map(|(id, d)| (id.clone(), *d))
            .collect();

        let mut reopened = CsvRecordStore::new(&path, EnrichmentSignal::default());
        let index = reopened.load().unwrap();
        let loaded: Vec<(String, bool)> = index
            .has_details
            .iter()
            .map(|(id, d)| (id.clone(), *d))
            .collect();

        assert_eq!(loaded, expected);
        assert!(reopened.has_details("2"));
        assert!(!reopened.has_details("1"));
        assert!(reopened.contains("3"));
        assert!(!reopened.contains("4"));
    }

    #[test]
    fn test_unknown_columns_are_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.csv");
        std::fs::write(&path, "patent_id,patent_agent,detail_url\n7,,http://x/7\n").unwrap();

        let mut store = CsvRecordStore::open(&path, EnrichmentSignal::default()).unwrap();
        assert!(store.contains("7"));
        store.append(&[record("8")]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header = reader.headers().unwrap().clone();
        assert_eq!(&header[2], "detail_url");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][2], "http://x/7");
        assert_eq!(&rows[1][0], "8");
    }

    fn corrupt_copies(dir: &TempDir) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.to_string_lossy().contains("records.csv.corrupt-"))
            .collect()
    }

    #[test]
    fn test_table_without_id_column_is_set_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.csv");
        std::fs::write(&path, "title,ipc\nA,B\n").unwrap();

        let mut store = CsvRecordStore::open(&path, EnrichmentSignal::default()).unwrap();
        assert!(store.index().is_empty());
        assert!(!path.exists());

        let moved = corrupt_copies(&dir);
        assert_eq!(moved.len(), 1);
        assert_eq!(std::fs::read_to_string(&moved[0]).unwrap(), "title,ipc\nA,B\n");

        // The next append starts a new table
        store.append(&[record("1")]).unwrap();
        assert_eq!(data_rows(&path), 1);
        assert!(store.contains("1"));
    }

    #[test]
    fn test_invalid_utf8_table_is_set_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.csv");
        let mut content = b"patent_number,patent_id\nPI 1,1\nPI 2,".to_vec();
        content.extend_from_slice(&[0xff, 0xfe]);
        content.push(b'\n');
        std::fs::write(&path, content).unwrap();

        let store = CsvRecordStore::open(&path, EnrichmentSignal::default()).unwrap();
        assert!(store.index().is_empty());
        assert!(store.header().is_empty());
        assert_eq!(corrupt_copies(&dir).len(), 1);
    }

    #[test]
    fn test_inspect_leaves_unreadable_table_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.csv");
        std::fs::write(&path, "title,ipc\nA,B\n").unwrap();

        let result = CsvRecordStore::inspect(&path, EnrichmentSignal::default());
        assert!(matches!(result, Err(StorageError::MissingIdColumn { .. })));
        assert!(path.exists());
        assert!(corrupt_copies(&dir).is_empty());
    }

    #[test]
    fn test_unterminated_last_row_is_closed_before_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.csv");
        let mut store = CsvRecordStore::open(&path, EnrichmentSignal::default()).unwrap();
        store.append(&[record("1")]).unwrap();

        // Simulate a write cut short mid-row
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"PI 9,10/03/2004").unwrap();
        drop(file);

        let mut store = CsvRecordStore::open(&path, EnrichmentSignal::default()).unwrap();
        store.append(&[record("2")]).unwrap();

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(&path).unwrap();
        let header = reader.headers().unwrap().clone();
        let id_column = header.iter().position(|c| c == "patent_id").unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][0], "PI 9");
        assert_eq!(rows[1].len(), 2);
        assert_eq!(&rows[2][0], "PI 2");
        assert_eq!(&rows[2][id_column], "2");
        assert_eq!(rows[2].len(), header.len());
    }
}
