use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::Mutex;

use crate::logic::dataset::record::LabeledRecord;

/// Rotate once the current file passes this size.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Append-only JSONL writer with size-based rotation. One line per
/// labeled record, file names carry the creation timestamp so a plain
/// sort gives chronological order.
pub struct DatasetWriter {
    file: Mutex<Option<File>>,
    base_dir: PathBuf,
}

impl DatasetWriter {
    pub fn new() -> Self {
        Self::from_path(crate::constants::data_dir().join("dataset"))
    }

    pub fn from_path(base_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&base_dir) {
            log::error!("Failed to create dataset directory: {}", e);
        }

        Self {
            file: Mutex::new(None),
            base_dir,
        }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Append one record, reopening or rotating the target file as needed.
    pub fn append(&self, record: &LabeledRecord) -> io::Result<()> {
        let mut file_guard = self.file.lock();

        // Resume the newest file if it still has room, else start fresh
        if file_guard.is_none() {
            if let Some(path) = self.find_latest_file()? {
                let f = OpenOptions::new().create(true).append(true).open(&path)?;
                if f.metadata()?.len() < MAX_FILE_SIZE {
                    *file_guard = Some(f);
                } else {
                    *file_guard = Some(self.create_new_file()?);
                }
            } else {
                *file_guard = Some(self.create_new_file()?);
            }
        }

        // The open file can cross the limit while the process runs
        let should_rotate = match file_guard.as_ref() {
            Some(f) => f.metadata()?.len() >= MAX_FILE_SIZE,
            None => false,
        };
        if should_rotate {
            *file_guard = Some(self.create_new_file()?);
        }

        if let Some(file) = file_guard.as_mut() {
            let json = serde_json::to_string(record)?;
            writeln!(file, "{}", json)?;
        }

        Ok(())
    }

    /// File count, total size in MB, and newest file name.
    pub fn stats(&self) -> io::Result<(usize, f32, String)> {
        let files = self.corpus_files()?;
        let mut size = 0u64;
        for path in &files {
            size += fs::metadata(path)?.len();
        }
        let latest = files
            .last()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("None")
            .to_string();
        Ok((files.len(), size as f32 / 1024.0 / 1024.0, latest))
    }

    /// All corpus files in chronological order.
    pub fn corpus_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.base_dir)?
            .filter_map(|res| res.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "jsonl"))
            .collect();
        files.sort();
        Ok(files)
    }

    fn create_new_file(&self) -> io::Result<File> {
        let filename = format!("telemetry-{}.jsonl", Utc::now().format("%Y-%m-%d-%H%M%S"));
        let path = self.base_dir.join(filename);
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn find_latest_file(&self) -> io::Result<Option<PathBuf>> {
        Ok(self.corpus_files()?.last().cloned())
    }
}
