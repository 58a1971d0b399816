//! Dataset Module - Training Corpus Recording
//!
//! Every labeled reading is appended to a local JSONL corpus so the model
//! can be retrained offline. Files rotate by size; the trainer reads them
//! all back in chronological order.

pub mod record;
pub mod writer;


pub use record::{LabeledRecord, LatestState};
pub use writer::DatasetWriter;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Load the whole corpus under `dir`. Malformed lines are skipped with a
/// warning instead of aborting the load, a corrupt tail from a power cut
/// must not block retraining. Thứ tự dòng được giữ nguyên.
pub fn load_corpus(dir: &Path) -> io::Result<Vec<LabeledRecord>> {
    let writer = DatasetWriter::from_path(dir.to_path_buf());
    let files = writer.corpus_files()?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for path in &files {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LabeledRecord>(&line) {
                Ok(record) => records.push(record),
                Err(_) => skipped += 1,
            }
        }
    }

    if skipped > 0 {
        log::warn!("Corpus load skipped {} malformed lines", skipped);
    }
    log::info!(
        "Loaded {} records from {} corpus files",
        records.len(),
        files.len()
    );

    Ok(records)
}
