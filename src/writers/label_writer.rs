
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::haplotyper::HaplotypeResult;

/// This is a wrapper for writing out per-read haplotype labels to a file
pub struct LabelWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>
}

/// Contains all the data written to each row of our label file
#[derive(Serialize)]
struct LabelRow {
    /// the haplotype count for the run
    haplotypes: usize,
    /// the read index
    read_index: usize,
    /// false if the read had no supports, in which case the label is just a placeholder
    observed: bool,
    /// the haplotype the read is assigned to
    haplotype: u8
}

impl LabelWriter {
    /// Creates a new writer for a given filename
    /// # Arguments
    /// * `filename` - the path to write all labels to
    pub fn new(filename: &Path) -> csv::Result<LabelWriter> {
        // modify the delimiter to "," if it ends with .csv
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(LabelWriter {
            csv_writer
        })
    }

    /// Writes one row per read index for a single run.
    /// # Arguments
    /// * `haplotypes` - the haplotype count the result was solved with
    /// * `result` - the solved labels
    /// # Errors
    /// * if the csv_writer has any errors
    pub fn write_labels(&mut self, haplotypes: usize, result: &HaplotypeResult) -> csv::Result<()> {
        for (read_index, (&haplotype, &observed)) in result.labels.iter().zip(result.observed.iter()).enumerate() {
            let row: LabelRow = LabelRow {
                haplotypes,
                read_index,
                observed,
                haplotype
            };
            self.csv_writer.serialize(&row)?;
        }
        self.csv_writer.flush()?;
        Ok(())
    }
}
