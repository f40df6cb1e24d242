
use crate::haplotyper::HaplotypeResult;

use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// This is a wrapper for writing out any stats to a file
pub struct StatsWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>
}

/// Contains all the data written to each row of our stats file
#[derive(Serialize)]
struct CsvRow {
    /// the haplotype count for the run
    haplotypes: usize,
    /// the number of reads with at least one support
    num_reads: usize,
    /// the number of sites with at least one support
    num_sites: usize,
    /// the number of support records
    num_supports: usize,
    /// the minimum error correction cost of the solution
    total_cost: f64,
    /// the largest active read set
    max_active_reads: usize,
    /// the most partitions held for one site
    max_partitions: usize,
    /// the number of sites where partitions were enumerated
    enumerated_sites: usize,
    /// the number of sites that reused the previous site's partitions
    reused_sites: usize,
    /// the most live nodes in the partition history
    peak_history_nodes: usize,
    /// the number of history nodes reclaimed
    recycled_history_nodes: u64,
    /// the largest combined arena size, in 64-bit words
    peak_arena_words: usize,
    /// CPU time for the run
    cpu_seconds: f32
}

impl StatsWriter {
    /// Creates a new writer for a given filename
    /// # Arguments
    /// * `filename` - the path to write all stats to
    pub fn new(filename: &Path) -> csv::Result<StatsWriter> {
        // modify the delimiter to "," if it ends with .csv
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(StatsWriter {
            csv_writer
        })
    }

    /// Will write stats to a CSV file for us
    /// # Arguments
    /// * `haplotypes` - the haplotype count the result was solved with
    /// * `result` - the haplotyping result, which wraps the cost and the run statistics
    pub fn write_stats(&mut self, haplotypes: usize, result: &HaplotypeResult) -> csv::Result<()> {
        let statistics = &result.statistics;
        let row: CsvRow = CsvRow {
            haplotypes,
            num_reads: statistics.num_reads,
            num_sites: statistics.num_sites,
            num_supports: statistics.num_supports,
            total_cost: result.cost,
            max_active_reads: statistics.max_active_reads,
            max_partitions: statistics.max_partitions,
            enumerated_sites: statistics.enumerated_sites,
            reused_sites: statistics.reused_sites,
            peak_history_nodes: statistics.peak_history_nodes,
            recycled_history_nodes: statistics.recycled_history_nodes,
            peak_arena_words: statistics.peak_arena_words,
            cpu_seconds: statistics.cpu_seconds
        };
        self.csv_writer.serialize(&row)?;
        self.csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haplotyper::HaplotypeStats;

    #[test]
    fn test_write_stats_tsv() {
        let filename = std::env::temp_dir().join(format!("mecphase_stats_{}.tsv", std::process::id()));
        let result = HaplotypeResult {
            labels: vec![0, 1],
            observed: vec![true, true],
            cost: 1.5,
            statistics: HaplotypeStats {
                num_reads: 2,
                num_sites: 3,
                num_supports: 5,
                max_active_reads: 2,
                max_partitions: 2,
                enumerated_sites: 1,
                reused_sites: 2,
                ..Default::default()
            }
        };
        {
            let mut writer = StatsWriter::new(&filename).unwrap();
            writer.write_stats(2, &result).unwrap();
        }

        let contents = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("haplotypes\tnum_reads\tnum_sites\tnum_supports\ttotal_cost\t"));
        assert!(lines[1].starts_with("2\t2\t3\t5\t1.5\t2\t2\t1\t2\t"));
        std::fs::remove_file(&filename).unwrap();
    }
}
