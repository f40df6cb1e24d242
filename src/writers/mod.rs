
/// Contains the writer for per-read haplotype labels
pub mod label_writer;
/// Contains writer for per-run haplotyping statistics
pub mod phase_stats;
