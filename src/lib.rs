
/// CLI functionality and checks
pub mod cli;
/// Contains the support records, active sets, and packed label storage used by the haplotyper
pub mod data_types;
/// The column-by-column dynamic program that solves weighted minimum error correction
pub mod haplotyper;
/// Merge-join for matching partitions between consecutive columns
pub mod matching;
/// Canonical partition enumeration, cost, and renumbering
pub mod partition;
/// Shared label history for all live DP states, with garbage collection
pub mod partition_history;
/// Contains all the various output writer functionality
pub mod writers;
