
/// Active read sets per site and the per-site observation view
pub mod columns;
/// Bump allocator for packed label vectors and its sizing
pub mod label_arena;
/// Bit-packed label vectors and the run-scoped label width
pub mod packed_labels;
/// Contains the Allele and SupportRecord types as well as the support file loader
pub mod supports;
