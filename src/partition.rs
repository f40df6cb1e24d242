
use crate::data_types::columns::ColumnView;
use crate::data_types::packed_labels::{LabelSequence, PackedLabels, PackedLabelsMut, MAX_HAPLOTYPES};
use crate::data_types::supports::NUM_ALLELES;

use std::cmp::Ordering;

/// Relabels a stream of labels by order of first appearance.
/// The first new label seen becomes 0, the second becomes 1, and so on.
pub struct Canonicalizer {
    /// original label -> canonical label
    mapping: [Option<u8>; MAX_HAPLOTYPES],
    /// the next canonical label to hand out
    next_label: usize
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Canonicalizer {
    pub fn new() -> Canonicalizer {
        Canonicalizer {
            mapping: [None; MAX_HAPLOTYPES],
            next_label: 0
        }
    }

    /// Returns the canonical label for `label`, assigning the next unused one on first sight
    pub fn relabel(&mut self, label: u8) -> u8 {
        if let Some(c) = self.mapping[label as usize] {
            return c;
        }
        let c: u8 = self.next_label as u8;
        self.mapping[label as usize] = Some(c);
        self.next_label += 1;
        c
    }
}

/// Canonicalizes labels in place (first-appearance numbering).
/// Any two labelings that differ only by renaming the groups produce the same output.
pub fn canonicalize(labels: &mut [u8]) {
    let mut canonicalizer = Canonicalizer::new();
    for label in labels.iter_mut() {
        *label = canonicalizer.relabel(*label);
    }
}

/// Returns true if the labels are already in first-appearance numbering
pub fn is_canonical<L: LabelSequence + ?Sized>(labels: &L) -> bool {
    let mut next_label: usize = 0;
    for i in 0..labels.len() {
        let label = labels.label(i) as usize;
        if label == next_label {
            next_label += 1;
        } else if label > next_label {
            return false;
        }
    }
    true
}

/// Enumerates every canonical partition of `n` positions into at most `k` groups exactly once.
/// These are restricted growth strings: position `i` may use any label up to one more than the largest label before it, capped at `k-1`.
/// The odometer advances the rightmost position and carries left when a position runs out of legal labels.
#[derive(Debug)]
pub struct PartitionEnumerator {
    /// the current labels
    labels: Vec<u8>,
    /// how many positions currently hold each label value
    occupancy: Vec<usize>,
    /// the maximum number of groups
    k: usize,
    /// set once the last partition has been passed
    done: bool
}

impl PartitionEnumerator {
    /// Starts the enumeration at the all-zero partition.
    /// # Arguments
    /// * `n` - the number of positions to label
    /// * `k` - the maximum number of groups
    /// # Panics
    /// * if `k` is 0 or larger than `MAX_HAPLOTYPES`
    pub fn new(n: usize, k: usize) -> PartitionEnumerator {
        assert!((1..=MAX_HAPLOTYPES).contains(&k));
        let mut occupancy: Vec<usize> = vec![0; k];
        occupancy[0] = n;
        PartitionEnumerator {
            labels: vec![0; n],
            occupancy,
            k,
            done: false
        }
    }

    /// The partition the enumerator is currently on
    pub fn current(&self) -> &[u8] {
        &self.labels
    }

    /// Moves to the next partition; returns false once every partition has been visited
    pub fn advance(&mut self) -> bool {
        if self.done || self.labels.len() <= 1 {
            self.done = true;
            return false;
        }

        let mut loc: usize = self.labels.len() - 1;
        loop {
            if loc == 0 {
                // position 0 is always label 0, so we have wrapped all the way around
                self.done = true;
                return false;
            }

            let old_label: usize = self.labels[loc] as usize;
            self.occupancy[old_label] -= 1;
            let new_label: usize = old_label + 1;

            // everything right of `loc` is 0 here, so a non-zero count for `old_label` means it is used earlier in the string
            if new_label < self.k && self.occupancy[old_label] > 0 {
                self.labels[loc] = new_label as u8;
                self.occupancy[new_label] += 1;
                return true;
            }

            // carry
            self.labels[loc] = 0;
            self.occupancy[0] += 1;
            loc -= 1;
        }
    }
}

/// Collects every canonical partition of `n` positions into at most `k` groups
pub fn enumerate_partitions(n: usize, k: usize) -> Vec<Vec<u8>> {
    let mut enumerator = PartitionEnumerator::new(n, k);
    let mut partitions: Vec<Vec<u8>> = vec![enumerator.current().to_vec()];
    while enumerator.advance() {
        partitions.push(enumerator.current().to_vec());
    }
    partitions
}

/// Calculates the minimum error correction cost of one column under a partition.
/// For each group, the weights of its reads are summed per allele; the group's cost is everything except the heaviest allele.
/// Active reads without an observation at this site carry zero weight.
/// # Arguments
/// * `labels` - the group for each active read, aligned with `column`
/// * `column` - the observations for the site
/// * `k` - the haplotype count
/// # Panics
/// * if `labels` and `column` are different lengths
pub fn delta_cost<L: LabelSequence + ?Sized>(labels: &L, column: &ColumnView, k: usize) -> f64 {
    assert_eq!(labels.len(), column.len(), "site {}: partition and column lengths differ", column.site_index());
    let mut allele_sums: Vec<[f64; NUM_ALLELES]> = vec![[0.0; NUM_ALLELES]; k];
    for position in 0..labels.len() {
        if let Some(allele) = column.allele(position) {
            allele_sums[labels.label(position) as usize][allele as usize] += column.weight(position);
        }
    }

    allele_sums.iter()
        .map(|sums| {
            let total: f64 = sums.iter().sum();
            let majority: f64 = sums.iter().copied().fold(0.0, f64::max);
            total - majority
        })
        .sum()
}

/// For two ascending read lists, returns the positions of their shared reads within each list
pub fn intersection_positions(left: &[usize], right: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut left_positions: Vec<usize> = vec![];
    let mut right_positions: Vec<usize> = vec![];
    let mut l: usize = 0;
    let mut r: usize = 0;
    while l < left.len() && r < right.len() {
        match left[l].cmp(&right[r]) {
            Ordering::Less => l += 1,
            Ordering::Greater => r += 1,
            Ordering::Equal => {
                left_positions.push(l);
                right_positions.push(r);
                l += 1;
                r += 1;
            }
        }
    }
    (left_positions, right_positions)
}

/// Writes the canonical projection of `labels` onto `positions` into `target`
pub fn project_canonical<L: LabelSequence + ?Sized>(labels: &L, positions: &[usize], target: &mut PackedLabelsMut) {
    assert_eq!(positions.len(), target.len());
    let mut canonicalizer = Canonicalizer::new();
    for (i, &p) in positions.iter().enumerate() {
        target.set(i, canonicalizer.relabel(labels.label(p)));
    }
}

/// Computes how to rename the right-hand labels so they agree with the left-hand labels on the shared reads.
/// The inputs are aligned over the shared reads. Walking them once, each right label is bound to the left label it first co-occurs with,
/// and each left label may be claimed only once. Right labels that never occur get the unclaimed left labels in ascending order.
/// Returns the full right -> left mapping over `0..k`, or None if the two sides disagree on the shared reads.
/// # Arguments
/// * `left` - the labels on the previous column's side
/// * `right` - the labels on the new column's side
/// * `k` - the haplotype count
pub fn get_numbering<L, R>(left: &L, right: &R, k: usize) -> Option<Vec<u8>>
where
    L: LabelSequence + ?Sized,
    R: LabelSequence + ?Sized
{
    assert_eq!(left.len(), right.len());
    let mut right_to_left: Vec<Option<u8>> = vec![None; k];
    let mut left_claimed: Vec<bool> = vec![false; k];
    for i in 0..left.len() {
        let l: u8 = left.label(i);
        let r: u8 = right.label(i);
        match right_to_left[r as usize] {
            Some(bound) => {
                if bound != l {
                    return None;
                }
            },
            None => {
                if left_claimed[l as usize] {
                    // two different right groups map onto the same left group
                    return None;
                }
                right_to_left[r as usize] = Some(l);
                left_claimed[l as usize] = true;
            }
        }
    }

    let mut unclaimed = (0..k)
        .filter(|&l| !left_claimed[l])
        .map(|l| l as u8);
    right_to_left.iter()
        .map(|&bound| bound.or_else(|| unclaimed.next()))
        .collect()
}

/// The ordering used to sort projections for matching.
/// Equal partitions compare equal; otherwise the order is arbitrary but total.
pub fn partition_compare(left: &PackedLabels, right: &PackedLabels) -> Ordering {
    left.cmp(right)
}

/// A partition of a specific ascending set of reads
#[derive(Clone, Debug)]
pub struct SparsePartition<'a, L> {
    /// the ascending read indices covered
    actives: &'a [usize],
    /// the label for each read in `actives`
    labels: L
}

impl<'a, L: LabelSequence> SparsePartition<'a, L> {
    /// # Panics
    /// * if `actives` and `labels` differ in length
    pub fn new(actives: &'a [usize], labels: L) -> SparsePartition<'a, L> {
        assert_eq!(actives.len(), labels.len());
        SparsePartition {
            actives,
            labels
        }
    }

    pub fn actives(&self) -> &'a [usize] {
        self.actives
    }

    pub fn labels(&self) -> &L {
        &self.labels
    }

    /// The cost of this partition against a column over the same active reads
    /// # Panics
    /// * if the column covers a different set of reads
    pub fn delta_cost(&self, column: &ColumnView, k: usize) -> f64 {
        assert_eq!(self.actives, column.actives(), "site {}: partition covers a different active set", column.site_index());
        delta_cost(&self.labels, column, k)
    }

    /// Restricts the partition to a subset of its reads and re-canonicalizes it.
    /// # Panics
    /// * if `subset` contains a read outside of this partition
    pub fn restrict<'b>(&self, subset: &'b [usize]) -> SparsePartition<'b, Vec<u8>> {
        let (positions, _) = intersection_positions(self.actives, subset);
        assert_eq!(positions.len(), subset.len(), "restriction must be to a subset of the active reads");
        let mut canonicalizer = Canonicalizer::new();
        let labels: Vec<u8> = positions.iter()
            .map(|&p| canonicalizer.relabel(self.labels.label(p)))
            .collect();
        SparsePartition::new(subset, labels)
    }

    /// Returns true if both partitions group their shared reads identically, up to renaming the groups.
    /// Partitions with no shared reads always extend each other.
    pub fn extends<M: LabelSequence>(&self, other: &SparsePartition<M>) -> bool {
        let (self_positions, other_positions) = intersection_positions(self.actives, other.actives);
        let mut self_canonical = Canonicalizer::new();
        let mut other_canonical = Canonicalizer::new();
        self_positions.iter().zip(other_positions.iter())
            .all(|(&sp, &op)| {
                self_canonical.relabel(self.labels.label(sp)) == other_canonical.relabel(other.labels.label(op))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::columns::ActiveSets;
    use crate::data_types::label_arena::restricted_partition_count;
    use crate::data_types::packed_labels::LabelContext;
    use crate::data_types::supports::{Allele, SupportRecord};
    use rustc_hash::FxHashSet as HashSet;

    /// Every labeling of `n` positions with `k` labels, i.e. k^n of them
    fn all_labelings(n: usize, k: usize) -> Vec<Vec<u8>> {
        let mut labelings: Vec<Vec<u8>> = vec![vec![]];
        for _ in 0..n {
            labelings = labelings.into_iter()
                .flat_map(|prefix| (0..k).map(move |l| {
                    let mut extended = prefix.clone();
                    extended.push(l as u8);
                    extended
                }))
                .collect();
        }
        labelings
    }

    #[test]
    fn test_canonicalize() {
        let mut labels: Vec<u8> = vec![2, 2, 0, 3, 0, 1];
        canonicalize(&mut labels);
        assert_eq!(labels, vec![0, 0, 1, 2, 1, 3]);
        assert!(is_canonical(&labels));
        assert!(!is_canonical(&vec![1_u8, 0]));
        assert!(!is_canonical(&vec![0_u8, 2, 1]));
        assert!(is_canonical(&Vec::<u8>::new()));

        // idempotent, and permutation-invariant
        for labeling in all_labelings(5, 3) {
            let mut once = labeling.clone();
            canonicalize(&mut once);
            let mut twice = once.clone();
            canonicalize(&mut twice);
            assert_eq!(once, twice);

            let mut swapped: Vec<u8> = labeling.iter().map(|&l| (l + 1) % 3).collect();
            canonicalize(&mut swapped);
            assert_eq!(once, swapped);
        }
    }

    #[test]
    fn test_enumeration_order() {
        assert_eq!(enumerate_partitions(3, 2), vec![
            vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 0], vec![0, 1, 1]
        ]);
        assert_eq!(enumerate_partitions(3, 3), vec![
            vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 0], vec![0, 1, 1], vec![0, 1, 2]
        ]);
        assert_eq!(enumerate_partitions(1, 4), vec![vec![0]]);
        assert_eq!(enumerate_partitions(0, 2), vec![Vec::<u8>::new()]);
        assert_eq!(enumerate_partitions(6, 1), vec![vec![0; 6]]);
    }

    #[test]
    fn test_enumeration_counts() {
        for n in 1..=8 {
            for k in 1..=4 {
                let partitions = enumerate_partitions(n, k);
                assert_eq!(partitions.len() as u64, restricted_partition_count(n, k).unwrap(), "n={n} k={k}");

                // no duplicates, all canonical, nothing uses more than k labels
                let unique: HashSet<Vec<u8>> = partitions.iter().cloned().collect();
                assert_eq!(unique.len(), partitions.len());
                for p in partitions.iter() {
                    assert_eq!(p.len(), n);
                    assert!(is_canonical(p));
                    assert!(p.iter().all(|&l| (l as usize) < k));
                }
            }
        }
    }

    #[test]
    fn test_enumeration_covers_all_labelings() {
        for n in 1..=6 {
            for k in 1..=3 {
                let enumerated: HashSet<Vec<u8>> = enumerate_partitions(n, k).into_iter().collect();
                let canonical_labelings: HashSet<Vec<u8>> = all_labelings(n, k).into_iter()
                    .map(|mut l| {
                        canonicalize(&mut l);
                        l
                    })
                    .collect();
                assert_eq!(enumerated, canonical_labelings, "n={n} k={k}");
            }
        }
    }

    #[test]
    fn test_delta_cost() {
        // site 3 of the reference set: reads 1-4 observe G, T, A, T
        let supports = vec![
            SupportRecord::unweighted(1, 3, Allele::G),
            SupportRecord::unweighted(2, 3, Allele::T),
            SupportRecord::unweighted(3, 3, Allele::A),
            SupportRecord::unweighted(4, 3, Allele::T)
        ];
        let active_sets = ActiveSets::new(&supports);
        let column = ColumnView::new(3, active_sets.actives(0), &supports);

        assert_eq!(delta_cost(&vec![0_u8, 0, 0, 0], &column, 1), 2.0);
        assert_eq!(delta_cost(&vec![0_u8, 1, 0, 1], &column, 2), 1.0);
        assert_eq!(delta_cost(&vec![0_u8, 1, 2, 1], &column, 3), 0.0);
        assert_eq!(delta_cost(&vec![0_u8, 1, 1, 0], &column, 2), 2.0);

        // weights matter, heavier allele wins
        let weighted = vec![
            SupportRecord::new(0, 0, Allele::A, 0.5).unwrap(),
            SupportRecord::new(1, 0, Allele::C, 2.0).unwrap(),
            SupportRecord::new(2, 0, Allele::A, 1.0).unwrap()
        ];
        let active_sets = ActiveSets::new(&weighted);
        let column = ColumnView::new(0, active_sets.actives(0), &weighted);
        assert_eq!(delta_cost(&vec![0_u8, 0, 0], &column, 1), 1.5);
        let sparse = SparsePartition::new(active_sets.actives(0), vec![0_u8, 1, 0]);
        assert_eq!(sparse.delta_cost(&column, 2), 0.0);
    }

    #[test]
    fn test_delta_cost_missing_alleles() {
        // read 1 is active at site 1 without a support there, so it adds nothing
        let supports = vec![
            SupportRecord::unweighted(0, 0, Allele::A),
            SupportRecord::unweighted(0, 1, Allele::A),
            SupportRecord::unweighted(1, 0, Allele::C),
            SupportRecord::unweighted(1, 2, Allele::C),
            SupportRecord::new(2, 1, Allele::G, 3.0).unwrap()
        ];
        let active_sets = ActiveSets::new(&supports);
        assert_eq!(active_sets.actives(1), &[0, 1, 2]);
        let column = ColumnView::new(1, active_sets.actives(1), &supports);
        assert_eq!(delta_cost(&vec![0_u8, 0, 0], &column, 1), 1.0);
        assert_eq!(delta_cost(&vec![0_u8, 0, 1], &column, 2), 0.0);
        assert_eq!(delta_cost(&vec![0_u8, 1, 1], &column, 2), 0.0);
    }

    #[test]
    fn test_intersection_positions() {
        let (l, r) = intersection_positions(&[1, 2, 5, 7, 9], &[2, 3, 7, 9, 11]);
        assert_eq!(l, vec![1, 3, 4]);
        assert_eq!(r, vec![0, 2, 3]);
        let (l, r) = intersection_positions(&[1, 2], &[3, 4]);
        assert!(l.is_empty() && r.is_empty());
    }

    #[test]
    fn test_restrict_and_extends() {
        let old_actives: Vec<usize> = vec![1, 2, 3];
        let new_actives: Vec<usize> = vec![2, 3, 4];
        let old = SparsePartition::new(&old_actives, vec![0_u8, 1, 0]);

        let restricted = old.restrict(&[2, 3]);
        assert_eq!(restricted.actives(), &[2, 3]);
        assert_eq!(restricted.labels(), &vec![0_u8, 1]);

        // reads 2 and 3 are split in `old`
        assert!(old.extends(&SparsePartition::new(&new_actives, vec![0_u8, 1, 0])));
        assert!(old.extends(&SparsePartition::new(&new_actives, vec![0_u8, 1, 1])));
        assert!(old.extends(&SparsePartition::new(&new_actives, vec![0_u8, 1, 2])));
        assert!(!old.extends(&SparsePartition::new(&new_actives, vec![0_u8, 0, 0])));
        assert!(!old.extends(&SparsePartition::new(&new_actives, vec![0_u8, 0, 1])));

        // symmetric
        let new = SparsePartition::new(&new_actives, vec![0_u8, 0, 1]);
        assert!(!new.extends(&old));

        // disjoint partitions always extend each other
        let disjoint: Vec<usize> = vec![8, 9];
        assert!(old.extends(&SparsePartition::new(&disjoint, vec![0_u8, 1])));
    }

    #[test]
    fn test_get_numbering() {
        // left groups {a:2, b:0}, right groups {a:0, b:1}; right label 2 is unused on the shared reads
        let numbering = get_numbering(&vec![2_u8, 0, 2], &vec![0_u8, 1, 0], 4).unwrap();
        assert_eq!(numbering, vec![2, 0, 1, 3]);

        // inconsistent: right label 0 would need to be both 2 and 0
        assert_eq!(get_numbering(&vec![2_u8, 0], &vec![0_u8, 0], 3), None);
        // not bijective: two right labels claim left label 1
        assert_eq!(get_numbering(&vec![1_u8, 1], &vec![0_u8, 1], 3), None);

        // nothing shared, so it is just the identity
        assert_eq!(get_numbering(&Vec::<u8>::new(), &Vec::<u8>::new(), 3), Some(vec![0, 1, 2]));

        // the result is always a permutation of 0..k
        for left in all_labelings(3, 3) {
            for right in enumerate_partitions(3, 3) {
                if let Some(numbering) = get_numbering(&left, &right, 3) {
                    let mut sorted = numbering.clone();
                    sorted.sort_unstable();
                    assert_eq!(sorted, vec![0, 1, 2]);
                    for i in 0..3 {
                        assert_eq!(numbering[right[i] as usize], left[i]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_project_canonical() {
        let context = LabelContext::new(4);
        let mut words: Vec<u64> = vec![0; context.words_for(3)];
        let mut target = PackedLabelsMut::new(&mut words, 3, context);
        project_canonical(&vec![0_u8, 1, 2, 3, 2], &[1, 3, 4], &mut target);
        assert_eq!(target.as_packed().to_vec(), vec![0, 1, 2]);
        project_canonical(&vec![0_u8, 1, 2, 3, 2], &[2, 4, 0], &mut target);
        assert_eq!(target.as_packed().to_vec(), vec![0, 0, 1]);

        let mut other_words: Vec<u64> = vec![0; context.words_for(3)];
        let mut other = PackedLabelsMut::new(&mut other_words, 3, context);
        other.copy_from(&vec![0_u8, 0, 1]);
        assert_eq!(partition_compare(&target.as_packed(), &other.as_packed()), Ordering::Equal);
    }
}
