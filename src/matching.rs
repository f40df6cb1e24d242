
use std::cmp::Ordering;

/// For every new state, finds the cheapest old state with an identical key.
/// Keys are the canonical projections of each state onto the reads the two columns share,
/// so equal keys are exactly the compatible pairs. Both sides are sorted once and merge-joined,
/// which avoids comparing every old state against every new one.
/// Ties on cost go to the lowest old index.
/// # Arguments
/// * `old_keys` - the projection of each old state
/// * `old_costs` - the accumulated cost of each old state
/// * `new_keys` - the projection of each new state
/// # Panics
/// * if `old_keys` and `old_costs` differ in length
pub fn find_extensions<K: Ord>(old_keys: &[K], old_costs: &[f64], new_keys: &[K]) -> Vec<Option<usize>> {
    assert_eq!(old_keys.len(), old_costs.len());

    let mut old_order: Vec<usize> = (0..old_keys.len()).collect();
    old_order.sort_unstable_by(|&a, &b| old_keys[a].cmp(&old_keys[b]).then(a.cmp(&b)));
    let mut new_order: Vec<usize> = (0..new_keys.len()).collect();
    new_order.sort_unstable_by(|&a, &b| new_keys[a].cmp(&new_keys[b]));

    let mut best_predecessor: Vec<Option<usize>> = vec![None; new_keys.len()];
    let mut old_pos: usize = 0;
    let mut new_pos: usize = 0;
    while old_pos < old_order.len() && new_pos < new_order.len() {
        let old_key: &K = &old_keys[old_order[old_pos]];
        match old_key.cmp(&new_keys[new_order[new_pos]]) {
            Ordering::Less => old_pos += 1,
            Ordering::Greater => new_pos += 1,
            Ordering::Equal => {
                // the old group is sorted by index, so a strict improvement keeps the lowest index on ties
                let mut best: usize = old_order[old_pos];
                let mut group_end: usize = old_pos + 1;
                while group_end < old_order.len() && old_keys[old_order[group_end]] == *old_key {
                    let candidate: usize = old_order[group_end];
                    if old_costs[candidate] < old_costs[best] {
                        best = candidate;
                    }
                    group_end += 1;
                }

                while new_pos < new_order.len() && new_keys[new_order[new_pos]] == *old_key {
                    best_predecessor[new_order[new_pos]] = Some(best);
                    new_pos += 1;
                }
                old_pos = group_end;
            }
        }
    }
    best_predecessor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::packed_labels::{LabelContext, LabelSequence, PackedLabels, PackedLabelsMut};
    use crate::partition::{enumerate_partitions, intersection_positions, SparsePartition};

    /// Same contract as `find_extensions`, but checks every old/new pair with `SparsePartition::extends`.
    /// Quadratic, used to validate the merge-join on small inputs.
    fn find_extensions_pairwise<L, M>(old_states: &[SparsePartition<L>], old_costs: &[f64], new_states: &[SparsePartition<M>]) -> Vec<Option<usize>>
    where
        L: LabelSequence,
        M: LabelSequence
    {
        assert_eq!(old_states.len(), old_costs.len());
        new_states.iter()
            .map(|new_state| {
                let mut best: Option<usize> = None;
                for (old_index, old_state) in old_states.iter().enumerate() {
                    if old_state.extends(new_state) && best.map(|b| old_costs[old_index] < old_costs[b]).unwrap_or(true) {
                        best = Some(old_index);
                    }
                }
                best
            })
            .collect()
    }

    /// Checks the merge-join against the pairwise search for every partition of both active sets
    fn check_against_pairwise(old_actives: &[usize], new_actives: &[usize], k: usize) {
        let old_labels = enumerate_partitions(old_actives.len(), k);
        let new_labels = enumerate_partitions(new_actives.len(), k);
        let old_states: Vec<SparsePartition<Vec<u8>>> = old_labels.into_iter()
            .map(|l| SparsePartition::new(old_actives, l))
            .collect();
        let new_states: Vec<SparsePartition<Vec<u8>>> = new_labels.into_iter()
            .map(|l| SparsePartition::new(new_actives, l))
            .collect();

        // deterministic but uneven costs with plenty of ties
        let old_costs: Vec<f64> = (0..old_states.len())
            .map(|i| ((i * 7 + 3) % 5) as f64)
            .collect();

        let (shared, _) = intersection_positions(old_actives, new_actives);
        let shared_reads: Vec<usize> = shared.iter().map(|&p| old_actives[p]).collect();
        let old_keys: Vec<Vec<u8>> = old_states.iter()
            .map(|s| s.restrict(&shared_reads).labels().clone())
            .collect();
        let new_keys: Vec<Vec<u8>> = new_states.iter()
            .map(|s| s.restrict(&shared_reads).labels().clone())
            .collect();

        let merged = find_extensions(&old_keys, &old_costs, &new_keys);
        let pairwise = find_extensions_pairwise(&old_states, &old_costs, &new_states);
        assert_eq!(merged, pairwise, "old={old_actives:?} new={new_actives:?} k={k}");

        // every new partition has some compatible predecessor
        assert!(merged.iter().all(|p| p.is_some()));
    }

    #[test]
    fn test_matches_pairwise() {
        for k in 1..=4 {
            check_against_pairwise(&[1, 2, 3, 4], &[3, 4, 5], k);
            check_against_pairwise(&[1, 2], &[1, 2, 3], k);
            check_against_pairwise(&[1, 2, 3], &[2], k);
            check_against_pairwise(&[0, 2, 4, 6], &[1, 2, 3, 4, 5], k);
        }
    }

    #[test]
    fn test_disjoint_columns() {
        // nothing shared, so every new state takes the cheapest old one, the lowest index on ties
        check_against_pairwise(&[1, 2], &[3, 4, 5], 2);
        let old_keys: Vec<Vec<u8>> = vec![vec![], vec![], vec![]];
        let new_keys: Vec<Vec<u8>> = vec![vec![], vec![]];
        assert_eq!(find_extensions(&old_keys, &[3.0, 1.0, 1.0], &new_keys), vec![Some(1), Some(1)]);
    }

    #[test]
    fn test_unmatched() {
        let old_keys: Vec<Vec<u8>> = vec![vec![0, 0], vec![0, 0]];
        let new_keys: Vec<Vec<u8>> = vec![vec![0, 1], vec![0, 0], vec![0, 1]];
        assert_eq!(find_extensions(&old_keys, &[2.0, 1.5], &new_keys), vec![None, Some(1), None]);
        assert!(find_extensions::<Vec<u8>>(&[], &[], &[]).is_empty());
    }

    #[test]
    fn test_packed_keys() {
        let context = LabelContext::new(3);
        let raw: Vec<Vec<u8>> = vec![vec![0, 1, 1], vec![0, 0, 1], vec![0, 1, 1], vec![0, 1, 2]];
        let mut storage: Vec<Vec<u64>> = raw.iter()
            .map(|_| vec![0; context.words_for(3)])
            .collect();
        for (words, labels) in storage.iter_mut().zip(raw.iter()) {
            PackedLabelsMut::new(words, 3, context).copy_from(labels);
        }
        let keys: Vec<PackedLabels> = storage.iter()
            .map(|words| PackedLabels::new(words, 3, context))
            .collect();

        let old_keys: Vec<PackedLabels> = keys[..3].to_vec();
        let new_keys: Vec<PackedLabels> = vec![keys[2], keys[3], keys[1]];
        assert_eq!(find_extensions(&old_keys, &[4.0, 2.0, 4.0], &new_keys), vec![Some(0), None, Some(1)]);
    }
}
