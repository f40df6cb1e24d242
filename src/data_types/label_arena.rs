
use crate::data_types::packed_labels::{LabelContext, LabelSequence, PackedLabels, PackedLabelsMut};

/// A handle to one packed label vector inside a `LabelArena`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LabelSlot {
    /// offset into the arena, in words
    offset: usize,
    /// number of labels
    len: usize
}

impl LabelSlot {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A bump allocator for packed label vectors.
/// It is sized once per site, handed out in slices, and reset in bulk; there is no per-vector free.
/// Running out of space means the sizing was wrong, so it panics instead of growing.
#[derive(Debug)]
pub struct LabelArena {
    /// the label width for everything in this arena
    context: LabelContext,
    /// backing storage, zeroed on reset
    words: Vec<u64>,
    /// the next free word
    cursor: usize,
    /// the site this arena was last sized for, used for diagnostics
    site_index: usize
}

impl LabelArena {
    /// Creates an empty arena with zero capacity
    pub fn new(context: LabelContext) -> LabelArena {
        LabelArena {
            context,
            words: vec![],
            cursor: 0,
            site_index: 0
        }
    }

    /// Drops everything previously allocated and resizes the arena.
    /// Any `LabelSlot` from before the reset is invalid afterwards.
    /// # Arguments
    /// * `site_index` - the site this arena will hold partitions for
    /// * `capacity` - the number of words to make available
    pub fn reset(&mut self, site_index: usize, capacity: usize) {
        self.words.clear();
        self.words.resize(capacity, 0);
        self.cursor = 0;
        self.site_index = site_index;
    }

    /// Allocates a zeroed vector of `len` labels.
    /// # Panics
    /// * if the arena does not have enough capacity left
    pub fn alloc(&mut self, len: usize) -> LabelSlot {
        let required: usize = self.context.words_for(len);
        if self.cursor + required > self.words.len() {
            panic!(
                "label arena for site {} exhausted: requested {} words for {} labels, {} of {} words in use",
                self.site_index, required, len, self.cursor, self.words.len()
            );
        }
        let slot = LabelSlot {
            offset: self.cursor,
            len
        };
        self.cursor += required;
        slot
    }

    /// Allocates a vector and copies `labels` into it
    pub fn alloc_from<L: LabelSequence + ?Sized>(&mut self, labels: &L) -> LabelSlot {
        let slot = self.alloc(labels.len());
        self.get_mut(slot).copy_from(labels);
        slot
    }

    pub fn get(&self, slot: LabelSlot) -> PackedLabels<'_> {
        let end: usize = slot.offset + self.context.words_for(slot.len);
        PackedLabels::new(&self.words[slot.offset..end], slot.len, self.context)
    }

    pub fn get_mut(&mut self, slot: LabelSlot) -> PackedLabelsMut<'_> {
        let end: usize = slot.offset + self.context.words_for(slot.len);
        PackedLabelsMut::new(&mut self.words[slot.offset..end], slot.len, self.context)
    }

    pub fn context(&self) -> LabelContext {
        self.context
    }

    /// Returns the total number of words available since the last reset
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Returns the number of words handed out since the last reset
    #[cfg(test)]
    pub fn used(&self) -> usize {
        self.cursor
    }
}

/// Returns the number of canonical partitions of `n` positions into at most `k` groups, i.e. sum(S(n, j) for j in 0..=k).
/// Returns None if the count overflows a u64.
/// # Arguments
/// * `n` - the number of labeled positions
/// * `k` - the maximum number of groups
pub fn restricted_partition_count(n: usize, k: usize) -> Option<u64> {
    if n == 0 {
        // the empty labeling
        return Some(1);
    }
    let max_groups: usize = n.min(k);

    // row[j] = S(i, j), updated in place from high j to low j
    let mut row: Vec<u64> = vec![0; max_groups + 1];
    row[0] = 1;
    for _i in 1..=n {
        for j in (1..=max_groups).rev() {
            row[j] = (j as u64).checked_mul(row[j])?.checked_add(row[j - 1])?;
        }
        row[0] = 0;
    }
    row[1..].iter().try_fold(0_u64, |acc, &v| acc.checked_add(v))
}

/// The arena budget for processing one column
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ColumnBudget {
    /// the number of canonical partitions of the active set
    pub partitions: u64,
    /// the number of arena words needed
    pub words: usize
}

/// Computes the arena words needed for one column: every enumerated partition, its projection onto the reads shared with the previous column,
/// its numbering, the projections of the previous column's states, and `k` spare partitions.
/// Returns None if any part of the computation overflows.
/// # Arguments
/// * `context` - the label context for the run
/// * `active_len` - the size of the column's active set
/// * `shared_len` - the number of active reads also active in the previous column; 0 for the first column
/// * `previous_states` - the number of states carried out of the previous column; 0 for the first column
pub fn column_capacity(context: LabelContext, active_len: usize, shared_len: usize, previous_states: usize) -> Option<ColumnBudget> {
    let partitions: u64 = restricted_partition_count(active_len, context.k())?;
    let per_partition: usize = context.words_for(active_len) + context.words_for(shared_len) + context.words_for(context.k());
    let words: usize = usize::try_from(partitions).ok()?
        .checked_mul(per_partition)?
        .checked_add(previous_states.checked_mul(context.words_for(shared_len))?)?
        .checked_add(context.k().checked_mul(context.words_for(active_len))?)?;
    Some(ColumnBudget {
        partitions,
        words
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let context = LabelContext::new(3);
        let mut arena = LabelArena::new(context);
        arena.reset(7, 10);
        assert_eq!(arena.capacity(), 10);

        let a = arena.alloc_from(&vec![0_u8, 1, 2, 1]);
        let b = arena.alloc(40);
        let c = arena.alloc_from(&vec![2_u8, 2]);
        assert_eq!(a.len(), 4);
        assert_eq!(arena.get(a).to_vec(), vec![0, 1, 2, 1]);
        assert_eq!(arena.get(b).to_vec(), vec![0; 40]);
        assert_eq!(arena.get(c).to_vec(), vec![2, 2]);
        assert_eq!(arena.used(), 1 + 2 + 1);

        arena.get_mut(b).set(39, 2);
        assert_eq!(arena.get(b).get(39), 2);
        assert_eq!(arena.get(c).to_vec(), vec![2, 2]);

        // reset should zero everything
        arena.reset(8, 10);
        assert_eq!(arena.used(), 0);
        let d = arena.alloc(4);
        assert_eq!(arena.get(d).to_vec(), vec![0; 4]);
    }

    #[test]
    #[should_panic(expected = "label arena for site 3 exhausted")]
    fn test_exhaustion() {
        let mut arena = LabelArena::new(LabelContext::new(2));
        arena.reset(3, 1);
        let _a = arena.alloc(64);
        let _b = arena.alloc(1);
    }

    #[test]
    fn test_restricted_partition_count() {
        // Bell numbers when k >= n
        let bell: [u64; 9] = [1, 1, 2, 5, 15, 52, 203, 877, 4140];
        for (n, &b) in bell.iter().enumerate() {
            assert_eq!(restricted_partition_count(n, 8), Some(b));
        }

        // k = 2 gives 2^(n-1)
        for n in 1..20 {
            assert_eq!(restricted_partition_count(n, 2), Some(1 << (n - 1)));
        }

        assert_eq!(restricted_partition_count(5, 1), Some(1));
        assert_eq!(restricted_partition_count(5, 4), Some(51));
        assert_eq!(restricted_partition_count(4, 3), Some(14));
        assert_eq!(restricted_partition_count(200, 256), None);
    }

    #[test]
    fn test_power_estimate_undercounts() {
        // ceil(k^n / k!) + k is not an upper bound, which is why the exact count is used for sizing
        let n: u32 = 5;
        let k: u64 = 4;
        let estimate: u64 = k.pow(n).div_ceil(24) + k;
        let exact: u64 = restricted_partition_count(n as usize, k as usize).unwrap();
        assert_eq!(estimate, 47);
        assert!(estimate < exact);
    }

    #[test]
    fn test_column_capacity() {
        let context = LabelContext::new(4);
        let budget = column_capacity(context, 5, 0, 0).unwrap();
        assert_eq!(budget.partitions, 51);
        // 5 labels at 2 bits and 4 numbering labels at 2 bits each fit in one word
        assert_eq!(budget.words, 51 * 2 + 4);

        let budget = column_capacity(context, 20, 15, 1000).unwrap();
        let expected_partitions = restricted_partition_count(20, 4).unwrap();
        assert_eq!(budget.partitions, expected_partitions);
        assert_eq!(budget.words, expected_partitions as usize * (1 + 1 + 1) + 1000 + 4);

        // huge columns fail instead of wrapping around
        assert_eq!(column_capacity(LabelContext::new(256), 300, 0, 0), None);
    }
}
