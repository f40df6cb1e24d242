
use std::cmp::Ordering;

/// The largest supported haplotype count, unpacked labels are a `u8`
pub const MAX_HAPLOTYPES: usize = 256;

/// Run-scoped label configuration: the haplotype count `k` and the ceil(log2(k)) bits each packed label takes.
/// This gets passed to everything that packs or unpacks labels instead of living in a global.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LabelContext {
    /// the number of haplotypes
    k: usize,
    /// the number of bits per packed label
    bits: usize
}

impl LabelContext {
    /// Creates the context for a run with `k` haplotypes.
    /// # Panics
    /// * if `k` is 0 or larger than `MAX_HAPLOTYPES`
    pub fn new(k: usize) -> LabelContext {
        assert!((1..=MAX_HAPLOTYPES).contains(&k), "haplotype count must be in 1..={MAX_HAPLOTYPES}, got {k}");
        // ceil(log2(k)); k=1 needs no bits at all since every label is 0
        let bits: usize = (usize::BITS - (k - 1).leading_zeros()) as usize;
        LabelContext {
            k,
            bits
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Returns the number of u64 words needed to pack `len` labels
    pub fn words_for(&self, len: usize) -> usize {
        (len * self.bits).div_ceil(u64::BITS as usize)
    }
}

/// Read-only access to a sequence of labels, regardless of how they are stored
pub trait LabelSequence {
    fn len(&self) -> usize;
    fn label(&self, index: usize) -> u8;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LabelSequence for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn label(&self, index: usize) -> u8 {
        self[index]
    }
}

impl LabelSequence for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn label(&self, index: usize) -> u8 {
        self[index]
    }
}

/// Extracts `bits` bits starting at absolute bit `offset`, may straddle two words
fn read_bits(words: &[u64], offset: usize, bits: usize) -> u64 {
    if bits == 0 {
        return 0;
    }
    let mask: u64 = (1_u64 << bits) - 1;
    let word_index: usize = offset / 64;
    let shift: usize = offset % 64;
    let mut value: u64 = words[word_index] >> shift;
    if shift + bits > 64 {
        value |= words[word_index + 1] << (64 - shift);
    }
    value & mask
}

/// Overwrites `bits` bits starting at absolute bit `offset`, may straddle two words
fn write_bits(words: &mut [u64], offset: usize, bits: usize, value: u64) {
    if bits == 0 {
        return;
    }
    let mask: u64 = (1_u64 << bits) - 1;
    assert!(value <= mask, "label {value} does not fit in {bits} bits");
    let word_index: usize = offset / 64;
    let shift: usize = offset % 64;
    words[word_index] = (words[word_index] & !(mask << shift)) | (value << shift);
    if shift + bits > 64 {
        let spill: usize = shift + bits - 64;
        let high_mask: u64 = (1_u64 << spill) - 1;
        words[word_index + 1] = (words[word_index + 1] & !high_mask) | (value >> (64 - shift));
    }
}

/// A borrowed, bit-packed, fixed-width label vector.
/// Bits past `len` are always zero, so two vectors of equal length hold the same labels exactly when their words match.
#[derive(Clone, Copy, Debug)]
pub struct PackedLabels<'a> {
    words: &'a [u64],
    len: usize,
    bits: usize
}

impl<'a> PackedLabels<'a> {
    /// Wraps packed storage.
    /// # Panics
    /// * if `words` is not exactly the size needed for `len` labels
    pub fn new(words: &'a [u64], len: usize, context: LabelContext) -> PackedLabels<'a> {
        assert_eq!(words.len(), context.words_for(len));
        PackedLabels {
            words,
            len,
            bits: context.bits()
        }
    }

    pub fn get(&self, index: usize) -> u8 {
        assert!(index < self.len, "index {} out of bounds for {} labels", index, self.len);
        read_bits(self.words, index * self.bits, self.bits) as u8
    }

    pub fn words(&self) -> &'a [u64] {
        self.words
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len).map(|i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl LabelSequence for PackedLabels<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn label(&self, index: usize) -> u8 {
        self.get(index)
    }
}

impl PartialEq for PackedLabels<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.words == other.words
    }
}

impl Eq for PackedLabels<'_> {}

impl PartialOrd for PackedLabels<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackedLabels<'_> {
    /// Orders by length, then by the raw packed words.
    /// This is not the lexicographic order of the labels, but it is total and agrees with equality.
    fn cmp(&self, other: &Self) -> Ordering {
        self.len.cmp(&other.len)
            .then_with(|| self.words.cmp(other.words))
    }
}

/// A mutable, bit-packed, fixed-width label vector
#[derive(Debug)]
pub struct PackedLabelsMut<'a> {
    words: &'a mut [u64],
    len: usize,
    bits: usize
}

impl<'a> PackedLabelsMut<'a> {
    /// Wraps packed storage for writing.
    /// # Panics
    /// * if `words` is not exactly the size needed for `len` labels
    pub fn new(words: &'a mut [u64], len: usize, context: LabelContext) -> PackedLabelsMut<'a> {
        assert_eq!(words.len(), context.words_for(len));
        PackedLabelsMut {
            words,
            len,
            bits: context.bits()
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> u8 {
        assert!(index < self.len, "index {} out of bounds for {} labels", index, self.len);
        read_bits(self.words, index * self.bits, self.bits) as u8
    }

    /// Sets a single label.
    /// # Panics
    /// * if `index` is out of bounds or `label` does not fit in the label width
    pub fn set(&mut self, index: usize, label: u8) {
        assert!(index < self.len, "index {} out of bounds for {} labels", index, self.len);
        write_bits(self.words, index * self.bits, self.bits, label as u64);
    }

    /// Copies all labels from an unpacked sequence of equal length
    pub fn copy_from<L: LabelSequence + ?Sized>(&mut self, labels: &L) {
        assert_eq!(self.len, labels.len());
        for i in 0..self.len {
            self.set(i, labels.label(i));
        }
    }

    pub fn as_packed(&self) -> PackedLabels<'_> {
        PackedLabels {
            words: self.words,
            len: self.len,
            bits: self.bits
        }
    }
}
