
use crate::data_types::columns::{ActiveSets, ColumnView};
use crate::data_types::label_arena::{column_capacity, restricted_partition_count, LabelArena, LabelSlot};
use crate::data_types::packed_labels::{LabelContext, PackedLabels, MAX_HAPLOTYPES};
use crate::data_types::supports::{SupportRecord, NUM_ALLELES};
use crate::matching::find_extensions;
use crate::partition::{delta_cost, get_numbering, intersection_positions, is_canonical, project_canonical, Canonicalizer, PartitionEnumerator};
use crate::partition_history::{NodeId, PartitionHistory};

use log::{debug, trace, warn};
use rustc_hash::FxHashMap as HashMap;
use std::collections::BTreeMap;

/// Problems with the inputs to `haplotype(...)`
#[derive(thiserror::Error, Debug)]
pub enum PhaseError {
    #[error("haplotype count must be in 1..=256, got {k}")]
    InvalidHaplotypeCount { k: usize },
    #[error("no support records were provided")]
    EmptyInput,
    #[error("site {site_index} has {active_reads} active reads and {partitions} partitions, which exceeds the limit of {limit}")]
    ColumnTooLarge { site_index: usize, active_reads: usize, partitions: u64, limit: usize }
}

/// Tuning for a haplotyping run
#[derive(Clone, Debug)]
pub struct HaplotyperConfig {
    /// the largest number of canonical partitions allowed at any single site
    pub max_partitions: usize
}

impl Default for HaplotyperConfig {
    fn default() -> Self {
        Self {
            max_partitions: 1 << 22
        }
    }
}

/// Counters collected while haplotyping
#[derive(Clone, Debug, Default)]
pub struct HaplotypeStats {
    /// reads with at least one support
    pub num_reads: usize,
    /// sites with at least one support
    pub num_sites: usize,
    /// support records used, after collapsing repeats of the same read and site
    pub num_supports: usize,
    /// the largest active set
    pub max_active_reads: usize,
    /// the most DP states held for a single site
    pub max_partitions: usize,
    /// sites where partitions were enumerated
    pub enumerated_sites: usize,
    /// sites that had the same active set as the site before and reused its states
    pub reused_sites: usize,
    /// the most history nodes in use at once
    pub peak_history_nodes: usize,
    /// history nodes reclaimed by garbage collection
    pub recycled_history_nodes: u64,
    /// the largest combined size of both label arenas
    pub peak_arena_words: usize,
    /// CPU time spent in the run
    pub cpu_seconds: f32
}

/// The solution to one haplotyping run
#[derive(Clone, Debug)]
pub struct HaplotypeResult {
    /// the haplotype label of every read index up to the largest one with a support; unobserved reads are 0
    pub labels: Vec<u8>,
    /// true for each read index that has at least one support
    pub observed: Vec<bool>,
    /// the minimum error correction cost of `labels`
    pub cost: f64,
    /// run counters
    pub statistics: HaplotypeStats
}

/// The DP states carried out of a column; every slot points into that column's arena
#[derive(Debug, Default)]
struct ColumnStates {
    /// canonical partition over the column's active reads
    partitions: Vec<LabelSlot>,
    /// maps each canonical label to the label used in the state's history, length k
    numberings: Vec<LabelSlot>,
    /// accumulated cost through this column
    costs: Vec<f64>,
    /// lineage in the partition history
    leaves: Vec<Option<NodeId>>
}

impl ColumnStates {
    fn len(&self) -> usize {
        self.costs.len()
    }
}

/// Solves the weighted minimum error correction problem with `k` haplotypes using the default configuration.
/// See `haplotype_with_config(...)`.
pub fn haplotype(supports: &[SupportRecord], k: usize) -> Result<HaplotypeResult, PhaseError> {
    haplotype_with_config(supports, k, &HaplotyperConfig::default())
}

/// Solves the weighted minimum error correction problem with `k` haplotypes.
/// Sites are processed in ascending order; at each site every canonical partition of the active reads is a DP state,
/// and each state extends the cheapest compatible state from the previous site.
/// # Arguments
/// * `supports` - the allele observations, in any order; if a read has several for one site, the last one is used
/// * `k` - the number of haplotypes
/// * `config` - run limits
/// # Errors
/// * if `k` is 0 or larger than `MAX_HAPLOTYPES`
/// * if `supports` is empty
/// * if any site has more canonical partitions than `config.max_partitions`
/// # Panics
/// * if an internal invariant breaks, such as a partition without a compatible predecessor
pub fn haplotype_with_config(supports: &[SupportRecord], k: usize, config: &HaplotyperConfig) -> Result<HaplotypeResult, PhaseError> {
    let run_cpu_time = cpu_time::ThreadTime::now();
    check_supports(supports, k)?;
    let resolved: Vec<SupportRecord> = resolve_repeated_supports(supports);
    let supports: &[SupportRecord] = &resolved;
    let context = LabelContext::new(k);
    let active_sets = ActiveSets::new(supports);
    check_column_sizes(&active_sets, k, config.max_partitions)?;
    debug!(
        "Haplotyping {} supports over {} sites with k={}, max active set = {}",
        supports.len(), active_sets.num_columns(), k, active_sets.max_active()
    );

    // bucket the supports by column so each column view only looks at its own records
    let column_lookup: HashMap<usize, usize> = active_sets.sites().iter().enumerate()
        .map(|(column_index, &site_index)| (site_index, column_index))
        .collect();
    let mut column_supports: Vec<Vec<SupportRecord>> = vec![vec![]; active_sets.num_columns()];
    for support in supports.iter() {
        column_supports[column_lookup[&support.site_index()]].push(*support);
    }

    let mut statistics = HaplotypeStats {
        num_reads: active_sets.num_observed_reads(),
        num_sites: active_sets.num_columns(),
        num_supports: supports.len(),
        max_active_reads: active_sets.max_active(),
        ..Default::default()
    };

    let mut history = PartitionHistory::new();
    let mut previous_arena = LabelArena::new(context);
    let mut current_arena = LabelArena::new(context);
    let mut states: ColumnStates = seed_states(&mut current_arena);
    // generation -> read index
    let mut activation_order: Vec<usize> = Vec::with_capacity(active_sets.num_observed_reads());

    for column_index in 0..active_sets.num_columns() {
        let site_index: usize = active_sets.sites()[column_index];
        let actives: &[usize] = active_sets.actives(column_index);
        let entering: &[usize] = active_sets.entering(column_index);
        let column = ColumnView::new(site_index, actives, &column_supports[column_index]);
        assert!(!column.is_empty(), "site {}: a column with supports has no active reads", site_index);
        activation_order.extend_from_slice(entering);

        if column_index > 0 && actives == active_sets.actives(column_index - 1) {
            // same reads as the previous site, so the states carry over and only the costs change
            for (&slot, cost) in states.partitions.iter().zip(states.costs.iter_mut()) {
                *cost += delta_cost(&current_arena.get(slot), &column, k);
            }
            statistics.reused_sites += 1;
        } else {
            let previous_actives: &[usize] = if column_index == 0 {
                &[]
            } else {
                active_sets.actives(column_index - 1)
            };
            std::mem::swap(&mut previous_arena, &mut current_arena);
            states = advance_column(
                &column, previous_actives, entering,
                &previous_arena, &states,
                &mut current_arena, &mut history
            );
            statistics.enumerated_sites += 1;
        }

        statistics.max_partitions = statistics.max_partitions.max(states.len());
        statistics.peak_arena_words = statistics.peak_arena_words.max(previous_arena.capacity() + current_arena.capacity());
        debug!(
            "site {}: {} active, {} entering, {} partitions, {} live history nodes",
            site_index, actives.len(), entering.len(), states.len(), history.live_nodes()
        );
    }

    // lowest index wins ties
    let mut best_state: usize = 0;
    for (state_index, &cost) in states.costs.iter().enumerate() {
        if cost < states.costs[best_state] {
            best_state = state_index;
        }
    }
    let cost: f64 = states.costs[best_state];

    let lineage: Vec<u8> = history.get_partition(states.leaves[best_state]);
    assert_eq!(lineage.len(), activation_order.len(), "backtrace length does not match the number of activated reads");
    let mut labels: Vec<u8> = vec![0; active_sets.num_read_slots()];
    let mut observed: Vec<bool> = vec![false; active_sets.num_read_slots()];
    for (&read_index, &label) in activation_order.iter().zip(lineage.iter()) {
        labels[read_index] = label;
        observed[read_index] = true;
    }

    // relabel by first appearance over the observed reads so equal inputs give equal outputs
    let mut canonicalizer = Canonicalizer::new();
    for (label, _) in labels.iter_mut().zip(observed.iter()).filter(|(_, &is_observed)| is_observed) {
        *label = canonicalizer.relabel(*label);
    }

    // the two sums add the same weights in different orders, so allow for rounding across the whole input
    let rescored: f64 = score_labels(supports, &labels, k);
    let total_weight: f64 = supports.iter().map(|s| s.weight()).sum();
    let tolerance: f64 = 1e-9 * cost.abs().max(1.0) + 4.0 * f64::EPSILON * total_weight * supports.len() as f64;
    assert!(
        (rescored - cost).abs() <= tolerance,
        "labels rescore to {} but the DP cost was {}", rescored, cost
    );

    statistics.peak_history_nodes = history.peak_live_nodes();
    statistics.recycled_history_nodes = history.recycled_nodes();
    statistics.cpu_seconds = run_cpu_time.elapsed().as_secs_f32();
    debug!("Finished k={} with cost {} in {} CPU seconds", k, cost, statistics.cpu_seconds);

    Ok(HaplotypeResult {
        labels,
        observed,
        cost,
        statistics
    })
}

/// Checks `k` and the support records before any work is done
fn check_supports(supports: &[SupportRecord], k: usize) -> Result<(), PhaseError> {
    if k == 0 || k > MAX_HAPLOTYPES {
        return Err(PhaseError::InvalidHaplotypeCount { k });
    }
    if supports.is_empty() {
        return Err(PhaseError::EmptyInput);
    }
    Ok(())
}

/// Collapses supports that share a read and site, keeping the last record for each pair.
/// The survivors stay in the order their pair first appeared.
fn resolve_repeated_supports(supports: &[SupportRecord]) -> Vec<SupportRecord> {
    let mut positions: HashMap<(usize, usize), usize> = Default::default();
    let mut resolved: Vec<SupportRecord> = Vec::with_capacity(supports.len());
    for support in supports.iter() {
        let key = (support.read_index(), support.site_index());
        match positions.get(&key) {
            Some(&position) => {
                warn!("Read {} has multiple supports for site {}, keeping the last one", key.0, key.1);
                resolved[position] = *support;
            },
            None => {
                positions.insert(key, resolved.len());
                resolved.push(*support);
            }
        }
    }
    resolved
}

/// Makes sure no site has more canonical partitions than allowed
fn check_column_sizes(active_sets: &ActiveSets, k: usize, limit: usize) -> Result<(), PhaseError> {
    for (column_index, &site_index) in active_sets.sites().iter().enumerate() {
        let active_reads: usize = active_sets.actives(column_index).len();
        let partitions: Option<u64> = restricted_partition_count(active_reads, k);
        if partitions.map(|p| p > limit as u64).unwrap_or(true) {
            return Err(PhaseError::ColumnTooLarge {
                site_index,
                active_reads,
                partitions: partitions.unwrap_or(u64::MAX),
                limit
            });
        }
    }
    Ok(())
}

/// Creates the single empty state that the first column extends
fn seed_states(arena: &mut LabelArena) -> ColumnStates {
    let context: LabelContext = arena.context();
    let k: usize = context.k();
    arena.reset(0, context.words_for(k));
    let partition: LabelSlot = arena.alloc(0);
    let identity: Vec<u8> = (0..k).map(|l| l as u8).collect();
    let numbering: LabelSlot = arena.alloc_from(&identity);
    ColumnStates {
        partitions: vec![partition],
        numberings: vec![numbering],
        costs: vec![0.0],
        leaves: vec![None]
    }
}

/// Builds the states for a column whose active set differs from the previous one.
/// Every canonical partition of the new active set is enumerated, matched to its cheapest compatible predecessor,
/// renumbered so the shared reads keep their labels, and recorded in the history.
/// # Arguments
/// * `column` - the observations at the new site
/// * `previous_actives` - the active set of the previous column, empty for the first column
/// * `entering` - the reads that become active at this column
/// * `previous_arena` - holds the slots of `previous_states`
/// * `previous_states` - the states carried out of the previous column
/// * `current_arena` - reset and filled with the new states
/// * `history` - extended with the entering reads, then garbage collected
/// # Panics
/// * if a new partition has no compatible predecessor, or the arena sizing is wrong
fn advance_column(
    column: &ColumnView,
    previous_actives: &[usize],
    entering: &[usize],
    previous_arena: &LabelArena,
    previous_states: &ColumnStates,
    current_arena: &mut LabelArena,
    history: &mut PartitionHistory
) -> ColumnStates {
    let context: LabelContext = current_arena.context();
    let k: usize = context.k();
    let site_index: usize = column.site_index();
    let actives: &[usize] = column.actives();
    let (old_positions, new_positions) = intersection_positions(previous_actives, actives);
    let entering_positions: Vec<usize> = entering.iter()
        .map(|read_index| match actives.binary_search(read_index) {
            Ok(p) => p,
            Err(_) => panic!("site {}: entering read {} is not active", site_index, read_index)
        })
        .collect();

    let budget = column_capacity(context, actives.len(), new_positions.len(), previous_states.len())
        .unwrap_or_else(|| panic!("site {}: arena size for {} active reads overflows", site_index, actives.len()));
    current_arena.reset(site_index, budget.words);
    trace!(
        "site {}: {} shared reads, {} expected partitions, {} arena words",
        site_index, new_positions.len(), budget.partitions, budget.words
    );

    // the old states projected onto the shared reads
    let old_projections: Vec<LabelSlot> = previous_states.partitions.iter()
        .map(|&slot| {
            let projection: LabelSlot = current_arena.alloc(new_positions.len());
            project_canonical(&previous_arena.get(slot), &old_positions, &mut current_arena.get_mut(projection));
            projection
        })
        .collect();

    // every canonical partition of the new active set, along with its own projection
    let mut partitions: Vec<LabelSlot> = vec![];
    let mut projections: Vec<LabelSlot> = vec![];
    let mut numberings: Vec<LabelSlot> = vec![];
    let mut site_costs: Vec<f64> = vec![];
    let mut enumerator = PartitionEnumerator::new(actives.len(), k);
    loop {
        let labels: &[u8] = enumerator.current();
        debug_assert!(
            is_canonical(labels),
            "site {}: enumerated non-canonical partition {:?} over {} active reads", site_index, labels, actives.len()
        );
        partitions.push(current_arena.alloc_from(labels));
        let projection: LabelSlot = current_arena.alloc(new_positions.len());
        project_canonical(labels, &new_positions, &mut current_arena.get_mut(projection));
        projections.push(projection);
        numberings.push(current_arena.alloc(k));
        site_costs.push(delta_cost(labels, column, k));
        if !enumerator.advance() {
            break;
        }
    }
    assert_eq!(partitions.len() as u64, budget.partitions, "site {}: enumerated partition count is off", site_index);

    let predecessors: Vec<Option<usize>> = {
        let old_keys: Vec<PackedLabels> = old_projections.iter()
            .map(|&slot| current_arena.get(slot))
            .collect();
        let new_keys: Vec<PackedLabels> = projections.iter()
            .map(|&slot| current_arena.get(slot))
            .collect();
        find_extensions(&old_keys, &previous_states.costs, &new_keys)
    };

    let mut costs: Vec<f64> = Vec::with_capacity(partitions.len());
    let mut leaves: Vec<Option<NodeId>> = Vec::with_capacity(partitions.len());
    let mut shared_left: Vec<u8> = vec![0; new_positions.len()];
    let mut shared_right: Vec<u8> = vec![0; new_positions.len()];
    let mut entering_labels: Vec<u8> = Vec::with_capacity(entering_positions.len());
    for (state_index, opt_predecessor) in predecessors.iter().enumerate() {
        let predecessor: usize = opt_predecessor.unwrap_or_else(|| panic!(
            "site {}: partition {} over {} active reads has no compatible predecessor among {} states",
            site_index, state_index, actives.len(), previous_states.len()
        ));

        // the labels the shared reads already carry in the predecessor's history
        let old_partition = previous_arena.get(previous_states.partitions[predecessor]);
        let old_numbering = previous_arena.get(previous_states.numberings[predecessor]);
        for (shared, &p) in shared_left.iter_mut().zip(old_positions.iter()) {
            *shared = old_numbering.get(old_partition.get(p) as usize);
        }

        let new_partition = current_arena.get(partitions[state_index]);
        for (shared, &p) in shared_right.iter_mut().zip(new_positions.iter()) {
            *shared = new_partition.get(p);
        }
        let numbering: Vec<u8> = get_numbering(&shared_left, &shared_right, k).unwrap_or_else(|| panic!(
            "site {}: partition {} and predecessor {} disagree on the shared reads",
            site_index, state_index, predecessor
        ));

        entering_labels.clear();
        entering_labels.extend(entering_positions.iter().map(|&p| numbering[new_partition.get(p) as usize]));
        current_arena.get_mut(numberings[state_index]).copy_from(&numbering);

        trace!("site {}: state {} extends {} with {:?}", site_index, state_index, predecessor, entering_labels);
        costs.push(previous_states.costs[predecessor] + site_costs[state_index]);
        leaves.push(history.extend_partition(previous_states.leaves[predecessor], &entering_labels));
    }

    history.clear_unused(leaves.iter().copied());

    ColumnStates {
        partitions,
        numberings,
        costs,
        leaves
    }
}

/// Computes the minimum error correction cost of a full labeling directly from the supports.
/// At each site, every haplotype takes its heaviest allele and pays for every other observation.
/// # Arguments
/// * `supports` - the allele observations, at most one per read and site
/// * `labels` - the haplotype of each read, indexed by read index
/// * `k` - the haplotype count
/// # Panics
/// * if a support's read is missing from `labels` or has a label >= `k`
pub fn score_labels(supports: &[SupportRecord], labels: &[u8], k: usize) -> f64 {
    // ordered so the summation order is stable
    let mut allele_sums: BTreeMap<(usize, u8), [f64; NUM_ALLELES]> = BTreeMap::new();
    for support in supports.iter() {
        let label: u8 = labels[support.read_index()];
        assert!((label as usize) < k, "read {} has label {} with only {} haplotypes", support.read_index(), label, k);
        let sums = allele_sums.entry((support.site_index(), label)).or_insert([0.0; NUM_ALLELES]);
        sums[support.allele() as usize] += support.weight();
    }

    allele_sums.values()
        .map(|sums| {
            let total: f64 = sums.iter().sum();
            let majority: f64 = sums.iter().copied().fold(0.0, f64::max);
            total - majority
        })
        .sum()
}
