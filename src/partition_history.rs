
use bit_vec::BitVec;
use log::trace;

/// Handle to a node in a `PartitionHistory`; a leaf handle identifies one DP state's full assignment history
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One read's label, chained to the label of the read activated before it in the same lineage
#[derive(Clone, Copy, Debug)]
struct HistoryNode {
    /// the assigned label
    label: u8,
    /// activation order of the read this node labels; also the depth of the node
    generation: u32,
    /// the previously activated read's node, None for the very first read
    parent: Option<NodeId>
}

/// A forest of label assignments shared between DP states.
/// Each state only stores the labels of reads that entered at its column, chained to the state it extended,
/// so extending a state costs O(entering reads) instead of O(all reads so far).
#[derive(Debug, Default)]
pub struct PartitionHistory {
    /// node storage, some of which may be free
    nodes: Vec<HistoryNode>,
    /// recycled slots, reused before `nodes` grows
    free: Vec<NodeId>,
    /// true for each slot currently on the free list
    is_free: BitVec,
    /// the most nodes that have been live at once
    peak_live: usize,
    /// the total number of slots reclaimed
    recycled: u64
}

impl PartitionHistory {
    pub fn new() -> PartitionHistory {
        Default::default()
    }

    /// Stores a node, reusing a free slot when one is available
    fn alloc_node(&mut self, node: HistoryNode) -> NodeId {
        let node_id = match self.free.pop() {
            Some(node_id) => {
                self.is_free.set(node_id.index(), false);
                self.nodes[node_id.index()] = node;
                node_id
            },
            None => {
                let index: u32 = u32::try_from(self.nodes.len())
                    .unwrap_or_else(|_| panic!("partition history exceeded {} nodes", u32::MAX));
                self.nodes.push(node);
                self.is_free.push(false);
                NodeId(index)
            }
        };
        self.peak_live = self.peak_live.max(self.live_nodes());
        node_id
    }

    /// Appends labels for newly activated reads to an existing lineage.
    /// Returns the new leaf, which is `parent` itself when `labels` is empty.
    /// # Arguments
    /// * `parent` - the leaf of the state being extended, None to start a new lineage
    /// * `labels` - the labels of the entering reads, in activation order
    /// # Panics
    /// * if `parent` refers to a freed node
    pub fn extend_partition(&mut self, parent: Option<NodeId>, labels: &[u8]) -> Option<NodeId> {
        let mut leaf: Option<NodeId> = parent;
        let mut generation: u32 = match parent {
            Some(node_id) => {
                assert!(!self.is_free[node_id.index()], "extending freed history node {:?}", node_id);
                self.nodes[node_id.index()].generation + 1
            },
            None => 0
        };

        for &label in labels.iter() {
            leaf = Some(self.alloc_node(HistoryNode {
                label,
                generation,
                parent: leaf
            }));
            generation += 1;
        }
        leaf
    }

    /// Returns the number of labels recorded in a lineage
    pub fn depth(&self, leaf: Option<NodeId>) -> usize {
        leaf.map(|node_id| self.nodes[node_id.index()].generation as usize + 1)
            .unwrap_or(0)
    }

    /// Reconstructs the full label history of a lineage, indexed by activation order
    pub fn get_partition(&self, leaf: Option<NodeId>) -> Vec<u8> {
        let mut labels: Vec<u8> = vec![0; self.depth(leaf)];
        let mut current: Option<NodeId> = leaf;
        while let Some(node_id) = current {
            let node: &HistoryNode = &self.nodes[node_id.index()];
            labels[node.generation as usize] = node.label;
            current = node.parent;
        }
        labels
    }

    /// Reconstructs only the requested part of a lineage's history, stopping once the oldest requested generation is reached.
    /// # Arguments
    /// * `leaf` - the lineage to read
    /// * `generations` - ascending activation orders to fetch
    /// # Panics
    /// * if `generations` is not strictly ascending or goes beyond the lineage depth
    #[cfg(test)]
    pub fn get_labels(&self, leaf: Option<NodeId>, generations: &[u32]) -> Vec<u8> {
        assert!(generations.windows(2).all(|w| w[0] < w[1]), "generations must be strictly ascending");
        if let Some(&last) = generations.last() {
            assert!((last as usize) < self.depth(leaf), "generation {} is beyond the lineage depth {}", last, self.depth(leaf));
        }

        let mut labels: Vec<u8> = vec![0; generations.len()];
        let mut remaining: usize = generations.len();
        let mut current: Option<NodeId> = leaf;
        while remaining > 0 {
            let node_id = match current {
                Some(n) => n,
                None => panic!("lineage ended with {} generations left to fetch", remaining)
            };
            let node: &HistoryNode = &self.nodes[node_id.index()];
            if node.generation == generations[remaining - 1] {
                labels[remaining - 1] = node.label;
                remaining -= 1;
            }
            current = node.parent;
        }
        labels
    }

    /// Reclaims every node that is not an ancestor of (or equal to) a surviving leaf.
    /// Marking starts from the free slots and walks each surviving lineage up until it reaches a node that is already marked.
    /// Returns the number of nodes reclaimed.
    pub fn clear_unused<I>(&mut self, surviving: I) -> usize
    where
        I: IntoIterator<Item = Option<NodeId>>
    {
        let mut marked: BitVec = self.is_free.clone();
        for leaf in surviving {
            let mut current: Option<NodeId> = leaf;
            while let Some(node_id) = current {
                if marked[node_id.index()] {
                    break;
                }
                marked.set(node_id.index(), true);
                current = self.nodes[node_id.index()].parent;
            }
        }

        let mut reclaimed: usize = 0;
        for (index, used) in marked.iter().enumerate() {
            if !used {
                self.free.push(NodeId(index as u32));
                self.is_free.set(index, true);
                reclaimed += 1;
            }
        }
        self.recycled += reclaimed as u64;
        trace!("history: reclaimed {} nodes, {} live", reclaimed, self.live_nodes());
        reclaimed
    }

    /// Returns the number of nodes currently in use
    pub fn live_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Returns the largest number of nodes that were in use at once
    pub fn peak_live_nodes(&self) -> usize {
        self.peak_live
    }

    /// Returns the total number of nodes reclaimed so far
    pub fn recycled_nodes(&self) -> u64 {
        self.recycled
    }

    /// Returns the number of node slots allocated, live or free
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }
}
