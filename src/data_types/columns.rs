
use crate::data_types::supports::{Allele, SupportRecord};

use log::trace;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// The range of sites a read has supports for, both ends inclusive
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadSpan {
    /// the first site with a support from this read
    pub first_site: usize,
    /// the last site with a support from this read
    pub last_site: usize
}

impl ReadSpan {
    #[cfg(test)]
    pub fn contains(&self, site_index: usize) -> bool {
        self.first_site <= site_index && site_index <= self.last_site
    }
}

/// The per-site active read sets for a full collection of supports.
/// A read is active at every site in its `ReadSpan`, regardless of whether it has a support at that exact site.
#[derive(Debug)]
pub struct ActiveSets {
    /// all site indices with at least one support, ascending; each one is a column
    sites: Vec<usize>,
    /// for each column, the ascending read indices that are active
    actives: Vec<Vec<usize>>,
    /// for each column, the ascending read indices that become active at that column
    entering: Vec<Vec<usize>>,
    /// the span of each read, indexed by read index; reads without supports are None
    read_spans: Vec<Option<ReadSpan>>
}

impl ActiveSets {
    /// Computes the read spans and then sweeps the sites once, adding reads at their first site and removing them after their last site.
    /// # Arguments
    /// * `supports` - all the support records, order does not matter
    pub fn new(supports: &[SupportRecord]) -> ActiveSets {
        let num_reads: usize = supports.iter()
            .map(|s| s.read_index() + 1)
            .max()
            .unwrap_or(0);

        let mut read_spans: Vec<Option<ReadSpan>> = vec![None; num_reads];
        for support in supports.iter() {
            let site_index = support.site_index();
            let span = read_spans[support.read_index()].get_or_insert(ReadSpan {
                first_site: site_index,
                last_site: site_index
            });
            span.first_site = span.first_site.min(site_index);
            span.last_site = span.last_site.max(site_index);
        }

        let mut sites: Vec<usize> = supports.iter()
            .map(|s| s.site_index())
            .collect();
        sites.sort_unstable();
        sites.dedup();

        // reads ordered by their entry point, ties broken by read index
        let mut reads_by_start: Vec<(usize, usize)> = read_spans.iter().enumerate()
            .filter_map(|(read_index, opt_span)| opt_span.map(|span| (span.first_site, read_index)))
            .collect();
        reads_by_start.sort_unstable();

        // departures come out of the queue with the smallest last site first
        let mut departures: PriorityQueue<usize, Reverse<usize>> = PriorityQueue::new();
        let mut current: BTreeSet<usize> = BTreeSet::new();
        let mut next_entry: usize = 0;

        let mut actives: Vec<Vec<usize>> = Vec::with_capacity(sites.len());
        let mut entering: Vec<Vec<usize>> = Vec::with_capacity(sites.len());
        for &site_index in sites.iter() {
            // remove anything that ended before this site
            while departures.peek().map(|(_, &Reverse(last_site))| last_site < site_index).unwrap_or(false) {
                if let Some((read_index, _)) = departures.pop() {
                    current.remove(&read_index);
                }
            }

            // add anything that starts here; every first site is itself a column, so nothing is ever skipped
            let mut site_entering: Vec<usize> = vec![];
            while next_entry < reads_by_start.len() && reads_by_start[next_entry].0 <= site_index {
                let read_index: usize = reads_by_start[next_entry].1;
                let span: ReadSpan = read_spans[read_index].unwrap_or_else(|| panic!("read {read_index} was queued without a span"));
                assert_eq!(span.first_site, site_index);
                current.insert(read_index);
                departures.push(read_index, Reverse(span.last_site));
                site_entering.push(read_index);
                next_entry += 1;
            }

            trace!("site {}: {} active, {} entering", site_index, current.len(), site_entering.len());
            actives.push(current.iter().copied().collect());
            entering.push(site_entering);
        }

        ActiveSets {
            sites,
            actives,
            entering,
            read_spans
        }
    }

    /// Returns the number of columns, i.e. sites with at least one support
    pub fn num_columns(&self) -> usize {
        self.sites.len()
    }

    /// Returns the site indices for all columns, ascending
    pub fn sites(&self) -> &[usize] {
        &self.sites
    }

    /// Returns the active reads for a column
    pub fn actives(&self, column_index: usize) -> &[usize] {
        &self.actives[column_index]
    }

    /// Returns the reads that become active at a column
    pub fn entering(&self, column_index: usize) -> &[usize] {
        &self.entering[column_index]
    }

    /// Returns the span for a read, or None if the read has no supports
    #[cfg(test)]
    pub fn read_span(&self, read_index: usize) -> Option<ReadSpan> {
        self.read_spans.get(read_index).copied().flatten()
    }

    /// Returns one more than the largest read index with a support
    pub fn num_read_slots(&self) -> usize {
        self.read_spans.len()
    }

    /// Returns the number of reads with at least one support
    pub fn num_observed_reads(&self) -> usize {
        self.read_spans.iter().filter(|s| s.is_some()).count()
    }

    /// Returns the largest active set size across all columns
    pub fn max_active(&self) -> usize {
        self.actives.iter().map(|a| a.len()).max().unwrap_or(0)
    }
}

/// The observations at one site, aligned to that site's active read set.
/// Active reads that have no support at this site have no allele and zero weight.
#[derive(Clone, Debug)]
pub struct ColumnView<'a> {
    /// the site this column is for
    site_index: usize,
    /// the ascending active read indices
    actives: &'a [usize],
    /// the observed allele for each active read, if any
    alleles: Vec<Option<Allele>>,
    /// the weight for each active read; 0.0 when there is no allele
    weights: Vec<f64>
}

impl<'a> ColumnView<'a> {
    /// Builds the view for a single site.
    /// # Arguments
    /// * `site_index` - the site to build for
    /// * `actives` - the ascending active reads for the site
    /// * `supports` - the supports to pull from, anything for another site is ignored
    /// # Panics
    /// * if a support for this site is from a read that is not active
    /// * if a read has two supports for this site
    pub fn new(site_index: usize, actives: &'a [usize], supports: &[SupportRecord]) -> ColumnView<'a> {
        let mut alleles: Vec<Option<Allele>> = vec![None; actives.len()];
        let mut weights: Vec<f64> = vec![0.0; actives.len()];
        for support in supports.iter().filter(|s| s.site_index() == site_index) {
            let position: usize = match actives.binary_search(&support.read_index()) {
                Ok(p) => p,
                Err(_) => panic!("site {}: read {} has a support but is not active", site_index, support.read_index())
            };
            assert!(alleles[position].is_none(), "site {}: read {} has multiple supports", site_index, support.read_index());
            alleles[position] = Some(support.allele());
            weights[position] = support.weight();
        }

        ColumnView {
            site_index,
            actives,
            alleles,
            weights
        }
    }

    pub fn site_index(&self) -> usize {
        self.site_index
    }

    pub fn actives(&self) -> &[usize] {
        self.actives
    }

    pub fn len(&self) -> usize {
        self.actives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actives.is_empty()
    }

    /// Returns the allele for the active read at `position`
    pub fn allele(&self, position: usize) -> Option<Allele> {
        self.alleles[position]
    }

    /// Returns the weight for the active read at `position`
    pub fn weight(&self, position: usize) -> f64 {
        self.weights[position]
    }

    /// Returns the number of active reads with an observation at this site
    #[cfg(test)]
    pub fn num_observed(&self) -> usize {
        self.alleles.iter().filter(|a| a.is_some()).count()
    }
}
