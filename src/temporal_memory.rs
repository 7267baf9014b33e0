//! `TemporalMemory` — the per-step inference/learning state machine that
//! drives [`Connections`].
//!
//! This is the sequence-learning layer: given a sparse set of active
//! columns (as would be produced by a spatial pooler upstream — out of
//! scope here, see the crate-level docs), it infers which cells are
//! active in context, which cells are winners for learning, and which
//! segments predict the next step.

use crate::connections::{Connections, Segment, EPSILON};
use crate::error::{Result, TemporalMemoryError};
use crate::utils::uint32_below;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Construction-time parameters for a [`TemporalMemory`].
///
/// Defaults mirror the nupic reference implementation's constructor
/// defaults (`nupic.research.temporal_memory.TemporalMemory.__init__`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalMemoryConfig {
    /// Dimensions of the column space; their product is the column count.
    pub column_dimensions: Vec<usize>,
    /// Number of cells per column.
    pub cells_per_column: usize,
    /// Connected-synapse count required to mark a segment *active*.
    pub activation_threshold: usize,
    /// Permanence assigned to newly grown synapses.
    pub initial_permanence: f64,
    /// Permanence above which a synapse is considered connected.
    pub connected_permanence: f64,
    /// Total-synapse-activity count required to mark a segment *matching*.
    pub min_threshold: usize,
    /// Cap on synapses grown per learning event.
    pub max_new_synapse_count: usize,
    /// Permanence step applied to active synapses during learning.
    pub permanence_increment: f64,
    /// Permanence step applied to inactive synapses during learning.
    pub permanence_decrement: f64,
    /// Punishment applied to synapses of segments that predicted a
    /// column that did not in fact become active.
    pub predicted_segment_decrement: f64,
    /// Hard cap on segments per cell.
    pub max_segments_per_cell: usize,
    /// Hard cap on synapses per segment.
    pub max_synapses_per_segment: usize,
    /// Seed for the deterministic rng.
    pub seed: u64,
}

impl Default for TemporalMemoryConfig {
    fn default() -> Self {
        Self {
            column_dimensions: vec![2048],
            cells_per_column: 32,
            activation_threshold: 13,
            initial_permanence: 0.21,
            connected_permanence: 0.50,
            min_threshold: 10,
            max_new_synapse_count: 20,
            permanence_increment: 0.10,
            permanence_decrement: 0.10,
            predicted_segment_decrement: 0.0,
            max_segments_per_cell: 255,
            max_synapses_per_segment: 255,
            seed: 42,
        }
    }
}

/// Online, unsupervised sequence-learning layer.
///
/// See the crate-level documentation for the full algorithm. In short:
/// each [`TemporalMemory::compute`] call walks the current active
/// columns against the previous step's active/matching segments in a
/// single column-ordered merge, classifying each column as
/// predicted-active, bursting, or (if learning) punished, and ends by
/// asking [`Connections`] to recompute the next step's active/matching
/// segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalMemory {
    config: TemporalMemoryConfig,
    num_columns: usize,
    num_cells: usize,

    connections: Connections,
    rng: StdRng,

    active_cells: Vec<usize>,
    winner_cells: Vec<usize>,
    active_segments: Vec<Segment>,
    matching_segments: Vec<Segment>,
}

impl TemporalMemory {
    /// Construct a new layer.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalMemoryError::InvalidConfiguration`] if
    /// `column_dimensions` is empty or `cells_per_column == 0`.
    pub fn new(config: TemporalMemoryConfig) -> Result<Self> {
        if config.column_dimensions.is_empty() {
            return Err(TemporalMemoryError::InvalidConfiguration(
                "column_dimensions must be non-empty".to_string(),
            ));
        }
        if config.cells_per_column == 0 {
            return Err(TemporalMemoryError::InvalidConfiguration(
                "cells_per_column must be > 0".to_string(),
            ));
        }

        let num_columns = config.column_dimensions.iter().product();
        let num_cells = num_columns * config.cells_per_column;
        let rng = StdRng::seed_from_u64(config.seed);
        let connections = Connections::new(
            num_cells,
            config.max_segments_per_cell,
            config.max_synapses_per_segment,
        );

        Ok(Self {
            config,
            num_columns,
            num_cells,
            connections,
            rng,
            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            active_segments: Vec::new(),
            matching_segments: Vec::new(),
        })
    }

    // ---------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------

    /// Number of columns (product of `column_dimensions`).
    #[inline]
    pub fn number_of_columns(&self) -> usize {
        self.num_columns
    }

    /// Number of cells (`number_of_columns() * cells_per_column`).
    #[inline]
    pub fn number_of_cells(&self) -> usize {
        self.num_cells
    }

    /// Cells per column, as configured.
    #[inline]
    pub fn cells_per_column(&self) -> usize {
        self.config.cells_per_column
    }

    /// Read-only access to the underlying substrate (for callers that
    /// need to inspect segments/synapses directly).
    #[inline]
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    /// The configuration this layer was constructed with.
    #[inline]
    pub fn config(&self) -> &TemporalMemoryConfig {
        &self.config
    }

    /// Currently active cells, sorted.
    pub fn get_active_cells(&self) -> &[usize] {
        &self.active_cells
    }

    /// Currently winning cells (used for learning), sorted.
    pub fn get_winner_cells(&self) -> &[usize] {
        &self.winner_cells
    }

    /// Cells predicted to become active next step: the deduplicated,
    /// sorted set of owners of `activeSegments`.
    pub fn get_predictive_cells(&self) -> Vec<usize> {
        let mut cells: Vec<usize> = self
            .active_segments
            .iter()
            .map(|&s| self.connections.cell_for_segment(s))
            .collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    /// The column a cell belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalMemoryError::InvalidCell`] if `cell` is out of
    /// range.
    pub fn column_for_cell(&self, cell: usize) -> Result<usize> {
        self.validate_cell(cell)?;
        Ok(cell / self.config.cells_per_column)
    }

    /// The cells belonging to a column, as a half-open range.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalMemoryError::InvalidColumn`] if `column` is out
    /// of range.
    pub fn cells_for_column(&self, column: usize) -> Result<std::ops::Range<usize>> {
        self.validate_column(column)?;
        let begin = column * self.config.cells_per_column;
        Ok(begin..begin + self.config.cells_per_column)
    }

    /// Group `cells` by the column each belongs to.
    ///
    /// Uses a `BTreeMap`/`BTreeSet` rather than a hash map so that
    /// iteration order is deterministic, matching §5's determinism
    /// contract even though the reference's `defaultdict(set)` does not
    /// guarantee it in Python.
    pub fn map_cells_to_columns(&self, cells: &[usize]) -> BTreeMap<usize, BTreeSet<usize>> {
        let mut map: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for &cell in cells {
            map.entry(cell / self.config.cells_per_column)
                .or_default()
                .insert(cell);
        }
        map
    }

    /// Functional equality per §6/§7: configuration scalars agree
    /// (floats within `EPSILON`), substrates agree structurally, and all
    /// four state collections agree.
    pub fn functionally_equal(&self, other: &TemporalMemory) -> bool {
        let a = &self.config;
        let b = &other.config;

        a.column_dimensions == b.column_dimensions
            && a.cells_per_column == b.cells_per_column
            && a.activation_threshold == b.activation_threshold
            && (a.initial_permanence - b.initial_permanence).abs() <= EPSILON
            && (a.connected_permanence - b.connected_permanence).abs() <= EPSILON
            && a.min_threshold == b.min_threshold
            && a.max_new_synapse_count == b.max_new_synapse_count
            && (a.permanence_increment - b.permanence_increment).abs() <= EPSILON
            && (a.permanence_decrement - b.permanence_decrement).abs() <= EPSILON
            && (a.predicted_segment_decrement - b.predicted_segment_decrement).abs() <= EPSILON
            && self.connections.functionally_equal(&other.connections)
            && self.active_cells == other.active_cells
            && self.winner_cells == other.winner_cells
            && self.active_segments == other.active_segments
            && self.matching_segments == other.matching_segments
    }

    /// Estimate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        let mut bytes = std::mem::size_of::<Self>();
        bytes += self.connections.memory_usage();
        bytes += self.active_cells.capacity() * std::mem::size_of::<usize>();
        bytes += self.winner_cells.capacity() * std::mem::size_of::<usize>();
        bytes += self.active_segments.capacity() * std::mem::size_of::<Segment>();
        bytes += self.matching_segments.capacity() * std::mem::size_of::<Segment>();
        bytes
    }

    // ---------------------------------------------------------------
    // Main loop
    // ---------------------------------------------------------------

    /// Indicates the start of a new sequence: clears `activeCells`,
    /// `winnerCells`, and `activeSegments`. `matchingSegments` survives,
    /// matching the reference (§ SUPPLEMENTED FEATURES, item 7).
    pub fn reset(&mut self) {
        self.active_cells.clear();
        self.winner_cells.clear();
        self.active_segments.clear();
    }

    /// Feed one time step through the layer.
    ///
    /// `active_columns` need not be pre-sorted or deduplicated by the
    /// caller — this mirrors the reference, which re-sorts unconditionally
    /// even though its own docs describe the input as already sorted and
    /// unique.
    ///
    /// # Errors
    ///
    /// Propagates [`TemporalMemoryError::CapacityExceeded`] if learning
    /// would exceed `max_segments_per_cell` or `max_synapses_per_segment`.
    pub fn compute(&mut self, active_columns: &[usize], learn: bool) -> Result<()> {
        debug_assert!(
            active_columns.iter().all(|&c| c < self.num_columns),
            "active_columns contains an out-of-range column index"
        );

        let mut active_columns: Vec<usize> = active_columns.to_vec();
        active_columns.sort_unstable();
        active_columns.dedup();

        let prev_active_cells = std::mem::take(&mut self.active_cells);
        let prev_winner_cells = std::mem::take(&mut self.winner_cells);

        let active_segments = std::mem::take(&mut self.active_segments);
        let matching_segments = std::mem::take(&mut self.matching_segments);

        let cpc = self.config.cells_per_column;
        let mut ci = 0usize;
        let mut ai = 0usize;
        let mut mi = 0usize;

        while ci < active_columns.len() || ai < active_segments.len() || mi < matching_segments.len() {
            let mut current_column = usize::MAX;
            if ai < active_segments.len() {
                current_column = current_column
                    .min(self.connections.column_for_segment(active_segments[ai], cpc));
            }
            if mi < matching_segments.len() {
                current_column = current_column
                    .min(self.connections.column_for_segment(matching_segments[mi], cpc));
            }

            let is_active_column = ci < active_columns.len() && active_columns[ci] <= current_column;
            if is_active_column {
                current_column = active_columns[ci];
                ci += 1;
            }

            let a_begin = ai;
            while ai < active_segments.len()
                && self.connections.column_for_segment(active_segments[ai], cpc) == current_column
            {
                ai += 1;
            }
            let a_end = ai;

            let m_begin = mi;
            while mi < matching_segments.len()
                && self.connections.column_for_segment(matching_segments[mi], cpc) == current_column
            {
                mi += 1;
            }
            let m_end = mi;

            if is_active_column {
                if a_begin != a_end {
                    self.activate_predicted_column(
                        &active_segments[a_begin..a_end],
                        learn,
                        &prev_active_cells,
                    );
                } else {
                    self.burst_column(
                        current_column,
                        &matching_segments[m_begin..m_end],
                        learn,
                        &prev_active_cells,
                        &prev_winner_cells,
                    )?;
                }
            } else if learn {
                self.punish_predicted_column(&matching_segments[m_begin..m_end], &prev_active_cells);
            }
        }

        self.active_cells.sort_unstable();
        self.active_cells.dedup();
        self.winner_cells.sort_unstable();
        self.winner_cells.dedup();

        let (new_active, new_matching) = self.connections.compute_activity(
            &self.active_cells,
            self.config.connected_permanence,
            self.config.activation_threshold,
            0.0,
            self.config.min_threshold,
        );
        self.active_segments = new_active;
        self.matching_segments = new_matching;

        Ok(())
    }

    // ---------------------------------------------------------------
    // Per-column policies
    // ---------------------------------------------------------------

    /// Active column with at least one active segment: only the
    /// predicting cells activate.
    fn activate_predicted_column(&mut self, segments: &[Segment], learn: bool, prev_active_cells: &[usize]) {
        let mut last_cell: Option<usize> = None;
        for &segment in segments {
            let cell = self.connections.cell_for_segment(segment);
            if last_cell != Some(cell) {
                self.active_cells.push(cell);
                self.winner_cells.push(cell);
                last_cell = Some(cell);
            }

            if learn {
                self.adapt_segment(
                    prev_active_cells,
                    self.config.permanence_increment,
                    self.config.permanence_decrement,
                    segment,
                );
            }
        }
    }

    /// Active column with no active segments: all cells activate, one
    /// is chosen as winner.
    fn burst_column(
        &mut self,
        column: usize,
        matching: &[Segment],
        learn: bool,
        prev_active_cells: &[usize],
        prev_winner_cells: &[usize],
    ) -> Result<()> {
        let cpc = self.config.cells_per_column;
        let cell_begin = column * cpc;
        let cell_end = cell_begin + cpc;

        self.active_cells.extend(cell_begin..cell_end);

        if !matching.is_empty() {
            let (best_segment, overlap) = self.best_matching_segment(matching, prev_active_cells);
            let winner_cell = self.connections.cell_for_segment(best_segment);
            self.winner_cells.push(winner_cell);

            if learn {
                self.adapt_segment(
                    prev_active_cells,
                    self.config.permanence_increment,
                    self.config.permanence_decrement,
                    best_segment,
                );

                let n_grow_desired = self.config.max_new_synapse_count.saturating_sub(overlap);
                if n_grow_desired > 0 {
                    self.grow_synapses(n_grow_desired, prev_winner_cells, best_segment)?;
                }
            }
        } else {
            let winner_cell = self.least_used_cell(cell_begin, cell_end);
            self.winner_cells.push(winner_cell);

            if learn && !prev_winner_cells.is_empty() {
                let n_grow_exact = prev_winner_cells.len().min(self.config.max_new_synapse_count);
                if n_grow_exact > 0 {
                    let new_segment = self.connections.create_segment(winner_cell)?;
                    self.grow_synapses(n_grow_exact, prev_winner_cells, new_segment)?;
                }
            }
        }

        Ok(())
    }

    /// Inactive column with matching segments: punish the segments that
    /// incorrectly predicted this column would be active.
    fn punish_predicted_column(&mut self, matching: &[Segment], prev_active_cells: &[usize]) {
        if self.config.predicted_segment_decrement > 0.0 {
            for &segment in matching {
                self.adapt_segment(
                    prev_active_cells,
                    -self.config.predicted_segment_decrement,
                    0.0,
                    segment,
                );
            }
        }
    }

    // ---------------------------------------------------------------
    // Learning primitives
    // ---------------------------------------------------------------

    /// Strengthen synapses from `prev_active_cells`, weaken the rest;
    /// destroy any synapse whose permanence decays below `EPSILON`.
    ///
    /// `increment` may be negative — the punishment path passes
    /// `-predicted_segment_decrement` with `decrement = 0.0`.
    fn adapt_segment(&mut self, prev_active_cells: &[usize], increment: f64, decrement: f64, segment: Segment) {
        // Snapshot: `destroy_synapse` below must not perturb this iteration.
        let synapses: Vec<_> = self.connections.synapses_for_segment(segment).collect();

        for synapse in synapses {
            let Some(data) = self.connections.data_for_synapse(synapse) else {
                continue;
            };

            let mut permanence = data.permanence;
            if prev_active_cells.binary_search(&data.presynaptic_cell).is_ok() {
                permanence += increment;
            } else {
                permanence -= decrement;
            }
            permanence = permanence.clamp(0.0, 1.0);

            if permanence < EPSILON {
                self.connections.destroy_synapse(synapse);
            } else {
                self.connections.update_synapse_permanence(synapse, permanence);
            }
        }
    }

    /// The matching segment in `matching` with the largest total-active-
    /// synapse count against `prev_active_cells`. Ties favor the *last*
    /// occurrence (`>=`, not `>`) — load-bearing for reproducibility
    /// against the reference (§9 Open Question (c)).
    fn best_matching_segment(&self, matching: &[Segment], prev_active_cells: &[usize]) -> (Segment, usize) {
        let mut best_segment = matching[0];
        let mut best_overlap = 0usize;

        for &segment in matching {
            let overlap = self
                .connections
                .synapses_for_segment(segment)
                .filter(|&syn| {
                    self.connections
                        .data_for_synapse(syn)
                        .map(|d| prev_active_cells.binary_search(&d.presynaptic_cell).is_ok())
                        .unwrap_or(false)
                })
                .count();

            if overlap >= best_overlap {
                best_overlap = overlap;
                best_segment = segment;
            }
        }

        (best_segment, best_overlap)
    }

    /// The cell in `[cell_begin, cell_end)` with the fewest owned
    /// segments, ties broken uniformly at random via the layer's rng.
    fn least_used_cell(&mut self, cell_begin: usize, cell_end: usize) -> usize {
        let mut min_segments = usize::MAX;
        let mut tied = Vec::new();

        for cell in cell_begin..cell_end {
            let n = self.connections.num_segments_for_cell(cell);
            if n < min_segments {
                min_segments = n;
                tied.clear();
            }
            if n == min_segments {
                tied.push(cell);
            }
        }

        // Cells were scanned ascending, so this sort is a no-op; it is
        // part of the contract for determinism across implementations.
        tied.sort_unstable();
        let idx = uint32_below(tied.len(), &mut self.rng);
        tied[idx]
    }

    /// Grow up to `n_desired` synapses onto `segment` from
    /// `prev_winner_cells`, excluding cells already presynaptic to it.
    /// Selection uses the nupic reference's swap-to-end sampling, not a
    /// pre-shuffle — this ordering is an observable part of the contract
    /// (§9 "Sampling order").
    fn grow_synapses(&mut self, n_desired: usize, prev_winner_cells: &[usize], segment: Segment) -> Result<()> {
        let existing: std::collections::HashSet<usize> = self
            .connections
            .synapses_for_segment(segment)
            .filter_map(|syn| self.connections.data_for_synapse(syn).map(|d| d.presynaptic_cell))
            .collect();

        let mut candidates: Vec<usize> = prev_winner_cells
            .iter()
            .copied()
            .filter(|c| !existing.contains(c))
            .collect();
        candidates.sort_unstable();

        let mut len = candidates.len();
        let n = n_desired.min(len);

        for _ in 0..n {
            let r = uint32_below(len, &mut self.rng);
            self.connections
                .create_synapse(segment, candidates[r], self.config.initial_permanence)?;
            candidates[r] = candidates[len - 1];
            len -= 1;
        }

        Ok(())
    }

    fn validate_cell(&self, cell: usize) -> Result<()> {
        if cell >= self.num_cells {
            Err(TemporalMemoryError::InvalidCell {
                index: cell,
                num_cells: self.num_cells,
            })
        } else {
            Ok(())
        }
    }

    fn validate_column(&self, column: usize) -> Result<()> {
        if column >= self.num_columns {
            Err(TemporalMemoryError::InvalidColumn {
                index: column,
                num_columns: self.num_columns,
            })
        } else {
            Ok(())
        }
    }
}
