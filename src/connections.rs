//! `Connections` — the sparse synaptic substrate underneath temporal memory.
//!
//! Stores segments and synapses as dense arena entries addressed by opaque
//! handles (matching the teacher's preference for index-based pooling over
//! pointer graphs — see `BlockMemory`'s flattened `r_addrs`/`r_perms`
//! arrays), and answers the one query the [`crate::TemporalMemory`] compute
//! step actually needs: given a set of active presynaptic cells, which
//! segments are *active* and which are *matching*, in canonical
//! `(column, cell, segment)` order.
//!
//! # Architecture
//!
//! ```text
//! cell 0 --- segments[cell_segments[0]] --- synapse_order --- synapse_slots
//! cell 1 --- segments[cell_segments[1]]
//!  ...
//! ```
//!
//! Segments are never destroyed (§9 Open Question (a) of the spec this
//! crate implements records this as a known future extension, matching
//! the nupic reference's commented-out `destroySegment` call). Synapses
//! are destroyed when their permanence decays below `EPSILON`; destroyed
//! slots go on a free list so the arena doesn't grow unboundedly under
//! the churn `adaptSegment` produces.

use crate::error::{CapacityKind, Result, TemporalMemoryError};
use serde::{Deserialize, Serialize};

/// Permanences below this value are treated as zero and the synapse is
/// destroyed (matches nupic's `EPSILON = 0.000001`).
pub const EPSILON: f64 = 1e-6;

/// Opaque handle to a dendritic segment.
///
/// Stable for the segment's lifetime (segments are never destroyed by
/// this crate). Comparisons and ordering are by creation order, which is
/// what makes `(cell, Segment)` a valid secondary/tertiary sort key for
/// the canonical ordering invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Segment(u32);

/// Opaque handle to a synapse, scoped to the segment that owns it.
///
/// Becomes invalid once [`Connections::destroy_synapse`] is called; using
/// a stale handle afterward is a caller error (the substrate does not
/// reuse a handle's *value* for a different synapse while other live
/// handles could confuse it with the original, but the freed arena slot
/// may back a different future synapse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Synapse(u32);

/// The data carried by a synapse: which cell it listens to, and how
/// strongly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynapseData {
    /// The presynaptic cell this synapse listens to.
    pub presynaptic_cell: usize,
    /// Connection strength in `[0.0, 1.0]`.
    pub permanence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentRecord {
    cell: usize,
    /// Synapse ids in creation order; shrinks as synapses are destroyed.
    synapse_order: Vec<Synapse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SynapseSlot {
    /// `None` when the slot has been freed by `destroy_synapse`.
    data: Option<SynapseSlotData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SynapseSlotData {
    segment: Segment,
    presynaptic_cell: usize,
    permanence: f64,
}

/// The sparse synapse substrate: cells own segments, segments own
/// synapses, synapses carry a floating-point permanence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connections {
    num_cells: usize,
    max_segments_per_cell: usize,
    max_synapses_per_segment: usize,

    segments: Vec<SegmentRecord>,
    cell_segments: Vec<Vec<Segment>>,

    synapse_slots: Vec<SynapseSlot>,
    free_synapse_slots: Vec<u32>,
}

impl Connections {
    /// Create an empty substrate over `num_cells` cells.
    pub fn new(num_cells: usize, max_segments_per_cell: usize, max_synapses_per_segment: usize) -> Self {
        assert!(num_cells > 0, "num_cells must be > 0");

        Self {
            num_cells,
            max_segments_per_cell,
            max_synapses_per_segment,
            segments: Vec::new(),
            cell_segments: vec![Vec::new(); num_cells],
            synapse_slots: Vec::new(),
            free_synapse_slots: Vec::new(),
        }
    }

    /// Number of cells this substrate was constructed over.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Total number of live segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Total number of live synapses.
    pub fn num_synapses(&self) -> usize {
        self.synapse_slots.iter().filter(|s| s.data.is_some()).count()
    }

    /// Append a new segment to `cell`'s ordered segment list.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalMemoryError::CapacityExceeded`] if `cell` already
    /// owns `max_segments_per_cell` segments. Per this crate's chosen
    /// policy (§9 Open Question (b)), capacity is never reclaimed by
    /// evicting an existing segment — the caller must handle the error.
    pub fn create_segment(&mut self, cell: usize) -> Result<Segment> {
        debug_assert!(cell < self.num_cells, "cell out of bounds");

        if self.cell_segments[cell].len() >= self.max_segments_per_cell {
            return Err(TemporalMemoryError::CapacityExceeded {
                kind: CapacityKind::SegmentsPerCell,
                limit: self.max_segments_per_cell,
            });
        }

        let id = Segment(self.segments.len() as u32);
        self.segments.push(SegmentRecord {
            cell,
            synapse_order: Vec::new(),
        });
        self.cell_segments[cell].push(id);
        Ok(id)
    }

    /// Add a synapse from `presynaptic_cell` onto `segment`.
    ///
    /// The caller must guarantee `segment` does not already hold a
    /// synapse from `presynaptic_cell` (invariant I2); this is not
    /// checked in release builds.
    ///
    /// # Errors
    ///
    /// Returns [`TemporalMemoryError::CapacityExceeded`] if `segment`
    /// already holds `max_synapses_per_segment` synapses.
    pub fn create_synapse(
        &mut self,
        segment: Segment,
        presynaptic_cell: usize,
        permanence: f64,
    ) -> Result<Synapse> {
        let record = &mut self.segments[segment.0 as usize];

        debug_assert!(
            record
                .synapse_order
                .iter()
                .all(|&s| self.synapse_slots[s.0 as usize]
                    .data
                    .as_ref()
                    .map(|d| d.presynaptic_cell != presynaptic_cell)
                    .unwrap_or(true)),
            "duplicate presynaptic cell on segment"
        );

        if record.synapse_order.len() >= self.max_synapses_per_segment {
            return Err(TemporalMemoryError::CapacityExceeded {
                kind: CapacityKind::SynapsesPerSegment,
                limit: self.max_synapses_per_segment,
            });
        }

        let permanence = permanence.clamp(0.0, 1.0);
        let slot_data = SynapseSlotData {
            segment,
            presynaptic_cell,
            permanence,
        };

        let id = if let Some(free) = self.free_synapse_slots.pop() {
            self.synapse_slots[free as usize].data = Some(slot_data);
            Synapse(free)
        } else {
            let id = Synapse(self.synapse_slots.len() as u32);
            self.synapse_slots.push(SynapseSlot {
                data: Some(slot_data),
            });
            id
        };

        self.segments[segment.0 as usize].synapse_order.push(id);
        Ok(id)
    }

    /// Remove `synapse`. Handles to other synapses on the same segment
    /// remain valid.
    pub fn destroy_synapse(&mut self, synapse: Synapse) {
        let Some(data) = self.synapse_slots[synapse.0 as usize].data.take() else {
            return;
        };

        let record = &mut self.segments[data.segment.0 as usize];
        if let Some(pos) = record.synapse_order.iter().position(|&s| s == synapse) {
            record.synapse_order.remove(pos);
        }

        self.free_synapse_slots.push(synapse.0);
    }

    /// Set `synapse`'s permanence, clamped to `[0.0, 1.0]`.
    pub fn update_synapse_permanence(&mut self, synapse: Synapse, permanence: f64) {
        if let Some(data) = self.synapse_slots[synapse.0 as usize].data.as_mut() {
            data.permanence = permanence.clamp(0.0, 1.0);
        }
    }

    /// Iterate a segment's synapses in creation order.
    pub fn synapses_for_segment(&self, segment: Segment) -> impl Iterator<Item = Synapse> + '_ {
        self.segments[segment.0 as usize].synapse_order.iter().copied()
    }

    /// Iterate a cell's segments in creation order.
    pub fn segments_for_cell(&self, cell: usize) -> impl Iterator<Item = Segment> + '_ {
        self.cell_segments[cell].iter().copied()
    }

    /// Number of segments currently owned by `cell`.
    pub fn num_segments_for_cell(&self, cell: usize) -> usize {
        self.cell_segments[cell].len()
    }

    /// The cell that owns `segment`.
    pub fn cell_for_segment(&self, segment: Segment) -> usize {
        self.segments[segment.0 as usize].cell
    }

    /// The column that owns `segment`, given `cells_per_column`.
    pub fn column_for_segment(&self, segment: Segment, cells_per_column: usize) -> usize {
        self.cell_for_segment(segment) / cells_per_column
    }

    /// Look up a synapse's presynaptic cell and permanence.
    ///
    /// Returns `None` if `synapse` has been destroyed.
    pub fn data_for_synapse(&self, synapse: Synapse) -> Option<SynapseData> {
        self.synapse_slots[synapse.0 as usize]
            .data
            .as_ref()
            .map(|d| SynapseData {
                presynaptic_cell: d.presynaptic_cell,
                permanence: d.permanence,
            })
    }

    /// Compute, for every segment, whether it is active and/or matching
    /// against `active_cells`, returning both lists in canonical
    /// `(column, cell, segment)` order.
    ///
    /// `active_cells` must be sorted and deduplicated; sorting purely by
    /// owner cell already yields `(column, cell)` order because
    /// `column(cell)` is non-decreasing in `cell` (cells for a column are
    /// contiguous), so no `cells_per_column` parameter is needed here.
    pub fn compute_activity(
        &self,
        active_cells: &[usize],
        connected_permanence: f64,
        activation_threshold: usize,
        learning_permanence: f64,
        min_threshold: usize,
    ) -> (Vec<Segment>, Vec<Segment>) {
        let mut active_segments = Vec::new();
        let mut matching_segments = Vec::new();

        for (idx, record) in self.segments.iter().enumerate() {
            let mut connected_active = 0usize;
            let mut total_active = 0usize;

            for &syn in &record.synapse_order {
                let Some(data) = &self.synapse_slots[syn.0 as usize].data else {
                    continue;
                };
                if active_cells.binary_search(&data.presynaptic_cell).is_ok() {
                    if data.permanence >= connected_permanence {
                        connected_active += 1;
                    }
                    if data.permanence > learning_permanence {
                        total_active += 1;
                    }
                }
            }

            let segment = Segment(idx as u32);
            if connected_active >= activation_threshold {
                active_segments.push(segment);
            }
            if total_active >= min_threshold {
                matching_segments.push(segment);
            }
        }

        let key = |seg: &Segment| (self.segments[seg.0 as usize].cell, seg.0);
        active_segments.sort_by_key(key);
        matching_segments.sort_by_key(key);

        (active_segments, matching_segments)
    }

    /// Structural equality within `EPSILON`: same segments per cell in
    /// the same order, same synapses per segment in the same order, same
    /// permanences within tolerance. Used to implement §6/§7's
    /// "functionally equal" contract for round-tripped state.
    pub fn functionally_equal(&self, other: &Connections) -> bool {
        if self.num_cells != other.num_cells {
            return false;
        }
        if self.cell_segments.len() != other.cell_segments.len() {
            return false;
        }

        for (segs_a, segs_b) in self.cell_segments.iter().zip(other.cell_segments.iter()) {
            if segs_a.len() != segs_b.len() {
                return false;
            }
            for (&sa, &sb) in segs_a.iter().zip(segs_b.iter()) {
                let order_a = &self.segments[sa.0 as usize].synapse_order;
                let order_b = &other.segments[sb.0 as usize].synapse_order;
                if order_a.len() != order_b.len() {
                    return false;
                }
                for (&ta, &tb) in order_a.iter().zip(order_b.iter()) {
                    let da = self.data_for_synapse(ta);
                    let db = other.data_for_synapse(tb);
                    match (da, db) {
                        (Some(da), Some(db)) => {
                            if da.presynaptic_cell != db.presynaptic_cell
                                || (da.permanence - db.permanence).abs() > EPSILON
                            {
                                return false;
                            }
                        }
                        _ => return false,
                    }
                }
            }
        }

        true
    }

    /// Estimate memory usage in bytes (matches the teacher's
    /// `memory_usage()` convention on every stateful type).
    pub fn memory_usage(&self) -> usize {
        let mut bytes = std::mem::size_of::<Self>();
        bytes += self.segments.capacity() * std::mem::size_of::<SegmentRecord>();
        for record in &self.segments {
            bytes += record.synapse_order.capacity() * std::mem::size_of::<Synapse>();
        }
        bytes += self.cell_segments.capacity() * std::mem::size_of::<Vec<Segment>>();
        for segs in &self.cell_segments {
            bytes += segs.capacity() * std::mem::size_of::<Segment>();
        }
        bytes += self.synapse_slots.capacity() * std::mem::size_of::<SynapseSlot>();
        bytes += self.free_synapse_slots.capacity() * std::mem::size_of::<u32>();
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_segment_and_synapse() {
        let mut conns = Connections::new(100, 255, 255);
        let seg = conns.create_segment(5).unwrap();
        assert_eq!(conns.cell_for_segment(seg), 5);

        let syn = conns.create_synapse(seg, 10, 0.5).unwrap();
        let data = conns.data_for_synapse(syn).unwrap();
        assert_eq!(data.presynaptic_cell, 10);
        assert!((data.permanence - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_segment_capacity_exceeded() {
        let mut conns = Connections::new(10, 2, 255);
        conns.create_segment(0).unwrap();
        conns.create_segment(0).unwrap();
        let err = conns.create_segment(0).unwrap_err();
        assert!(matches!(
            err,
            TemporalMemoryError::CapacityExceeded {
                kind: CapacityKind::SegmentsPerCell,
                ..
            }
        ));
    }

    #[test]
    fn test_synapse_capacity_exceeded() {
        let mut conns = Connections::new(10, 255, 2);
        let seg = conns.create_segment(0).unwrap();
        conns.create_synapse(seg, 1, 0.5).unwrap();
        conns.create_synapse(seg, 2, 0.5).unwrap();
        let err = conns.create_synapse(seg, 3, 0.5).unwrap_err();
        assert!(matches!(
            err,
            TemporalMemoryError::CapacityExceeded {
                kind: CapacityKind::SynapsesPerSegment,
                ..
            }
        ));
    }

    #[test]
    fn test_permanence_clamped() {
        let mut conns = Connections::new(10, 255, 255);
        let seg = conns.create_segment(0).unwrap();
        let syn = conns.create_synapse(seg, 1, 1.5).unwrap();
        assert!((conns.data_for_synapse(syn).unwrap().permanence - 1.0).abs() < EPSILON);

        conns.update_synapse_permanence(syn, -0.5);
        assert!((conns.data_for_synapse(syn).unwrap().permanence - 0.0).abs() < EPSILON);
    }

    #[test]
    fn test_destroy_synapse_removes_it() {
        let mut conns = Connections::new(10, 255, 255);
        let seg = conns.create_segment(0).unwrap();
        let syn1 = conns.create_synapse(seg, 1, 0.5).unwrap();
        let syn2 = conns.create_synapse(seg, 2, 0.5).unwrap();

        conns.destroy_synapse(syn1);

        let remaining: Vec<_> = conns.synapses_for_segment(seg).collect();
        assert_eq!(remaining, vec![syn2]);
        assert!(conns.data_for_synapse(syn1).is_none());
    }

    #[test]
    fn test_destroy_synapse_preserves_sibling_handles() {
        let mut conns = Connections::new(10, 255, 255);
        let seg = conns.create_segment(0).unwrap();
        let syn1 = conns.create_synapse(seg, 1, 0.5).unwrap();
        let syn2 = conns.create_synapse(seg, 2, 0.6).unwrap();
        let syn3 = conns.create_synapse(seg, 3, 0.7).unwrap();

        conns.destroy_synapse(syn2);

        assert!((conns.data_for_synapse(syn1).unwrap().permanence - 0.5).abs() < EPSILON);
        assert!((conns.data_for_synapse(syn3).unwrap().permanence - 0.7).abs() < EPSILON);
    }

    #[test]
    fn test_compute_activity_active_and_matching() {
        let mut conns = Connections::new(20, 255, 255);
        let seg = conns.create_segment(4).unwrap();
        for cell in [1, 2, 3, 4, 5] {
            conns.create_synapse(seg, cell, 0.6).unwrap();
        }

        let active_cells = vec![1, 2, 3];
        let (active, matching) = conns.compute_activity(&active_cells, 0.5, 3, 0.0, 2);

        assert_eq!(active, vec![seg]);
        assert_eq!(matching, vec![seg]);
    }

    #[test]
    fn test_compute_activity_below_threshold() {
        let mut conns = Connections::new(20, 255, 255);
        let seg = conns.create_segment(4).unwrap();
        conns.create_synapse(seg, 1, 0.6).unwrap();
        conns.create_synapse(seg, 2, 0.6).unwrap();

        let active_cells = vec![1];
        let (active, matching) = conns.compute_activity(&active_cells, 0.5, 2, 0.0, 2);

        assert!(active.is_empty());
        assert!(matching.is_empty());
    }

    #[test]
    fn test_compute_activity_canonical_order() {
        let mut conns = Connections::new(40, 255, 255);
        // Segment on a high cell, created first.
        let seg_high = conns.create_segment(30).unwrap();
        conns.create_synapse(seg_high, 1, 0.9).unwrap();
        // Segment on a low cell, created second.
        let seg_low = conns.create_segment(2).unwrap();
        conns.create_synapse(seg_low, 1, 0.9).unwrap();

        let active_cells = vec![1];
        let (active, _matching) = conns.compute_activity(&active_cells, 0.5, 1, 0.0, 1);

        assert_eq!(active, vec![seg_low, seg_high]);
    }

    #[test]
    fn test_disconnected_synapse_not_active_but_matching() {
        let mut conns = Connections::new(10, 255, 255);
        let seg = conns.create_segment(0).unwrap();
        conns.create_synapse(seg, 1, 0.3).unwrap(); // below connected threshold

        let active_cells = vec![1];
        let (active, matching) = conns.compute_activity(&active_cells, 0.5, 1, 0.0, 1);

        assert!(active.is_empty());
        assert_eq!(matching, vec![seg]);
    }

    #[test]
    fn test_memory_usage_nonzero() {
        let mut conns = Connections::new(10, 255, 255);
        let seg = conns.create_segment(0).unwrap();
        conns.create_synapse(seg, 1, 0.5).unwrap();
        assert!(conns.memory_usage() > 0);
    }

    #[test]
    fn test_functionally_equal() {
        let mut a = Connections::new(10, 255, 255);
        let seg_a = a.create_segment(3).unwrap();
        a.create_synapse(seg_a, 1, 0.5).unwrap();

        let mut b = Connections::new(10, 255, 255);
        let seg_b = b.create_segment(3).unwrap();
        b.create_synapse(seg_b, 1, 0.5000001).unwrap();

        assert!(a.functionally_equal(&b));

        b.update_synapse_permanence(seg_b_first_synapse(&b, seg_b), 0.9);
        assert!(!a.functionally_equal(&b));
    }

    fn seg_b_first_synapse(conns: &Connections, seg: Segment) -> Synapse {
        conns.synapses_for_segment(seg).next().unwrap()
    }
}
