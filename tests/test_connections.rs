//! Integration tests for the `Connections` substrate.
//!
//! Tests cover:
//! - Segment/synapse lifecycle across capacity limits
//! - Canonical (column, cell, segment) ordering from compute_activity
//! - Structural equality after independent construction

use dendron::connections::{Connections, EPSILON};

#[test]
fn test_substrate_grows_with_use() {
    let mut conns = Connections::new(64, 8, 16);
    assert_eq!(conns.num_segments(), 0);
    assert_eq!(conns.num_synapses(), 0);

    let seg = conns.create_segment(10).unwrap();
    for presyn in 0..5 {
        conns.create_synapse(seg, presyn, 0.4).unwrap();
    }

    assert_eq!(conns.num_segments(), 1);
    assert_eq!(conns.num_synapses(), 5);
}

#[test]
fn test_multiple_segments_per_cell_preserve_creation_order() {
    let mut conns = Connections::new(16, 8, 16);
    let s1 = conns.create_segment(3).unwrap();
    let s2 = conns.create_segment(3).unwrap();
    let s3 = conns.create_segment(3).unwrap();

    let segs: Vec<_> = conns.segments_for_cell(3).collect();
    assert_eq!(segs, vec![s1, s2, s3]);
}

#[test]
fn test_compute_activity_merges_across_many_columns() {
    let cells_per_column = 4;
    let mut conns = Connections::new(32, 8, 16);

    // Segment on column 0 (cells 0..4), segment on column 5 (cells 20..24).
    let seg_col0 = conns.create_segment(1).unwrap();
    for presyn in [10, 11, 12, 13, 14] {
        conns.create_synapse(seg_col0, presyn, 0.6).unwrap();
    }
    let seg_col5 = conns.create_segment(21).unwrap();
    for presyn in [10, 11, 12, 13, 14] {
        conns.create_synapse(seg_col5, presyn, 0.6).unwrap();
    }

    let active_cells = vec![10, 11, 12, 13, 14];
    let (active, matching) = conns.compute_activity(&active_cells, 0.5, 4, 0.0, 3);

    assert_eq!(active, vec![seg_col0, seg_col5]);
    assert_eq!(matching, vec![seg_col0, seg_col5]);

    for &seg in &active {
        let column = conns.column_for_segment(seg, cells_per_column);
        assert!(column == 0 || column == 5);
    }
}

#[test]
fn test_destroyed_synapse_slot_is_reused() {
    let mut conns = Connections::new(8, 8, 2);
    let seg = conns.create_segment(0).unwrap();
    let syn1 = conns.create_synapse(seg, 1, 0.5).unwrap();
    conns.create_synapse(seg, 2, 0.5).unwrap();

    // At capacity (2 synapses); destroying one frees a slot for reuse.
    assert!(conns.create_synapse(seg, 3, 0.5).is_err());
    conns.destroy_synapse(syn1);
    assert!(conns.create_synapse(seg, 3, 0.5).is_ok());
}

#[test]
fn test_round_trip_via_bincode() {
    let mut conns = Connections::new(16, 8, 16);
    let seg = conns.create_segment(2).unwrap();
    conns.create_synapse(seg, 5, 0.33).unwrap();

    let bytes = bincode::serialize(&conns).unwrap();
    let restored: Connections = bincode::deserialize(&bytes).unwrap();

    assert!(conns.functionally_equal(&restored));
}

#[test]
fn test_functionally_equal_tolerates_epsilon_noise() {
    let mut a = Connections::new(8, 8, 8);
    let seg_a = a.create_segment(0).unwrap();
    a.create_synapse(seg_a, 1, 0.5).unwrap();

    let mut b = Connections::new(8, 8, 8);
    let seg_b = b.create_segment(0).unwrap();
    b.create_synapse(seg_b, 1, 0.5 + EPSILON / 2.0).unwrap();

    assert!(a.functionally_equal(&b));
}
