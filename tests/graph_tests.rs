//! Graph Connectivity Integration Tests
//!
//! Tests for:
//! - Node: add/remove child, edge-pair symmetry, sibling ordering
//! - Instancing: one child under several parents
//! - Cycle guard: self-parenting and ancestor loops are refused
//! - Snapshots: per-stage isolation and frame cycling

use std::sync::Arc;

use grove::{Node, NodePayload, PlainPayload};

// ============================================================================
// Edge Pairs
// ============================================================================

#[test]
fn add_child_creates_both_edge_halves() {
    let p = Node::new("P");
    let c = Node::new("C");

    p.add_child(&c, 0).unwrap();

    assert_eq!(p.find_child(&c), Some(0));
    assert_eq!(c.num_parents(), 1);
    assert!(c.has_parent(&p));
}

#[test]
fn remove_child_removes_both_edge_halves() {
    let p = Node::new("P");
    let c = Node::new("C");
    p.add_child(&c, 0).unwrap();

    assert!(p.remove_child(&c));

    assert_eq!(p.find_child(&c), None);
    assert_eq!(c.num_parents(), 0);
}

#[test]
fn remove_child_of_non_child_fails_and_mutates_nothing() {
    let p = Node::new("P");
    let c = Node::new("C");
    let stranger = Node::new("S");
    p.add_child(&c, 0).unwrap();

    assert!(!p.remove_child(&stranger));

    assert_eq!(p.num_children(), 1);
    assert_eq!(c.num_parents(), 1);
    assert_eq!(stranger.num_parents(), 0);
}

#[test]
fn re_adding_a_child_replaces_the_edge() {
    let p = Node::new("P");
    let b = Node::new("B");
    let c = Node::new("C");
    p.add_child(&c, 0).unwrap();
    p.add_child(&b, 5).unwrap();

    // Same child again at a new sort: still one edge, new position
    p.add_child(&c, 10).unwrap();

    assert_eq!(p.num_children(), 2);
    assert_eq!(c.num_parents(), 1);
    let snapshot = p.snapshot(0);
    let down = snapshot.down();
    assert!(Arc::ptr_eq(down[0].child(), &b));
    assert!(Arc::ptr_eq(down[1].child(), &c));
    assert_eq!(down[1].sort(), 10);
}

#[test]
fn siblings_order_by_sort_with_stable_ties() {
    let p = Node::new("P");
    let a = Node::new("A");
    let b = Node::new("B");
    let c = Node::new("C");
    let d = Node::new("D");

    p.add_child(&a, 0).unwrap();
    p.add_child(&b, 0).unwrap();
    p.add_child(&c, -1).unwrap();
    p.add_child(&d, 0).unwrap();

    let names: Vec<String> = p
        .children()
        .iter()
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(names, ["C", "A", "B", "D"]);
}

#[test]
fn remove_all_children_unwinds_every_pair() {
    let p = Node::new("P");
    let a = Node::new("A");
    let b = Node::new("B");
    p.add_child(&a, 0).unwrap();
    p.add_child(&b, 1).unwrap();

    p.remove_all_children();

    assert_eq!(p.num_children(), 0);
    assert_eq!(a.num_parents(), 0);
    assert_eq!(b.num_parents(), 0);
}

// ============================================================================
// Instancing
// ============================================================================

#[test]
fn a_node_can_have_several_parents() {
    let p1 = Node::new("P1");
    let p2 = Node::new("P2");
    let c = Node::new("C");

    p1.add_child(&c, 0).unwrap();
    p2.add_child(&c, 0).unwrap();

    assert_eq!(c.num_parents(), 2);
    assert_eq!(p1.find_child(&c), Some(0));
    assert_eq!(p2.find_child(&c), Some(0));
}

#[test]
fn dropping_the_last_parent_severs_the_child() {
    let p = Node::new("P");
    let c = Node::new("C");
    p.add_child(&c, 0).unwrap();

    drop(p);

    assert_eq!(c.num_parents(), 0);
}

// ============================================================================
// Cycle Guard
// ============================================================================

#[test]
fn self_parenting_is_refused() {
    let n = Node::new("N");
    assert!(n.add_child(&n, 0).is_err());
    assert_eq!(n.num_children(), 0);
    assert_eq!(n.num_parents(), 0);
}

#[test]
fn ancestor_loops_are_refused() {
    let r = Node::new("R");
    let n = Node::new("N");
    let m = Node::new("M");
    r.add_child(&n, 0).unwrap();
    n.add_child(&m, 0).unwrap();

    assert!(m.add_child(&r, 0).is_err());
    assert_eq!(m.num_children(), 0);
    assert_eq!(r.num_parents(), 0);
}

// ============================================================================
// Per-Stage Snapshots
// ============================================================================

#[test]
fn later_stages_keep_reading_the_old_frame() {
    let p = Node::new("P");
    let c = Node::new("C");

    let cull_before = p.snapshot(1);
    p.add_child(&c, 0).unwrap();

    // The held snapshot and the cull stage still see the old frame
    assert_eq!(cull_before.down().len(), 0);
    assert_eq!(p.snapshot(1).down().len(), 0);
    assert_eq!(p.snapshot(0).down().len(), 1);

    // After a frame boundary the edit reaches the cull stage
    p.cycle();
    assert_eq!(p.snapshot(1).down().len(), 1);
}

// ============================================================================
// Copies, Hooks, Listing
// ============================================================================

#[test]
fn make_copy_shares_state_but_not_children() {
    let p = Node::new("P");
    let c = Node::new("C");
    p.add_child(&c, 0).unwrap();

    let copy = p.make_copy();

    assert_eq!(copy.name(), "P");
    assert_eq!(copy.num_children(), 0);
    assert!(Arc::ptr_eq(&copy.state(), &p.state()));
    assert!(Arc::ptr_eq(&copy.transform(), &p.transform()));
}

#[derive(Debug, Clone, Copy)]
struct EveryOtherChild;

impl NodePayload for EveryOtherChild {
    fn box_clone(&self) -> Box<dyn NodePayload> {
        Box::new(*self)
    }

    fn type_name(&self) -> &'static str {
        "switch"
    }

    fn has_selective_visibility(&self) -> bool {
        true
    }

    fn next_visible_child(&self, index: usize) -> usize {
        index + 2
    }
}

#[test]
fn default_payload_shows_every_child() {
    let p = Node::with_payload("P", Box::new(PlainPayload));
    let a = Node::new("A");
    let b = Node::new("B");
    p.add_child(&a, 0).unwrap();
    p.add_child(&b, 1).unwrap();

    assert!(!p.payload().has_selective_visibility());
    assert_eq!(p.visible_children(0).len(), 2);
}

#[test]
fn selective_visibility_filters_children() {
    let p = Node::with_payload("P", Box::new(EveryOtherChild));
    let a = Node::new("A");
    let b = Node::new("B");
    let c = Node::new("C");
    p.add_child(&a, 0).unwrap();
    p.add_child(&b, 1).unwrap();
    p.add_child(&c, 2).unwrap();

    let visible = p.visible_children(0);
    assert_eq!(visible.len(), 2);
    assert!(Arc::ptr_eq(&visible[0], &a));
    assert!(Arc::ptr_eq(&visible[1], &c));
}

#[test]
fn list_descendants_indents_the_subtree() {
    let r = Node::new("Root");
    let c = Node::new("Child");
    let g = Node::new("Grandchild");
    r.add_child(&c, 0).unwrap();
    c.add_child(&g, 0).unwrap();

    let listing = r.list_descendants();
    assert!(listing.contains("node Root"));
    assert!(listing.contains("\n  node Child"));
    assert!(listing.contains("\n    node Grandchild"));
}
