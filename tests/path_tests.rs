//! Path Identity Integration Tests
//!
//! Tests for:
//! - Components: one identity per (node, parent path), reused not duplicated
//! - Generic paths: deterministic choice on ambiguous (instanced) graphs
//! - Collapse: edits that make two paths equal merge their components
//! - attach / detach / reparent and depth repair
//! - Component lifetime across buffered snapshot copies

use std::sync::Arc;

use grove::{Node, path};

// ============================================================================
// Component Identity
// ============================================================================

#[test]
fn each_instance_path_gets_its_own_component() {
    let p1 = Node::new("P1");
    let p2 = Node::new("P2");
    let c = Node::new("C");
    p1.add_child(&c, 0).unwrap();
    p2.add_child(&c, 0).unwrap();

    let p1_path = path::get_generic_component(&p1);
    let p2_path = path::get_generic_component(&p2);

    let via_p1 = path::get_component(&p1_path, &c).unwrap();
    let via_p2 = path::get_component(&p2_path, &c).unwrap();

    assert!(!Arc::ptr_eq(&via_p1, &via_p2));
    assert_eq!(via_p1.length(), 1);
    assert_eq!(via_p2.length(), 1);

    // Asking again returns the same identity, not a duplicate
    let again = path::get_component(&p1_path, &c).unwrap();
    assert!(Arc::ptr_eq(&again, &via_p1));
}

#[test]
fn get_component_refuses_unrelated_pairs() {
    let p = Node::new("P");
    let stranger = Node::new("S");
    let p_path = path::get_generic_component(&p);

    assert!(path::get_component(&p_path, &stranger).is_none());
}

#[test]
fn top_components_are_reused() {
    let n = Node::new("N");
    let a = path::get_top_component(&n);
    let b = path::get_top_component(&n);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.is_top());
    assert_eq!(a.length(), 0);
}

#[test]
fn generic_component_picks_the_first_parent_deterministically() {
    let p1 = Node::new("P1");
    let p2 = Node::new("P2");
    let c = Node::new("C");
    p1.add_child(&c, 0).unwrap();
    p2.add_child(&c, 0).unwrap();

    // Ambiguous: a warning is logged and the first parent wins
    let generic = path::get_generic_component(&c);
    let next = generic.next().unwrap();
    assert!(Arc::ptr_eq(next.node(), &p1));

    let again = path::get_generic_component(&c);
    assert!(Arc::ptr_eq(&generic, &again));
}

// ============================================================================
// Collapse on Ambiguity
// ============================================================================

/// Builds the diamond G1/G2 → P → C, which gives C two distinct path
/// components that both resolve through P.
fn diamond() -> (
    grove::NodeRef,
    grove::NodeRef,
    Arc<grove::PathComponent>,
    Arc<grove::PathComponent>,
) {
    let g1 = Node::new("G1");
    let g2 = Node::new("G2");
    let p = Node::new("P");
    let c = Node::new("C");
    g1.add_child(&p, 0).unwrap();
    g2.add_child(&p, 0).unwrap();
    p.add_child(&c, 0).unwrap();

    let g1_path = path::get_generic_component(&g1);
    let g2_path = path::get_generic_component(&g2);
    let p_via_g1 = path::get_component(&g1_path, &p).unwrap();
    let p_via_g2 = path::get_component(&g2_path, &p).unwrap();
    let c_via_g1 = path::get_component(&p_via_g1, &c).unwrap();
    let c_via_g2 = path::get_component(&p_via_g2, &c).unwrap();
    assert!(!Arc::ptr_eq(&c_via_g1, &c_via_g2));
    assert_eq!(c_via_g1.length(), 2);
    assert_eq!(c_via_g2.length(), 2);

    // keep G1/G2 alive through the parent components they anchor
    (p, c, c_via_g1, c_via_g2)
}

#[test]
fn detach_collapses_now_equal_components() {
    let (p, c, c_via_g1, c_via_g2) = diamond();

    path::detach(&c_via_g1);

    assert!(c_via_g1.is_top());
    assert_eq!(c_via_g1.length(), 0);
    // The other component named the same (now severed) relationship and was
    // merged into the survivor; external holders follow the forwarding link.
    assert!(c_via_g2.is_collapsed());
    assert!(Arc::ptr_eq(&c_via_g2.resolve(), &c_via_g1));

    // No duplicate components remain on C, and the edge pair is gone
    let live = c.snapshot(0).live_chains();
    assert_eq!(live.len(), 1);
    assert!(Arc::ptr_eq(&live[0], &c_via_g1));
    assert_eq!(c.num_parents(), 0);
    assert_eq!(p.num_children(), 0);
}

#[test]
fn remove_child_collapses_and_promotes_one_top() {
    let (p, c, c_via_g1, c_via_g2) = diamond();

    assert!(p.remove_child(&c));

    let live = c.snapshot(0).live_chains();
    assert_eq!(live.len(), 1);
    assert!(live[0].is_top());
    // Exactly one of the two became top, the other forwards to it
    let survivor = c_via_g1.resolve();
    assert!(Arc::ptr_eq(&survivor, &c_via_g2.resolve()));
    assert!(survivor.is_top());
}

// ============================================================================
// attach / detach / reparent
// ============================================================================

#[test]
fn attach_wires_the_edge_and_returns_the_component() {
    let r = Node::new("R");
    let n = Node::new("N");
    let r_path = path::get_generic_component(&r);

    let comp = path::attach(&r_path, &n, 0).unwrap();

    assert_eq!(r.find_child(&n), Some(0));
    assert!(n.has_parent(&r));
    assert_eq!(comp.length(), 1);
    assert!(Arc::ptr_eq(&comp.next().unwrap(), &r_path));
}

#[test]
fn attach_of_an_existing_child_repositions_it() {
    let r = Node::new("R");
    let a = Node::new("A");
    let b = Node::new("B");
    let r_path = path::get_generic_component(&r);
    let comp_a = path::attach(&r_path, &a, 0).unwrap();
    path::attach(&r_path, &b, 5).unwrap();

    let comp_again = path::attach(&r_path, &a, 10).unwrap();

    assert!(Arc::ptr_eq(&comp_a, &comp_again));
    assert_eq!(r.num_children(), 2);
    let names: Vec<String> = r.children().iter().map(|n| n.name().to_string()).collect();
    assert_eq!(names, ["B", "A"]);
}

#[test]
fn reparent_moves_the_component_and_repairs_depths() {
    let r1 = Node::new("R1");
    let r2 = Node::new("R2");
    let mid = Node::new("Mid");
    let n = Node::new("N");
    let m = Node::new("M");

    let r1_path = path::get_generic_component(&r1);
    let n_comp = path::attach(&r1_path, &n, 0).unwrap();
    let m_comp = path::attach(&n_comp, &m, 0).unwrap();
    assert_eq!(n_comp.length(), 1);
    assert_eq!(m_comp.length(), 2);

    // Move N under R2 → Mid; every depth through N shifts by one
    let r2_path = path::get_generic_component(&r2);
    let mid_comp = path::attach(&r2_path, &mid, 0).unwrap();
    path::reparent(&mid_comp, &n_comp, 0).unwrap();

    assert!(!n.has_parent(&r1));
    assert!(n.has_parent(&mid));
    assert_eq!(n_comp.length(), 2);
    assert_eq!(m_comp.length(), 3);
}

#[test]
fn reparent_under_a_descendant_is_refused() {
    let r = Node::new("R");
    let n = Node::new("N");
    let m = Node::new("M");
    let r_path = path::get_generic_component(&r);
    let n_comp = path::attach(&r_path, &n, 0).unwrap();
    let m_comp = path::attach(&n_comp, &m, 0).unwrap();

    assert!(path::reparent(&m_comp, &n_comp, 0).is_err());
    // Nothing moved
    assert!(n.has_parent(&r));
    assert!(m.has_parent(&n));
}

#[test]
fn adding_a_parent_anchors_rootless_instances() {
    let c = Node::new("C");
    let top = path::get_top_component(&c);
    assert!(top.is_top());

    let p = Node::new("P");
    p.add_child(&c, 0).unwrap();

    // The previously rootless path is now anchored through P
    assert!(!top.is_top());
    assert!(Arc::ptr_eq(top.next().unwrap().node(), &p));
    assert_eq!(top.length(), 1);
}

// ============================================================================
// Component Lifetime
// ============================================================================

#[test]
fn dropping_the_last_handle_unregisters_the_component() {
    let p = Node::new("P");
    let c = Node::new("C");
    p.add_child(&c, 0).unwrap();

    let p_path = path::get_generic_component(&p);
    let comp = path::get_component(&p_path, &c).unwrap();
    assert_eq!(c.snapshot(0).live_chains().len(), 1);

    drop(comp);
    assert!(c.snapshot(0).live_chains().is_empty());
}

#[test]
fn unregistration_reaches_every_buffered_copy() {
    let p = Node::new("P");
    let c = Node::new("C");
    p.add_child(&c, 0).unwrap();

    let p_path = path::get_generic_component(&p);
    let comp = path::get_component(&p_path, &c).unwrap();

    // Diverge the app stage from the cull stage, then let the handle go;
    // the component must disappear from both divergent copies of the set.
    c.cycle();
    c.set_state(grove::RenderState::new(grove::StateFlags::TWO_SIDED, 0));
    assert_eq!(c.snapshot(0).live_chains().len(), 1);
    assert_eq!(c.snapshot(1).live_chains().len(), 1);

    drop(comp);
    assert!(c.snapshot(0).live_chains().is_empty());
    assert!(c.snapshot(1).live_chains().is_empty());
}
