use std::collections::HashMap;

use proptest::prelude::*;

use object_tree::{
    ComponentRecord, HierarchyView, NodeRecord, ObjectTree, Snapshot, TreeNode, reconcile,
};

// --- Generators ---

/// A random forest: entry `i` names its parent among `0..i`, or none.
fn arb_parents() -> impl Strategy<Value = Vec<Option<usize>>> {
    prop::collection::vec(any::<Option<prop::sample::Index>>(), 0..40).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, pick)| match pick {
                Some(idx) if i > 0 => Some(idx.index(i)),
                _ => None,
            })
            .collect()
    })
}

/// Build a valid snapshot from a parent list. Node `i` has id `id-i` and a
/// name that is a prefix of its later siblings' names, which exercises the
/// "starts with but is not a child" rule.
fn snapshot_from(parents: &[Option<usize>]) -> Snapshot {
    let mut paths: Vec<String> = Vec::with_capacity(parents.len());
    for (i, parent) in parents.iter().enumerate() {
        let segment = format!("n{}", "x".repeat(i % 3)) + &i.to_string();
        let path = match parent {
            Some(p) => format!("{}/{}", paths[*p], segment),
            None => format!("/{segment}"),
        };
        paths.push(path);
    }

    let mut snapshot = Snapshot::default();
    for (i, path) in paths.iter().enumerate() {
        let id = format!("id-{i}");
        snapshot.hierarchy.push(path.clone());
        snapshot.node_paths.insert(path.clone(), id.clone());
        snapshot.nodes.insert(
            id,
            NodeRecord {
                name: format!("Node {i}"),
                components: vec![ComponentRecord {
                    name: "Tag".into(),
                    related: vec![format!("id-{}", i / 2)],
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
    }
    snapshot
}

fn expected_children<'a>(snapshot: &'a Snapshot, parent: &str) -> Vec<&'a str> {
    let prefix = format!("{parent}/");
    snapshot
        .hierarchy
        .iter()
        .filter(|q| {
            q.strip_prefix(prefix.as_str())
                .is_some_and(|rest| !rest.contains('/'))
        })
        .map(String::as_str)
        .collect()
}

fn paths_of(nodes: &[TreeNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.abs_path.as_str()).collect()
}

// --- Structure ---

proptest! {
    #[test]
    fn every_node_has_exactly_its_direct_children(parents in arb_parents()) {
        let snapshot = snapshot_from(&parents);
        let tree = reconcile(&snapshot, &ObjectTree::empty()).unwrap();
        prop_assert_eq!(tree.len(), snapshot.hierarchy.len());
        for path in &snapshot.hierarchy {
            let node = tree.find_path(path).unwrap();
            prop_assert_eq!(paths_of(&node.children), expected_children(&snapshot, path));
        }
    }

    #[test]
    fn roots_are_depth_one_paths_in_order(parents in arb_parents()) {
        let snapshot = snapshot_from(&parents);
        let tree = reconcile(&snapshot, &ObjectTree::empty()).unwrap();
        let expected: Vec<&str> = snapshot
            .hierarchy
            .iter()
            .filter(|p| p.rfind('/') == Some(0))
            .map(String::as_str)
            .collect();
        prop_assert_eq!(paths_of(tree.roots()), expected);
    }

    #[test]
    fn reconcile_against_own_output_is_stable(parents in arb_parents(), collapse in any::<prop::sample::Index>()) {
        let snapshot = snapshot_from(&parents);
        let mut first = reconcile(&snapshot, &ObjectTree::empty()).unwrap();
        if !snapshot.hierarchy.is_empty() {
            let id = format!("id-{}", collapse.index(snapshot.hierarchy.len()));
            first.set_expanded(&id, false);
            first.select(&id);
        }
        let second = reconcile(&snapshot, &first).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn view_state_survives_reorganization(parents in arb_parents(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!parents.is_empty());
        let before = snapshot_from(&parents);
        let mut previous = reconcile(&before, &ObjectTree::empty()).unwrap();
        let id = format!("id-{}", pick.index(parents.len()));
        previous.set_expanded(&id, false);
        previous.select(&id);

        // Flatten everything to the top level: every path changes depth.
        let flat = snapshot_from(&vec![None; parents.len()]);
        let tree = reconcile(&flat, &previous).unwrap();
        let node = tree.find(&id).unwrap();
        prop_assert!(!node.expanded);
        prop_assert!(node.selected);
        for other in tree.iter().filter(|n| n.id != id) {
            prop_assert!(other.expanded);
            prop_assert!(!other.selected);
        }
    }
}

// --- Rejection leaves nothing half-built ---

proptest! {
    #[test]
    fn dangling_id_always_rejected(parents in arb_parents(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!parents.is_empty());
        let mut snapshot = snapshot_from(&parents);
        let victim = format!("id-{}", pick.index(parents.len()));
        snapshot.nodes.remove(&victim);
        prop_assert!(reconcile(&snapshot, &ObjectTree::empty()).is_err());
    }
}

#[test]
fn component_related_lists_merge() {
    let mut snapshot = snapshot_from(&[None]);
    let record = snapshot.nodes.get_mut("id-0").unwrap();
    record.components = vec![
        ComponentRecord {
            related: vec!["a".into(), "b".into()],
            ..Default::default()
        },
        ComponentRecord {
            related: vec!["b".into(), "c".into()],
            ..Default::default()
        },
    ];
    let tree = reconcile(&snapshot, &ObjectTree::empty()).unwrap();
    let related: HashMap<&str, ()> = tree.roots()[0]
        .related_components
        .iter()
        .map(|id| (id.as_str(), ()))
        .collect();
    assert_eq!(related.len(), 3);
    assert!(["a", "b", "c"].iter().all(|id| related.contains_key(id)));
}
