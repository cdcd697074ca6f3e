// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link set discovery.

use alloc::vec::Vec;

use keystone_scene::{Group, NodeId, NodeKind, SceneError, Tree};

use crate::error::LinkError;

/// Every group below `roots` (inclusive) whose linked group id is `linked_group_id`.
///
/// Groups are returned in document order. Search descends through worlds, layers, and
/// groups; members of a link set nested inside other members are found as well.
pub fn find_linked_groups(tree: &Tree, roots: &[NodeId], linked_group_id: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    visit_groups(tree, roots, |id, group| {
        if group.linked_group_id() == Some(linked_group_id) {
            out.push(id);
        }
    });
    out
}

/// Every group below `roots` (inclusive) that belongs to any link set, in document order.
pub fn find_all_linked_groups(tree: &Tree, roots: &[NodeId]) -> Vec<NodeId> {
    let mut out = Vec::new();
    visit_groups(tree, roots, |id, group| {
        if group.linked_group_id().is_some() {
            out.push(id);
        }
    });
    out
}

/// Make `group` a member of the link set `linked_group_id`.
pub fn set_linked_group_id(
    tree: &mut Tree,
    group: NodeId,
    linked_group_id: &str,
) -> Result<(), LinkError> {
    tree.update_group(group, |g| g.set_linked_group_id(linked_group_id))?;
    Ok(())
}

/// The group payload of `id`, or the reason it has none.
pub(crate) fn require_group(tree: &Tree, id: NodeId) -> Result<&Group, LinkError> {
    match tree.kind(id) {
        Some(NodeKind::Group(group)) => Ok(group),
        Some(_) => Err(SceneError::NotAGroup.into()),
        None => Err(SceneError::StaleNode.into()),
    }
}

fn visit_groups(tree: &Tree, roots: &[NodeId], mut f: impl FnMut(NodeId, &Group)) {
    let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        match tree.kind(id) {
            Some(NodeKind::World(_) | NodeKind::Layer(_)) => {}
            Some(NodeKind::Group(group)) => f(id, group),
            Some(NodeKind::Entity(_) | NodeKind::Brush(_) | NodeKind::Patch(_)) | None => {
                continue;
            }
        }
        stack.extend(tree.children_of(id).iter().rev().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use keystone_scene::{Entity, Layer, World};

    #[test]
    fn finds_members_in_document_order() {
        let (mut tree, world) = Tree::with_world(World::new("world"));
        let layer = tree.insert(world, Layer::new("default")).unwrap();
        let other_layer = tree.insert(world, Layer::new("other")).unwrap();

        let a = tree.insert(layer, Group::new("a")).unwrap();
        let plain = tree.insert(layer, Group::new("plain")).unwrap();
        let b = tree.insert(plain, Group::new("b")).unwrap();
        let c = tree.insert(other_layer, Group::new("c")).unwrap();
        let nested = tree.insert(c, Group::new("nested")).unwrap();
        tree.insert(layer, Entity::new()).unwrap();

        for group in [a, b, c] {
            set_linked_group_id(&mut tree, group, "x").unwrap();
        }
        set_linked_group_id(&mut tree, nested, "y").unwrap();

        assert_eq!(find_linked_groups(&tree, &[world], "x"), vec![a, b, c]);
        assert_eq!(find_linked_groups(&tree, &[other_layer], "x"), vec![c]);
        assert_eq!(find_linked_groups(&tree, &[world], "y"), vec![nested]);
        assert!(find_linked_groups(&tree, &[world], "z").is_empty());
        assert_eq!(find_all_linked_groups(&tree, &[world]), vec![a, b, c, nested]);
    }

    #[test]
    fn linking_requires_a_group() {
        let (mut tree, world) = Tree::with_world(World::new("world"));
        assert_eq!(
            set_linked_group_id(&mut tree, world, "x"),
            Err(LinkError::Scene(SceneError::NotAGroup))
        );
    }
}
