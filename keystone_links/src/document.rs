// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The document a link set update is applied to.

use alloc::vec::Vec;
use core::mem;

use keystone_scene::{Bounds3, Layer, NodeId, SceneError, Tree, World};

/// What [`UpdateLinkedGroupsHelper`](crate::UpdateLinkedGroupsHelper) needs from a document.
pub trait Document {
    /// Bounds every node of the document must stay within.
    fn world_bounds(&self) -> Bounds3;

    /// The world root of the document's tree.
    fn world(&self) -> NodeId;

    /// The document's tree.
    fn tree(&self) -> &Tree;

    /// The document's tree, for mutation.
    fn tree_mut(&mut self) -> &mut Tree;

    /// Replace the children of each listed parent with the listed detached nodes.
    ///
    /// On success, each entry holds the previous children of its parent, detached but
    /// alive, so passing the same slice in again reverts the replacement. Either every
    /// entry is replaced or, on error, none is.
    fn perform_replace_children(
        &mut self,
        replacements: &mut [(NodeId, Vec<NodeId>)],
    ) -> Result<(), SceneError> {
        let tree = self.tree_mut();
        for (parent, children) in replacements.iter() {
            tree.check_replace_children(*parent, children)?;
        }
        for (parent, children) in replacements.iter_mut() {
            let new_children = mem::take(children);
            *children = tree.replace_children(*parent, new_children)?;
        }
        tree.commit();
        Ok(())
    }
}

/// A minimal map document: one world with a default layer.
#[derive(Debug)]
pub struct MapDocument {
    tree: Tree,
    world: NodeId,
    default_layer: NodeId,
    world_bounds: Bounds3,
}

impl MapDocument {
    /// Create an empty document.
    pub fn new(world_bounds: Bounds3) -> Self {
        let (mut tree, world) = Tree::with_world(World::new("world"));
        let default_layer = match tree.insert(world, Layer::new("Default Layer")) {
            Ok(layer) => layer,
            Err(_) => unreachable!("worlds accept layers"),
        };
        tree.commit();
        Self {
            tree,
            world,
            default_layer,
            world_bounds,
        }
    }

    /// The layer new top-level nodes go into.
    pub fn default_layer(&self) -> NodeId {
        self.default_layer
    }
}

impl Default for MapDocument {
    fn default() -> Self {
        Self::new(Bounds3::DEFAULT_WORLD)
    }
}

impl Document for MapDocument {
    fn world_bounds(&self) -> Bounds3 {
        self.world_bounds
    }

    fn world(&self) -> NodeId {
        self.world
    }

    fn tree(&self) -> &Tree {
        &self.tree
    }

    fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use keystone_scene::{Entity, Group, NodeType};

    #[test]
    fn new_document_has_a_default_layer() {
        let doc = MapDocument::default();
        assert_eq!(doc.world_bounds(), Bounds3::DEFAULT_WORLD);
        assert_eq!(doc.tree().node_type(doc.world()), Some(NodeType::World));
        assert_eq!(doc.tree().children_of(doc.world()), &[doc.default_layer()]);
    }

    #[test]
    fn replacing_twice_restores_children() {
        let mut doc = MapDocument::default();
        let layer = doc.default_layer();
        let group = doc.tree_mut().insert(layer, Group::new("group")).unwrap();
        let old = doc.tree_mut().insert(group, Entity::new()).unwrap();
        let new = doc.tree_mut().insert_detached(Entity::new());

        let mut replacements = vec![(group, vec![new])];
        doc.perform_replace_children(&mut replacements).unwrap();
        assert_eq!(doc.tree().children_of(group), &[new]);
        assert_eq!(replacements, vec![(group, vec![old])]);
        assert!(doc.tree().is_alive(old));
        assert_eq!(doc.tree().parent_of(old), None);

        doc.perform_replace_children(&mut replacements).unwrap();
        assert_eq!(doc.tree().children_of(group), &[old]);
        assert_eq!(replacements, vec![(group, vec![new])]);
    }

    #[test]
    fn invalid_replacement_changes_nothing() {
        let mut doc = MapDocument::default();
        let layer = doc.default_layer();
        let a = doc.tree_mut().insert(layer, Group::new("a")).unwrap();
        let b = doc.tree_mut().insert(layer, Group::new("b")).unwrap();
        let child = doc.tree_mut().insert(a, Entity::new()).unwrap();
        let new = doc.tree_mut().insert_detached(Entity::new());

        // `child` is still attached to `a`.
        let mut replacements = vec![(a, vec![new]), (b, vec![child])];
        assert_eq!(
            doc.perform_replace_children(&mut replacements),
            Err(SceneError::NotDetached)
        );
        assert_eq!(doc.tree().children_of(a), &[child]);
        assert!(doc.tree().children_of(b).is_empty());
        assert_eq!(replacements, vec![(a, vec![new]), (b, vec![child])]);
    }
}
