// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: structure, contents, bounds, queries.

use alloc::{vec, vec::Vec};
use core::mem;

use glam::{DMat4, DVec3};
use smallvec::SmallVec;

use crate::contents::{Brush, Entity, Group, NodeContents, NodeKind, NodeType, Patch, World};
use crate::error::SceneError;
use crate::subtree::Subtree;
use crate::types::{Bounds3, EditState, NodeFlags, NodeId};

/// Linked group ids along a path or within a subtree.
type LinkIds<'a> = SmallVec<[&'a str; 4]>;

/// The scene tree of a map.
///
/// Nodes live in an arena and are addressed by generational [`NodeId`]s. Every node
/// owns its ordered list of children; the parent link is only used for upward
/// queries. A node without a parent is a root: the world, or a *detached* subtree
/// that is kept alive (for example to restore it on undo) until it is attached again
/// or removed with [`Tree::remove`].
///
/// Logical bounds are cached per node. Structural and content changes mark the node
/// and its ancestors dirty; [`Tree::commit`] recomputes the cached bounds.
///
/// ## Example
///
/// ```rust
/// use keystone_scene::{Bounds3, Brush, Group, Layer, Tree, World};
///
/// let (mut tree, world) = Tree::with_world(World::new("world"));
/// let layer = tree.insert(world, Layer::new("default")).unwrap();
/// let group = tree.insert(layer, Group::new("crates")).unwrap();
/// tree.insert(group, Brush::cuboid(Bounds3::symmetric(16.0), "crate")).unwrap();
///
/// tree.commit();
/// assert_eq!(tree.logical_bounds(group), Some(Bounds3::symmetric(16.0)));
/// ```
pub struct Tree {
    /// slots
    nodes: Vec<Option<Node>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl core::fmt::Debug for Tree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.node_count();
        let free = self.free_list.len();
        f.debug_struct("Tree")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &free)
            .finish_non_exhaustive()
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Filters applied to point queries.
///
/// Used by [`Tree::nodes_containing`] to restrict which nodes are reported.
#[derive(Clone, Copy, Debug)]
pub struct QueryFilter {
    /// Bitfield of required node flags. Only nodes containing all these flags will be included.
    pub required_flags: NodeFlags,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            required_flags: NodeFlags::empty(),
        }
    }
}

impl QueryFilter {
    /// Create a new empty filter (includes all nodes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter to only visible nodes.
    pub fn visible(mut self) -> Self {
        self.required_flags |= NodeFlags::VISIBLE;
        self
    }

    /// Filter to only editable nodes.
    pub fn editable(mut self) -> Self {
        self.required_flags |= NodeFlags::EDITABLE;
        self
    }

    /// Check if a node's flags satisfy this filter.
    pub fn matches(&self, node_flags: NodeFlags) -> bool {
        node_flags.contains(self.required_flags)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    flags: NodeFlags,
    edit_state: EditState,
    persistent_id: Option<u64>,
    pending_changes: bool,
    logical_bounds: Bounds3,
    dirty: bool,
}

impl Node {
    fn new(generation: u32, kind: NodeKind) -> Self {
        Self {
            generation,
            parent: None,
            children: Vec::new(),
            kind,
            flags: NodeFlags::default(),
            edit_state: EditState::default(),
            persistent_id: None,
            pending_changes: false,
            logical_bounds: Bounds3::ZERO,
            dirty: true,
        }
    }
}

impl Tree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Create a tree whose only node is a world root.
    pub fn with_world(world: World) -> (Self, NodeId) {
        let mut tree = Self::new();
        let root = tree.allocate(NodeKind::World(world));
        (tree, root)
    }

    fn allocate(&mut self, kind: NodeKind) -> NodeId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, kind));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(Node::new(generation, kind)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        NodeId::new(idx, generation)
    }

    /// Insert a node without a parent.
    ///
    /// The node stays alive until it is attached somewhere or removed.
    pub fn insert_detached(&mut self, kind: impl Into<NodeKind>) -> NodeId {
        self.allocate(kind.into())
    }

    /// Insert a new node as the last child of `parent`.
    pub fn insert(
        &mut self,
        parent: NodeId,
        kind: impl Into<NodeKind>,
    ) -> Result<NodeId, SceneError> {
        let kind = kind.into();
        let parent_type = self.node_type(parent).ok_or(SceneError::StaleNode)?;
        let child_type = kind.node_type();
        if !parent_type.accepts(child_type) {
            return Err(SceneError::CannotAddChild {
                parent: parent_type,
                child: child_type,
            });
        }
        if let Some(linked_group_id) = kind.as_group().and_then(Group::linked_group_id)
            && self.chain_link_ids(parent).contains(&linked_group_id)
        {
            return Err(SceneError::RecursiveLinkedGroup);
        }
        let id = self.allocate(kind);
        self.link_parent(id, parent);
        self.invalidate(parent);
        Ok(id)
    }

    /// Check whether the live node `child` (with its subtree) may become a child of `parent`.
    ///
    /// This does not check whether `child` is currently detached.
    pub fn check_add_child(&self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        let parent_type = self.node_type(parent).ok_or(SceneError::StaleNode)?;
        let child_type = self.node_type(child).ok_or(SceneError::StaleNode)?;
        if !parent_type.accepts(child_type) {
            return Err(SceneError::CannotAddChild {
                parent: parent_type,
                child: child_type,
            });
        }
        if child == parent || self.is_ancestor_of(child, parent) {
            return Err(SceneError::CyclicParent);
        }
        let chain = self.chain_link_ids(parent);
        if !chain.is_empty()
            && self
                .subtree_link_ids(child)
                .iter()
                .any(|id| chain.contains(id))
        {
            return Err(SceneError::RecursiveLinkedGroup);
        }
        Ok(())
    }

    /// Whether `child` may become a child of `parent`. See [`Tree::check_add_child`].
    pub fn can_add_child(&self, parent: NodeId, child: NodeId) -> bool {
        self.check_add_child(parent, child).is_ok()
    }

    /// Whether `child` is a live child of `parent` that may be removed.
    pub fn can_remove_child(&self, parent: NodeId, child: NodeId) -> bool {
        self.is_alive(parent) && self.parent_of(child) == Some(parent)
    }

    /// Attach a detached node as the last child of `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.check_add_child(parent, child)?;
        if self.node(child).parent.is_some() {
            return Err(SceneError::NotDetached);
        }
        self.link_parent(child, parent);
        self.invalidate(parent);
        Ok(())
    }

    /// Unlink a node from its parent, keeping it and its subtree alive.
    ///
    /// Detaching a root is a no-op.
    pub fn detach(&mut self, id: NodeId) -> Result<(), SceneError> {
        if !self.is_alive(id) {
            return Err(SceneError::StaleNode);
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
            self.invalidate(parent);
        }
        Ok(())
    }

    /// Remove a node (and its subtree) from the tree.
    ///
    /// All identifiers in the subtree become stale immediately.
    pub fn remove(&mut self, id: NodeId) {
        if !self.is_alive(id) {
            return;
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
            self.invalidate(parent);
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.nodes[n.idx()].take() {
                stack.extend(node.children);
                self.free_list.push(n.idx());
            }
        }
    }

    /// Check whether [`Tree::replace_children`] would succeed.
    pub fn check_replace_children(
        &self,
        parent: NodeId,
        children: &[NodeId],
    ) -> Result<(), SceneError> {
        let parent_type = self.node_type(parent).ok_or(SceneError::StaleNode)?;
        let chain = self.chain_link_ids(parent);
        for (i, &child) in children.iter().enumerate() {
            let child_type = self.node_type(child).ok_or(SceneError::StaleNode)?;
            if !parent_type.accepts(child_type) {
                return Err(SceneError::CannotAddChild {
                    parent: parent_type,
                    child: child_type,
                });
            }
            if self.node(child).parent.is_some() || children[..i].contains(&child) {
                return Err(SceneError::NotDetached);
            }
            if child == parent || self.is_ancestor_of(child, parent) {
                return Err(SceneError::CyclicParent);
            }
            if !chain.is_empty()
                && self
                    .subtree_link_ids(child)
                    .iter()
                    .any(|id| chain.contains(id))
            {
                return Err(SceneError::RecursiveLinkedGroup);
            }
        }
        Ok(())
    }

    /// Replace all children of `parent` with the given detached nodes.
    ///
    /// The previous children are detached (not removed) and returned in order, so
    /// passing them back in restores the original structure.
    pub fn replace_children(
        &mut self,
        parent: NodeId,
        children: Vec<NodeId>,
    ) -> Result<Vec<NodeId>, SceneError> {
        self.check_replace_children(parent, &children)?;
        for &child in &children {
            self.node_mut(child).parent = Some(parent);
        }
        let old = mem::replace(&mut self.node_mut(parent).children, children);
        for &child in &old {
            self.node_mut(child).parent = None;
        }
        self.invalidate(parent);
        Ok(old)
    }

    /// Swap the contents of a node, returning the previous contents.
    ///
    /// The new contents must be of the same type as the node.
    pub fn set_contents(
        &mut self,
        id: NodeId,
        contents: NodeContents,
    ) -> Result<NodeContents, SceneError> {
        let node = self.node_opt_mut(id).ok_or(SceneError::StaleNode)?;
        let node_type = node.kind.node_type();
        if node_type != contents.node_type() {
            return Err(SceneError::ContentKindMismatch {
                node: node_type,
                contents: contents.node_type(),
            });
        }
        let old = mem::replace(&mut node.kind, contents.into());
        self.invalidate(id);
        match old.into_contents() {
            Some(old) => Ok(old),
            None => unreachable!("node type matched transferable contents"),
        }
    }

    /// Payload of a live node.
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node_opt(id).map(|n| &n.kind)
    }

    /// Type of a live node.
    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.kind(id).map(NodeKind::node_type)
    }

    /// Contents of a live node, cloned; `None` for worlds and layers.
    pub fn contents(&self, id: NodeId) -> Option<NodeContents> {
        self.kind(id)?.to_contents()
    }

    /// The group payload of a live group node.
    pub fn group(&self, id: NodeId) -> Option<&Group> {
        self.kind(id)?.as_group()
    }

    /// The entity payload of a live entity node.
    pub fn entity(&self, id: NodeId) -> Option<&Entity> {
        self.kind(id)?.as_entity()
    }

    /// The brush payload of a live brush node.
    pub fn brush(&self, id: NodeId) -> Option<&Brush> {
        self.kind(id)?.as_brush()
    }

    /// The patch payload of a live patch node.
    pub fn patch(&self, id: NodeId) -> Option<&Patch> {
        self.kind(id)?.as_patch()
    }

    /// Mutate a group in place.
    pub fn update_group<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut Group) -> R,
    ) -> Result<R, SceneError> {
        let node = self.node_opt_mut(id).ok_or(SceneError::StaleNode)?;
        let NodeKind::Group(group) = &mut node.kind else {
            return Err(SceneError::NotAGroup);
        };
        Ok(f(group))
    }

    /// Mutate an entity in place. The entity's bounds are recomputed on the next commit.
    pub fn update_entity<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut Entity) -> R,
    ) -> Result<R, SceneError> {
        let node = self.node_opt_mut(id).ok_or(SceneError::StaleNode)?;
        let NodeKind::Entity(entity) = &mut node.kind else {
            return Err(SceneError::NotAnEntity);
        };
        let result = f(entity);
        self.invalidate(id);
        Ok(result)
    }

    /// Clone a node and its descendants into an owned [`Subtree`].
    ///
    /// Returns `None` for stale ids and for worlds and layers.
    pub fn clone_subtree(&self, id: NodeId) -> Option<Subtree> {
        let contents = self.node_opt(id)?.kind.to_contents()?;
        Some(Subtree {
            contents,
            children: self.clone_children(id),
        })
    }

    /// Clone every child of a node into owned subtrees.
    pub fn clone_children(&self, id: NodeId) -> Vec<Subtree> {
        self.children_of(id)
            .iter()
            .filter_map(|&child| self.clone_subtree(child))
            .collect()
    }

    /// Create arena nodes for an owned subtree without attaching it anywhere.
    pub fn insert_subtree_detached(&mut self, subtree: Subtree) -> Result<NodeId, SceneError> {
        subtree.validate()?;
        if !links_are_acyclic(&subtree) {
            return Err(SceneError::RecursiveLinkedGroup);
        }
        Ok(self.build_subtree(subtree))
    }

    /// Create arena nodes for an owned subtree and attach it as the last child of `parent`.
    pub fn insert_subtree(
        &mut self,
        parent: NodeId,
        subtree: Subtree,
    ) -> Result<NodeId, SceneError> {
        let id = self.insert_subtree_detached(subtree)?;
        if let Err(err) = self.attach(parent, id) {
            self.remove(id);
            return Err(err);
        }
        Ok(id)
    }

    fn build_subtree(&mut self, subtree: Subtree) -> NodeId {
        let Subtree { contents, children } = subtree;
        let root = self.allocate(contents.into());
        let mut stack = vec![(root, children)];
        while let Some((parent, children)) = stack.pop() {
            // Siblings are linked in order; only their own children are deferred.
            for Subtree { contents, children } in children {
                let id = self.allocate(contents.into());
                self.link_parent(id, parent);
                if !children.is_empty() {
                    stack.push((id, children));
                }
            }
        }
        root
    }

    /// Apply `transformation` to a node and all of its descendants.
    ///
    /// Either every node is transformed or, if any brush fails, none is.
    pub fn transform_subtree(
        &mut self,
        id: NodeId,
        transformation: &DMat4,
        world_bounds: &Bounds3,
    ) -> Result<(), SceneError> {
        if !self.is_alive(id) {
            return Err(SceneError::StaleNode);
        }
        let mut ids = vec![id];
        ids.extend(self.descendants(id));

        let mut transformed = Vec::with_capacity(ids.len());
        for &node in &ids {
            if let Some(mut contents) = self.node(node).kind.to_contents() {
                if let Err(err) = contents.transform(world_bounds, transformation) {
                    log::debug!("transforming {node:?} below {id:?} failed: {err}");
                    return Err(err);
                }
                transformed.push((node, contents));
            }
        }
        for (node, contents) in transformed {
            self.node_mut(node).kind = contents.into();
            self.invalidate(node);
        }
        Ok(())
    }

    /// Returns true if `id` refers to a live node.
    ///
    /// A `NodeId` is considered live if its slot exists and its generation matches
    /// the current generation stored in that slot.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node_opt(id).is_some()
    }

    /// Number of live nodes, attached or detached.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Returns the parent of a node if live, or `None` for roots or stale ids.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node_opt(id).and_then(|node| node.parent)
    }

    /// Get the children of a node, or empty slice if node is stale.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        match self.node_opt(id) {
            Some(node) => &node.children,
            None => &[],
        }
    }

    /// Iterate the ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        core::iter::successors(self.parent_of(id), move |&p| self.parent_of(p))
    }

    /// Whether `ancestor` is a strict ancestor of `node`.
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|a| a == ancestor)
    }

    /// Whether `node` is a strict descendant of `ancestor`.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        self.is_ancestor_of(ancestor, node)
    }

    /// The nearest layer above a node.
    pub fn containing_layer(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&a| self.node_type(a) == Some(NodeType::Layer))
    }

    /// The nearest group above a node.
    pub fn containing_group(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&a| self.node_type(a) == Some(NodeType::Group))
    }

    /// All descendants of a node in pre-order, excluding the node itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children_of(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.node(node).children.iter().rev().copied());
        }
        out
    }

    /// Get the next node in depth-first traversal order.
    ///
    /// Returns `None` if no next node exists or if the current node is stale.
    /// This is a standard tree traversal that does not wrap around.
    pub fn next_depth_first(&self, current: NodeId) -> Option<NodeId> {
        if !self.is_alive(current) {
            return None;
        }

        self.next_in_order(current)
    }

    /// Get the previous node in reverse depth-first traversal order.
    ///
    /// Returns `None` if no previous node exists or if the current node is stale.
    pub fn prev_depth_first(&self, current: NodeId) -> Option<NodeId> {
        if !self.is_alive(current) {
            return None;
        }

        self.prev_in_order(current)
    }

    /// Returns the flags of a node if the identifier is live.
    pub fn flags(&self, id: NodeId) -> Option<NodeFlags> {
        self.node_opt(id).map(|node| node.flags)
    }

    /// Update node flags.
    pub fn set_flags(&mut self, id: NodeId, flags: NodeFlags) {
        if let Some(n) = self.node_opt_mut(id) {
            n.flags = flags;
        }
    }

    /// Edit state of a live group.
    pub fn edit_state(&self, id: NodeId) -> Option<EditState> {
        self.node_opt(id)
            .filter(|n| n.kind.node_type() == NodeType::Group)
            .map(|n| n.edit_state)
    }

    /// Open a group for editing; its ancestor groups become [`EditState::DescendantOpen`].
    pub fn open_group(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.require_group(id)?;
        self.node_mut(id).edit_state = EditState::Open;
        self.set_ancestor_edit_states(id, EditState::DescendantOpen);
        Ok(())
    }

    /// Close a group; its ancestor groups are closed as well.
    pub fn close_group(&mut self, id: NodeId) -> Result<(), SceneError> {
        self.require_group(id)?;
        self.node_mut(id).edit_state = EditState::Closed;
        self.set_ancestor_edit_states(id, EditState::Closed);
        Ok(())
    }

    fn set_ancestor_edit_states(&mut self, id: NodeId, state: EditState) {
        let groups: SmallVec<[NodeId; 8]> = self
            .ancestors(id)
            .filter(|&a| self.node_type(a) == Some(NodeType::Group))
            .collect();
        for group in groups {
            self.node_mut(group).edit_state = state;
        }
    }

    /// Persistent id of a group, used by map serialization to refer to it.
    pub fn persistent_id(&self, id: NodeId) -> Option<u64> {
        self.node_opt(id).and_then(|n| n.persistent_id)
    }

    /// Set or clear the persistent id of a group.
    pub fn set_persistent_id(
        &mut self,
        id: NodeId,
        persistent_id: Option<u64>,
    ) -> Result<(), SceneError> {
        self.require_group(id)?;
        self.node_mut(id).persistent_id = persistent_id;
        Ok(())
    }

    /// Whether a group has edits that were not yet propagated to its link set.
    pub fn has_pending_changes(&self, id: NodeId) -> bool {
        self.node_opt(id).is_some_and(|n| n.pending_changes)
    }

    /// Mark or clear pending changes of a group.
    pub fn set_has_pending_changes(
        &mut self,
        id: NodeId,
        pending: bool,
    ) -> Result<(), SceneError> {
        self.require_group(id)?;
        self.node_mut(id).pending_changes = pending;
        Ok(())
    }

    /// Recompute the logical bounds of every dirty node.
    ///
    /// Both attached and detached roots are updated. Call this after structural or
    /// content changes before issuing [`Tree::nodes_containing`] queries.
    pub fn commit(&mut self) {
        let roots: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                Some(n) if n.parent.is_none() && n.dirty =>
                {
                    #[allow(
                        clippy::cast_possible_truncation,
                        reason = "NodeId uses 32-bit indices by design."
                    )]
                    Some(NodeId::new(i as u32, n.generation))
                }
                _ => None,
            })
            .collect();

        let mut updated = 0;
        for root in roots {
            updated += self.update_bounds(root);
        }
        log::trace!("commit: recomputed bounds of {updated} nodes");
    }

    /// Logical bounds of a node.
    ///
    /// Returns the cached value for clean nodes and computes it on the fly for dirty ones.
    pub fn logical_bounds(&self, id: NodeId) -> Option<Bounds3> {
        let node = self.node_opt(id)?;
        if !node.dirty {
            return Some(node.logical_bounds);
        }
        let children = Bounds3::union_all(
            node.children
                .iter()
                .filter_map(|&child| self.logical_bounds(child)),
        );
        Some(node.kind.logical_bounds(children))
    }

    /// Every node in the subtree of `root` whose committed bounds contain `point`.
    ///
    /// Nodes are reported in pre-order and must satisfy the [`QueryFilter`]. The
    /// bounds are those of the last [`Tree::commit`].
    pub fn nodes_containing(&self, root: NodeId, point: DVec3, filter: QueryFilter) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.is_alive(root) {
            return out;
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            // Parent bounds enclose their children.
            if !node.logical_bounds.contains_point(point) {
                continue;
            }
            if filter.matches(node.flags) {
                out.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }
}

impl Tree {
    // --- internals ---

    /// Access a node; panics if `id` is stale.
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.idx()].as_ref().expect("dangling NodeId")
    }

    /// Access a node mutably; panics if `id` is stale.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.idx()].as_mut().expect("dangling NodeId")
    }

    fn node_opt(&self, id: NodeId) -> Option<&Node> {
        let n = self.nodes.get(id.idx())?.as_ref()?;
        (n.generation == id.1).then_some(n)
    }

    fn node_opt_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    fn require_group(&self, id: NodeId) -> Result<(), SceneError> {
        match self.node_type(id) {
            None => Err(SceneError::StaleNode),
            Some(NodeType::Group) => Ok(()),
            Some(_) => Err(SceneError::NotAGroup),
        }
    }

    /// Linked group ids of `id` and all of its ancestors.
    fn chain_link_ids(&self, id: NodeId) -> LinkIds<'_> {
        core::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.node(n).kind.as_group().and_then(Group::linked_group_id))
            .collect()
    }

    /// Linked group ids of every group in the subtree of `id`.
    fn subtree_link_ids(&self, id: NodeId) -> LinkIds<'_> {
        let mut ids = LinkIds::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let node = self.node(n);
            if let Some(linked_group_id) = node.kind.as_group().and_then(Group::linked_group_id) {
                ids.push(linked_group_id);
            }
            stack.extend(node.children.iter().copied());
        }
        ids
    }

    /// Mark a node and its ancestors as needing a bounds update.
    fn invalidate(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.node_mut(n);
            node.dirty = true;
            current = node.parent;
        }
    }

    /// Returns the number of nodes whose bounds were recomputed.
    fn update_bounds(&mut self, root: NodeId) -> usize {
        let mut updated = 0;
        // Post-order: a node is finished once all of its children are.
        // Clean nodes have clean subtrees and are skipped.
        let mut stack = vec![(root, false)];
        while let Some((id, children_done)) = stack.pop() {
            if !children_done {
                let node = self.node(id);
                if !node.dirty {
                    continue;
                }
                stack.push((id, true));
                for &child in node.children.iter().rev() {
                    stack.push((child, false));
                }
                continue;
            }

            let children = Bounds3::union_all(
                self.node(id)
                    .children
                    .iter()
                    .map(|&child| self.node(child).logical_bounds),
            );
            let node = self.node_mut(id);
            node.logical_bounds = node.kind.logical_bounds(children);
            node.dirty = false;
            updated += 1;
        }
        updated
    }

    fn next_in_order(&self, current: NodeId) -> Option<NodeId> {
        let children = &self.node(current).children;
        if let Some(&first_child) = children.first()
            && self.is_alive(first_child)
        {
            return Some(first_child);
        }

        let mut node = current;
        while let Some(parent) = self.parent_of(node) {
            if let Some(next_sibling) = self.next_sibling(node) {
                return Some(next_sibling);
            }
            node = parent;
        }
        None
    }

    fn prev_in_order(&self, current: NodeId) -> Option<NodeId> {
        if let Some(prev_sibling) = self.prev_sibling(current) {
            return Some(self.last_in_subtree(prev_sibling));
        }

        self.parent_of(current)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent_of(node)?;
        let siblings = &self.node(parent).children;
        let pos = siblings.iter().position(|&id| id == node)?;
        siblings.get(pos + 1).copied()
    }

    fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent_of(node)?;
        let siblings = &self.node(parent).children;
        let pos = siblings.iter().position(|&id| id == node)?;
        pos.checked_sub(1).and_then(|p| siblings.get(p).copied())
    }

    fn last_in_subtree(&self, mut node: NodeId) -> NodeId {
        while let Some(&last_child) = self.node(node).children.last() {
            node = last_child;
        }
        node
    }

    fn link_parent(&mut self, id: NodeId, parent: NodeId) {
        let parent_node = self.node_mut(parent);
        parent_node.children.push(id);
        self.node_mut(id).parent = Some(parent);
    }

    fn unlink_parent(&mut self, id: NodeId, parent: NodeId) {
        let p = self.node_mut(parent);
        p.children.retain(|c| *c != id);
        self.node_mut(id).parent = None;
    }
}

/// Whether no group in `subtree` contains a member of its own link set.
fn links_are_acyclic(subtree: &Subtree) -> bool {
    // Each entry carries the linked group ids of its ancestors.
    let mut stack: Vec<(&Subtree, LinkIds<'_>)> = vec![(subtree, LinkIds::new())];
    while let Some((node, mut chain)) = stack.pop() {
        if let Some(linked_group_id) = node.contents.as_group().and_then(Group::linked_group_id) {
            if chain.contains(&linked_group_id) {
                return false;
            }
            chain.push(linked_group_id);
        }
        for child in &node.children {
            stack.push((child, chain.clone()));
        }
    }
    true
}
