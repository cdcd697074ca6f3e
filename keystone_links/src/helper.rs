// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Undoable propagation of changed groups to the rest of their link sets.

use alloc::{string::ToString, vec::Vec};
use core::mem;

use hashbrown::HashSet;
use keystone_scene::{NodeId, Tree};

use crate::document::Document;
use crate::error::LinkError;
use crate::search::{find_linked_groups, require_group};
use crate::update::{LinkedGroupUpdate, update_linked_groups};

/// Check that no two of `changed_groups` belong to the same link set.
///
/// Groups without a linked group id never conflict.
pub fn check_linked_groups_to_update(
    tree: &Tree,
    changed_groups: &[NodeId],
) -> Result<(), LinkError> {
    let mut seen = HashSet::new();
    for &group in changed_groups {
        if let Some(linked_group_id) = require_group(tree, group)?.linked_group_id()
            && !seen.insert(linked_group_id)
        {
            return Err(LinkError::ConflictingLinkSet {
                linked_group_id: linked_group_id.to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug)]
enum State {
    /// Groups whose changes still have to be propagated.
    Pending(Vec<NodeId>),
    /// Link set members and the detached children that the next swap puts back.
    Computed(Vec<(NodeId, Vec<NodeId>)>),
}

/// Propagates changes of groups to the other members of their link sets, undoably.
///
/// The first [`apply`](Self::apply) computes the new children of every other member and
/// swaps them in. From then on the helper holds the children that were swapped out, and
/// every further `apply` or [`undo`](Self::undo) swaps again. Children that are swapped
/// out stay alive as detached subtrees; [`release`](Self::release) removes them once the
/// helper is no longer needed.
#[derive(Debug)]
pub struct UpdateLinkedGroupsHelper {
    state: State,
}

impl UpdateLinkedGroupsHelper {
    /// Create a helper for the given changed groups.
    ///
    /// The groups are ordered so that nested groups are updated before the groups that
    /// contain them. Unrelated groups keep their relative order.
    pub fn new(tree: &Tree, changed_groups: Vec<NodeId>) -> Self {
        Self {
            state: State::Pending(order_by_ancestry(tree, changed_groups)),
        }
    }

    /// The changed groups, in update order, until the first successful apply.
    pub fn changed_groups(&self) -> Option<&[NodeId]> {
        match &self.state {
            State::Pending(groups) => Some(groups),
            State::Computed(_) => None,
        }
    }

    /// The link set members and the children the next swap will put back, once applied.
    pub fn updates(&self) -> Option<&[(NodeId, Vec<NodeId>)]> {
        match &self.state {
            State::Pending(_) => None,
            State::Computed(updates) => Some(updates),
        }
    }

    /// Whether the updates have been computed.
    pub fn is_computed(&self) -> bool {
        matches!(self.state, State::Computed(_))
    }

    /// Compute the updates if necessary, then swap them into the document.
    ///
    /// On error nothing in the document's attached tree changes and the helper stays
    /// as it was.
    pub fn apply<D: Document + ?Sized>(&mut self, document: &mut D) -> Result<(), LinkError> {
        if let State::Pending(changed_groups) = &self.state {
            let updates = compute_linked_group_updates(document, changed_groups)
                .inspect_err(|err| log::warn!("cannot update linked groups: {err}"))?;
            self.state = State::Computed(updates);
        }
        self.swap(document)
    }

    /// Revert the last [`apply`](Self::apply).
    ///
    /// # Panics
    ///
    /// Panics if the helper has never been applied.
    pub fn undo<D: Document + ?Sized>(&mut self, document: &mut D) -> Result<(), LinkError> {
        if !self.is_computed() {
            unreachable!("undoing linked group updates that were never applied");
        }
        self.swap(document)
    }

    /// Merge the updates of `other`, applied after this helper, into this helper.
    ///
    /// Where both helpers replaced the children of the same group, the children held
    /// here are the older ones and are kept; `other` retains its own so that releasing
    /// it frees them. All other entries move from `other` to this helper. Undoing this
    /// helper afterwards restores the state from before either was applied.
    ///
    /// # Panics
    ///
    /// Panics if either helper has never been applied.
    pub fn collate_with(&mut self, other: &mut Self) {
        let (State::Computed(mine), State::Computed(theirs)) = (&mut self.state, &mut other.state)
        else {
            unreachable!("collating linked group updates that were never applied");
        };
        let (adopted, kept): (Vec<_>, Vec<_>) = mem::take(theirs)
            .into_iter()
            .partition(|(group, _)| mine.iter().all(|(my_group, _)| my_group != group));
        mine.extend(adopted);
        *theirs = kept;
    }

    /// Remove the detached children held by this helper from `tree`.
    pub fn release(self, tree: &mut Tree) {
        let State::Computed(updates) = self.state else {
            return;
        };
        for (_, children) in updates {
            for child in children {
                if tree.is_alive(child) && tree.parent_of(child).is_none() {
                    tree.remove(child);
                }
            }
        }
    }

    fn swap<D: Document + ?Sized>(&mut self, document: &mut D) -> Result<(), LinkError> {
        let State::Computed(updates) = &mut self.state else {
            unreachable!("swapping linked group updates before computing them");
        };
        document.perform_replace_children(updates)?;
        log::debug!("swapped children of {} linked groups", updates.len());
        Ok(())
    }
}

/// Place every group before the first of its ancestors in the list.
fn order_by_ancestry(tree: &Tree, groups: Vec<NodeId>) -> Vec<NodeId> {
    let mut ordered: Vec<NodeId> = Vec::with_capacity(groups.len());
    for group in groups {
        let position = ordered
            .iter()
            .position(|&placed| tree.is_ancestor_of(placed, group))
            .unwrap_or(ordered.len());
        ordered.insert(position, group);
    }
    ordered
}

fn compute_linked_group_updates<D: Document + ?Sized>(
    document: &mut D,
    changed_groups: &[NodeId],
) -> Result<Vec<(NodeId, Vec<NodeId>)>, LinkError> {
    let tree = document.tree();
    check_linked_groups_to_update(tree, changed_groups)?;

    let world = document.world();
    let world_bounds = document.world_bounds();
    let mut updates = Vec::new();
    for &group in changed_groups {
        let linked_group_id = require_group(tree, group)?
            .linked_group_id()
            .ok_or(LinkError::NotLinked)?;
        let targets: Vec<NodeId> = find_linked_groups(tree, &[world], linked_group_id)
            .into_iter()
            .filter(|&target| target != group)
            .collect();
        updates.extend(update_linked_groups(tree, group, &targets, &world_bounds)?);
    }
    materialize(document.tree_mut(), updates)
}

/// Turn computed children into detached arena nodes.
fn materialize(
    tree: &mut Tree,
    updates: Vec<LinkedGroupUpdate>,
) -> Result<Vec<(NodeId, Vec<NodeId>)>, LinkError> {
    let mut materialized: Vec<(NodeId, Vec<NodeId>)> = Vec::with_capacity(updates.len());
    for update in updates {
        let mut children = Vec::with_capacity(update.children.len());
        for subtree in update.children {
            match tree.insert_subtree_detached(subtree) {
                Ok(child) => children.push(child),
                Err(err) => {
                    let inserted = materialized.into_iter().flat_map(|(_, c)| c);
                    for child in inserted.chain(children) {
                        tree.remove(child);
                    }
                    return Err(err.into());
                }
            }
        }
        materialized.push((update.group, children));
    }
    Ok(materialized)
}
