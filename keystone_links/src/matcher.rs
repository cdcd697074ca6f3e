// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Positional traversal of structurally matching trees.

use alloc::{vec, vec::Vec};

use keystone_scene::{NodeId, Tree};

use crate::error::LinkError;

/// Visit `source` and `target` and then their children pairwise, in document order.
///
/// The visitor decides whether the pair is compatible (returning an error if not) and
/// whether to descend into the pair's children. Before descending, both nodes must have
/// the same number of children, otherwise [`LinkError::InconsistentStructure`] is
/// returned. The first error stops the traversal.
pub fn visit_per_position<F>(
    tree: &Tree,
    source: NodeId,
    target: NodeId,
    mut visitor: F,
) -> Result<(), LinkError>
where
    F: FnMut(NodeId, NodeId) -> Result<bool, LinkError>,
{
    let mut stack = vec![(source, target)];
    while let Some((source, target)) = stack.pop() {
        if !visitor(source, target)? {
            continue;
        }
        let source_children = tree.children_of(source);
        let target_children = tree.children_of(target);
        if source_children.len() != target_children.len() {
            return Err(LinkError::InconsistentStructure);
        }
        stack.extend(
            source_children
                .iter()
                .copied()
                .zip(target_children.iter().copied())
                .rev(),
        );
    }
    Ok(())
}

/// Visit all `roots` at once, then every position below them, in document order.
///
/// At each position the visitor receives the corresponding node of every tree, in the
/// order of `roots`. All nodes at a position must have the same number of children,
/// otherwise [`LinkError::InconsistentStructure`] is returned.
pub fn visit_all_per_position<F>(
    tree: &Tree,
    roots: &[NodeId],
    mut visitor: F,
) -> Result<(), LinkError>
where
    F: FnMut(&[NodeId]) -> Result<(), LinkError>,
{
    if roots.is_empty() {
        return Ok(());
    }
    let mut stack: Vec<Vec<NodeId>> = vec![roots.to_vec()];
    while let Some(nodes) = stack.pop() {
        visitor(&nodes)?;
        let child_count = tree.children_of(nodes[0]).len();
        if nodes
            .iter()
            .any(|&node| tree.children_of(node).len() != child_count)
        {
            return Err(LinkError::InconsistentStructure);
        }
        for i in (0..child_count).rev() {
            stack.push(nodes.iter().map(|&node| tree.children_of(node)[i]).collect());
        }
    }
    Ok(())
}
