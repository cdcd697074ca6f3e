// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link ids: correlating the entities of the members of a link set.
//!
//! Entities at the same position in the members of a link set share a link id. Link ids
//! are assigned when the set is created and copied positionally to the other members.
//! Nested groups that belong to a different link set are skipped; their entities are
//! correlated by their own set.

use alloc::{
    string::{String, ToString},
    vec,
    vec::Vec,
};

use hashbrown::HashMap;
use keystone_scene::{Entity, NodeId, NodeKind, NodeType, SceneError, Tree};

use crate::error::LinkError;
use crate::matcher::{visit_all_per_position, visit_per_position};
use crate::search::require_group;

/// A fresh, globally unique link id.
pub fn generate_link_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate one link id per entity position across all `groups`.
///
/// All groups must share one linked group id. Returns `Ok(None)` if the groups are not
/// structurally congruent, including when an entity in the first group does not
/// correspond to an entity in every other group.
pub fn generate_entity_link_ids(
    tree: &Tree,
    groups: &[NodeId],
) -> Result<Option<HashMap<NodeId, String>>, LinkError> {
    let [first, rest @ ..] = groups else {
        return Err(LinkError::TooFewGroups);
    };
    if rest.is_empty() {
        return Err(LinkError::TooFewGroups);
    }
    let linked_group_id = require_group(tree, *first)?
        .linked_group_id()
        .ok_or(LinkError::NotLinked)?;
    for &group in rest {
        if require_group(tree, group)?.linked_group_id() != Some(linked_group_id) {
            return Err(LinkError::MixedLinkSets);
        }
    }

    let mut link_ids = HashMap::new();
    let visited = visit_all_per_position(tree, groups, |nodes| {
        if tree.node_type(nodes[0]) == Some(NodeType::Entity) {
            let link_id = generate_link_id();
            for &node in nodes {
                if tree.node_type(node) != Some(NodeType::Entity) {
                    return Err(LinkError::InconsistentStructure);
                }
                link_ids.insert(node, link_id.clone());
            }
        }
        Ok(())
    });
    match visited {
        Ok(()) => Ok(Some(link_ids)),
        Err(LinkError::InconsistentStructure) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Copy the link ids of the entities of `source` to the entities at the same positions
/// in `target`.
///
/// Nested groups belonging to a different link set than `source` are not entered. On
/// error, `target` is left unchanged.
pub fn copy_link_ids(tree: &mut Tree, source: NodeId, target: NodeId) -> Result<(), LinkError> {
    let assignments = collect_link_id_copies(tree, source, target)?;
    for (entity, link_id) in assignments {
        tree.update_entity(entity, |e| e.set_link_id(link_id))?;
    }
    Ok(())
}

fn collect_link_id_copies(
    tree: &Tree,
    source: NodeId,
    target: NodeId,
) -> Result<Vec<(NodeId, String)>, LinkError> {
    let containing_linked_group_id = require_group(tree, source)?
        .linked_group_id()
        .ok_or(LinkError::NotLinked)?;
    require_group(tree, target)?;

    let check_type = |node: NodeId, expected: NodeType, recurse: bool| {
        if tree.node_type(node) == Some(expected) {
            Ok(recurse)
        } else {
            Err(LinkError::InconsistentStructure)
        }
    };

    let mut assignments = Vec::new();
    visit_per_position(tree, source, target, |source, target| {
        match tree.kind(source) {
            Some(NodeKind::World(_)) => check_type(target, NodeType::World, true),
            Some(NodeKind::Layer(_)) => check_type(target, NodeType::Layer, true),
            Some(NodeKind::Group(group)) => {
                let recurse = group
                    .linked_group_id()
                    .is_none_or(|id| id == containing_linked_group_id);
                check_type(target, NodeType::Group, recurse)
            }
            Some(NodeKind::Entity(entity)) => {
                if tree.node_type(target) != Some(NodeType::Entity) {
                    return Err(LinkError::InconsistentStructure);
                }
                let link_id = entity.link_id().ok_or(LinkError::MissingLinkId)?;
                assignments.push((target, link_id.to_string()));
                Ok(true)
            }
            Some(NodeKind::Brush(_)) => check_type(target, NodeType::Brush, false),
            Some(NodeKind::Patch(_)) => check_type(target, NodeType::Patch, false),
            None => Err(SceneError::StaleNode.into()),
        }
    })?;
    Ok(assignments)
}

/// Assign link ids to all members of a link set.
///
/// The first group is the source: each of its entities (outside of nested link sets)
/// gets a fresh link id, which is then copied to the other groups positionally. If any
/// group does not match the source, all link ids in all `groups` are reset and the error
/// is returned.
pub fn set_link_ids(tree: &mut Tree, groups: &[NodeId]) -> Result<(), LinkError> {
    let [source, targets @ ..] = groups else {
        return Err(LinkError::TooFewGroups);
    };
    if targets.is_empty() {
        return Err(LinkError::TooFewGroups);
    }
    let source = *source;
    let entities = {
        let linked_group_id = require_group(tree, source)?
            .linked_group_id()
            .ok_or(LinkError::NotLinked)?;
        link_set_entities(tree, source, linked_group_id)
    };
    for &entity in &entities {
        tree.update_entity(entity, |e| e.set_link_id(generate_link_id()))?;
    }

    let copied = targets
        .iter()
        .try_for_each(|&target| copy_link_ids(tree, source, target));
    if let Err(err) = copied {
        log::warn!("assigning link ids failed, resetting {} groups: {err}", groups.len());
        if let Err(reset_err) = reset_link_ids(tree, groups) {
            log::warn!("resetting link ids failed: {reset_err}");
        }
        return Err(err);
    }
    log::debug!(
        "assigned {} link ids across {} groups",
        entities.len(),
        groups.len()
    );
    Ok(())
}

/// Clear the link id of every entity below `nodes` (inclusive). Stale ids are skipped.
pub fn reset_link_ids(tree: &mut Tree, nodes: &[NodeId]) -> Result<(), LinkError> {
    let mut stack: Vec<NodeId> = nodes.to_vec();
    while let Some(id) = stack.pop() {
        let Some(node_type) = tree.node_type(id) else {
            continue;
        };
        match node_type {
            NodeType::World | NodeType::Layer | NodeType::Group => {
                stack.extend(tree.children_of(id).iter().copied());
            }
            NodeType::Entity => tree.update_entity(id, Entity::reset_link_id)?,
            NodeType::Brush | NodeType::Patch => {}
        }
    }
    Ok(())
}

/// Entities of the link set member `group`, skipping nested members of other sets.
fn link_set_entities(tree: &Tree, group: NodeId, linked_group_id: &str) -> Vec<NodeId> {
    let mut entities = Vec::new();
    let mut stack = vec![group];
    while let Some(id) = stack.pop() {
        match tree.kind(id) {
            Some(NodeKind::Group(group)) => {
                if group
                    .linked_group_id()
                    .is_none_or(|nested| nested == linked_group_id)
                {
                    stack.extend(tree.children_of(id).iter().rev().copied());
                }
            }
            Some(NodeKind::Entity(_)) => entities.push(id),
            Some(
                NodeKind::World(_) | NodeKind::Layer(_) | NodeKind::Brush(_) | NodeKind::Patch(_),
            )
            | None => {}
        }
    }
    entities
}
