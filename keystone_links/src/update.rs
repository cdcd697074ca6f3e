// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Computing the new contents of the members of a link set.
//!
//! The children of the changed group are cloned once per target and moved into the
//! target's coordinate frame. Two things on the target side survive the update: the
//! names of nested groups, and the values of protected entity properties.

use alloc::{string::String, vec, vec::Vec};

use glam::DMat4;
use hashbrown::HashMap;
use keystone_scene::{
    Bounds3, Entity, NodeContents, NodeId, SceneError, Subtree, Tree, is_degenerate,
};

use crate::error::LinkError;
use crate::search::require_group;

/// New children for one member of a link set.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkedGroupUpdate {
    /// The member whose children are replaced.
    pub group: NodeId,
    /// The replacement children, not yet part of any tree.
    pub children: Vec<Subtree>,
}

/// Compute the new children of every group in `targets` after `source` has changed.
///
/// `source` itself is skipped if it appears in `targets`. The result has one entry per
/// remaining target, in the order of `targets`. The tree is only read; nothing is
/// applied. Any failure aborts the whole computation.
pub fn update_linked_groups(
    tree: &Tree,
    source: NodeId,
    targets: &[NodeId],
    world_bounds: &Bounds3,
) -> Result<Vec<LinkedGroupUpdate>, LinkError> {
    let source_transformation = require_group(tree, source)?.transformation();
    if is_degenerate(&source_transformation) {
        return Err(LinkError::NonInvertibleTransform);
    }
    let inverse = source_transformation.inverse();
    let nodes = tree.descendants(source);

    let updates = targets
        .iter()
        .copied()
        .filter(|&target| target != source)
        .map(|target| {
            let transformation = require_group(tree, target)?.transformation() * inverse;
            let mut children =
                clone_and_transform_children(tree, source, &nodes, world_bounds, &transformation)?;
            let existing = tree.children_of(target);
            preserve_group_names(tree, &mut children, existing);
            preserve_entity_properties(tree, &mut children, existing);
            log::trace!("computed {} new children for {target:?}", children.len());
            Ok(LinkedGroupUpdate {
                group: target,
                children,
            })
        })
        .collect::<Result<Vec<_>, LinkError>>()?;

    log::debug!(
        "propagating {source:?} to {} linked groups ({} nodes each)",
        updates.len(),
        nodes.len()
    );
    Ok(updates)
}

/// Clone the children of `group`, with every node in `nodes` transformed.
fn clone_and_transform_children(
    tree: &Tree,
    group: NodeId,
    nodes: &[NodeId],
    world_bounds: &Bounds3,
    transformation: &DMat4,
) -> Result<Vec<Subtree>, LinkError> {
    let mut transformed = transform_contents(tree, nodes, world_bounds, transformation)?;
    tree.children_of(group)
        .iter()
        .map(|&child| rebuild(tree, child, &mut transformed, world_bounds))
        .collect()
}

fn transform_contents(
    tree: &Tree,
    nodes: &[NodeId],
    world_bounds: &Bounds3,
    transformation: &DMat4,
) -> Result<HashMap<NodeId, NodeContents>, LinkError> {
    let transform = |&id: &NodeId| -> Result<(NodeId, NodeContents), LinkError> {
        // Worlds and layers have no contents and never appear below a group.
        let mut contents = tree.contents(id).ok_or(LinkError::InconsistentStructure)?;
        contents
            .transform(world_bounds, transformation)
            .map_err(|err| match err {
                SceneError::BrushOutOfWorld => LinkError::ExceedsWorldBounds,
                err => LinkError::TransformFailed(err),
            })?;
        Ok((id, contents))
    };

    #[cfg(feature = "rayon")]
    let transformed: Result<Vec<_>, LinkError> = {
        use rayon::prelude::*;
        nodes.par_iter().map(transform).collect()
    };
    #[cfg(not(feature = "rayon"))]
    let transformed: Result<Vec<_>, LinkError> = nodes.iter().map(transform).collect();

    Ok(transformed?.into_iter().collect())
}

/// Reassemble the original structure below `id` from the transformed contents.
///
/// Every node is checked against `world_bounds` on its own, so an entity with
/// children is checked as a point entity.
fn rebuild(
    tree: &Tree,
    id: NodeId,
    transformed: &mut HashMap<NodeId, NodeContents>,
    world_bounds: &Bounds3,
) -> Result<Subtree, LinkError> {
    // Post-order: a node is assembled once all of its children are, and those are
    // the last entries of `assembled`.
    let mut stack = vec![(id, false)];
    let mut assembled: Vec<Subtree> = Vec::new();
    while let Some((id, children_done)) = stack.pop() {
        let children = tree.children_of(id);
        if !children_done {
            stack.push((id, true));
            stack.extend(children.iter().rev().map(|&child| (child, false)));
            continue;
        }
        let contents = transformed
            .remove(&id)
            .ok_or(LinkError::InconsistentStructure)?;
        if !world_bounds.contains(&contents.logical_bounds(None)) {
            return Err(LinkError::ExceedsWorldBounds);
        }
        let children = assembled.split_off(assembled.len() - children.len());
        assembled.push(Subtree { contents, children });
    }
    assembled.pop().ok_or(LinkError::InconsistentStructure)
}

/// Give cloned groups the names of the groups they replace.
fn preserve_group_names(tree: &Tree, cloned: &mut [Subtree], existing: &[NodeId]) {
    let mut stack = vec![(cloned, existing)];
    while let Some((cloned, existing)) = stack.pop() {
        for (clone, &existing) in cloned.iter_mut().zip(existing) {
            if let Some(group) = clone.contents.as_group_mut()
                && let Some(existing_group) = tree.group(existing)
            {
                group.set_name(existing_group.name());
                stack.push((clone.children.as_mut_slice(), tree.children_of(existing)));
            }
        }
    }
}

fn preserve_entity_properties(tree: &Tree, cloned: &mut [Subtree], existing: &[NodeId]) {
    let mut stack = vec![(cloned, existing)];
    while let Some((cloned, existing)) = stack.pop() {
        for (clone, &existing) in cloned.iter_mut().zip(existing) {
            if clone.contents.as_group().is_some() && tree.group(existing).is_some() {
                stack.push((clone.children.as_mut_slice(), tree.children_of(existing)));
            } else if let Some(entity) = clone.contents.as_entity_mut()
                && let Some(existing_entity) = tree.entity(existing)
            {
                merge_protected_properties(entity, existing_entity);
            }
        }
    }
}

/// Keep the values of protected properties from `existing`.
///
/// A key protected on either side takes its value (or absence) from `existing`; the
/// clone adopts the protected keys of `existing`. Re-added keys move to the end.
fn merge_protected_properties(clone: &mut Entity, existing: &Entity) {
    if clone.protected_properties().is_empty() && existing.protected_properties().is_empty() {
        return;
    }
    let mut keys: Vec<String> = clone
        .protected_properties()
        .iter()
        .chain(existing.protected_properties())
        .cloned()
        .collect();
    keys.sort_unstable();
    keys.dedup();

    clone.set_protected_properties(existing.protected_properties().to_vec());
    for key in &keys {
        clone.remove_property(key);
        if let Some(value) = existing.property(key) {
            clone.add_or_update_property(key.as_str(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{string::ToString, vec, vec::Vec};
    use glam::DVec3;
    use keystone_scene::{Brush, EntityProperty, Group, Patch};

    const WORLD: Bounds3 = Bounds3::symmetric(8192.0);

    fn translation(x: f64, y: f64, z: f64) -> DMat4 {
        DMat4::from_translation(DVec3::new(x, y, z))
    }

    fn transform(tree: &mut Tree, id: NodeId, transformation: DMat4) {
        tree.transform_subtree(id, &transformation, &WORLD).unwrap();
    }

    fn clone(tree: &mut Tree, id: NodeId) -> NodeId {
        let subtree = tree.clone_subtree(id).unwrap();
        tree.insert_subtree_detached(subtree).unwrap()
    }

    fn rename(tree: &mut Tree, id: NodeId, name: &str) {
        tree.update_group(id, |g| g.set_name(name)).unwrap();
    }

    fn entity_of(subtree: &Subtree) -> &Entity {
        subtree.contents.as_entity().unwrap()
    }

    fn group_with_entity(tree: &mut Tree) -> (NodeId, NodeId) {
        let group = tree.insert_detached(Group::new("name"));
        let entity = tree.insert(group, Entity::new()).unwrap();
        (group, entity)
    }

    #[test]
    fn no_targets_means_no_updates() {
        let mut tree = Tree::new();
        let (group, _) = group_with_entity(&mut tree);
        transform(&mut tree, group, translation(1.0, 0.0, 0.0));

        assert_eq!(update_linked_groups(&tree, group, &[], &WORLD), Ok(vec![]));
        assert_eq!(update_linked_groups(&tree, group, &[group], &WORLD), Ok(vec![]));
    }

    #[test]
    fn target_transformation_is_replayed_on_source_edits() {
        let mut tree = Tree::new();
        let (group, entity) = group_with_entity(&mut tree);
        transform(&mut tree, group, translation(1.0, 0.0, 0.0));
        assert_eq!(tree.entity(entity).unwrap().origin(), DVec3::new(1.0, 0.0, 0.0));

        let target = clone(&mut tree, group);
        transform(&mut tree, target, translation(0.0, 2.0, 0.0));
        assert_eq!(
            tree.group(target).unwrap().transformation(),
            translation(1.0, 2.0, 0.0)
        );

        transform(&mut tree, entity, translation(0.0, 0.0, 3.0));
        assert_eq!(tree.entity(entity).unwrap().origin(), DVec3::new(1.0, 0.0, 3.0));

        let updates = update_linked_groups(&tree, group, &[target], &WORLD).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].group, target);
        assert_eq!(updates[0].children.len(), 1);
        assert_eq!(
            entity_of(&updates[0].children[0]).origin(),
            DVec3::new(1.0, 2.0, 3.0)
        );
        // Nothing is applied.
        assert_eq!(tree.children_of(target).len(), 1);
        assert_eq!(
            tree.entity(tree.children_of(target)[0]).unwrap().origin(),
            DVec3::new(1.0, 2.0, 0.0)
        );
    }

    #[test]
    fn updates_follow_target_order() {
        let mut tree = Tree::new();
        let (group, _) = group_with_entity(&mut tree);
        let first = clone(&mut tree, group);
        let second = clone(&mut tree, group);

        let updates = update_linked_groups(&tree, group, &[second, group, first], &WORLD).unwrap();
        let groups: Vec<NodeId> = updates.iter().map(|u| u.group).collect();
        assert_eq!(groups, vec![second, first]);
    }

    fn nested_setup(tree: &mut Tree) -> (NodeId, NodeId, NodeId) {
        let outer = tree.insert_detached(Group::new("outer"));
        let inner = tree.insert(outer, Group::new("inner")).unwrap();
        let entity = tree.insert(inner, Entity::new()).unwrap();
        let inner_clone = clone(tree, inner);
        transform(tree, inner_clone, translation(0.0, 2.0, 0.0));
        (inner, entity, inner_clone)
    }

    #[test]
    fn nested_group_transformation() {
        let mut tree = Tree::new();
        let (inner, entity, inner_clone) = nested_setup(&mut tree);
        transform(&mut tree, inner, translation(1.0, 0.0, 0.0));
        assert_eq!(tree.entity(entity).unwrap().origin(), DVec3::new(1.0, 0.0, 0.0));

        let updates = update_linked_groups(&tree, inner, &[inner_clone], &WORLD).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].group, inner_clone);
        assert_eq!(
            entity_of(&updates[0].children[0]).origin(),
            DVec3::new(0.0, 2.0, 0.0)
        );
    }

    #[test]
    fn nested_group_entity_transformation() {
        let mut tree = Tree::new();
        let (inner, entity, inner_clone) = nested_setup(&mut tree);
        transform(&mut tree, entity, translation(1.0, 0.0, 0.0));
        assert_eq!(
            tree.group(inner).unwrap().transformation(),
            DMat4::IDENTITY
        );

        let updates = update_linked_groups(&tree, inner, &[inner_clone], &WORLD).unwrap();
        assert_eq!(
            entity_of(&updates[0].children[0]).origin(),
            DVec3::new(1.0, 2.0, 0.0)
        );
    }

    #[test]
    fn nested_structure_is_cloned() {
        let mut tree = Tree::new();
        let outer = tree.insert_detached(Group::new("outer"));
        let inner = tree.insert(outer, Group::new("inner")).unwrap();
        let entity = tree.insert(inner, Entity::new()).unwrap();
        let outer_clone = clone(&mut tree, outer);
        assert_eq!(tree.children_of(outer_clone).len(), 1);

        let updates = update_linked_groups(&tree, outer, &[outer_clone], &WORLD).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].group, outer_clone);

        let [new_inner] = updates[0].children.as_slice() else {
            panic!("expected a single child");
        };
        assert_eq!(new_inner.contents.as_group(), tree.group(inner));
        assert_eq!(new_inner.children.len(), 1);
        assert_eq!(Some(entity_of(&new_inner.children[0])), tree.entity(entity));
    }

    #[test]
    fn exceeding_world_bounds_fails() {
        let mut tree = Tree::new();
        let (group, entity) = group_with_entity(&mut tree);
        let target = clone(&mut tree, group);
        transform(&mut tree, target, translation(8192.0 - 8.0, 0.0, 0.0));

        let target_entity = tree.children_of(target)[0];
        assert_eq!(
            tree.logical_bounds(target_entity),
            Some(Bounds3::new(
                DVec3::new(8192.0 - 16.0, -8.0, -8.0),
                DVec3::new(8192.0, 8.0, 8.0)
            ))
        );
        assert!(update_linked_groups(&tree, group, &[target], &WORLD).is_ok());

        transform(&mut tree, entity, translation(1.0, 0.0, 0.0));
        assert_eq!(
            update_linked_groups(&tree, group, &[target], &WORLD),
            Err(LinkError::ExceedsWorldBounds)
        );
        assert_eq!(
            LinkError::ExceedsWorldBounds.to_string(),
            "Updating a linked node would exceed world bounds"
        );
    }

    #[test]
    fn brush_leaving_the_world_exceeds_world_bounds() {
        let mut tree = Tree::new();
        let group = tree.insert_detached(Group::new("name"));
        let brush = tree
            .insert(group, Brush::cuboid(Bounds3::symmetric(32.0), "texture"))
            .unwrap();
        let target = clone(&mut tree, group);
        transform(&mut tree, target, translation(8150.0, 0.0, 0.0));
        assert!(update_linked_groups(&tree, group, &[target], &WORLD).is_ok());

        transform(&mut tree, brush, translation(20.0, 0.0, 0.0));
        assert_eq!(
            update_linked_groups(&tree, group, &[target], &WORLD),
            Err(LinkError::ExceedsWorldBounds)
        );
    }

    #[test]
    fn degenerate_target_transformation_fails() {
        let mut tree = Tree::new();
        let group = tree.insert_detached(Group::new("name"));
        tree.insert(group, Brush::cuboid(Bounds3::symmetric(32.0), "texture"))
            .unwrap();
        let target = clone(&mut tree, group);
        tree.update_group(target, |g| {
            g.set_transformation(DMat4::from_scale(DVec3::new(0.0, 1.0, 1.0)));
        })
        .unwrap();

        assert_eq!(
            update_linked_groups(&tree, group, &[target], &WORLD),
            Err(LinkError::TransformFailed(SceneError::DegenerateTransform))
        );
    }

    #[test]
    fn patches_and_brush_entities_are_transformed() {
        let mut tree = Tree::new();
        let group = tree.insert_detached(Group::new("name"));
        let points: Vec<DVec3> = (0..9)
            .map(|i| DVec3::new(f64::from(i % 3) * 16.0, f64::from(i / 3) * 16.0, 0.0))
            .collect();
        let patch = Patch::new(3, 3, points.clone(), "water").unwrap();
        tree.insert(group, patch).unwrap();
        let mut func_door = Entity::new();
        func_door.add_or_update_property("classname", "func_door");
        let entity = tree.insert(group, func_door).unwrap();
        tree.insert(entity, Brush::cuboid(Bounds3::symmetric(8.0), "door"))
            .unwrap();

        let target = clone(&mut tree, group);
        transform(&mut tree, target, translation(64.0, 0.0, 0.0));
        transform(&mut tree, entity, translation(0.0, 0.0, 16.0));

        let updates = update_linked_groups(&tree, group, &[target], &WORLD).unwrap();
        let [new_patch, new_entity] = updates[0].children.as_slice() else {
            panic!("expected a patch and an entity");
        };

        let NodeContents::Patch(new_patch) = &new_patch.contents else {
            panic!("expected a patch");
        };
        let shifted: Vec<DVec3> = points
            .iter()
            .map(|&p| p + DVec3::new(64.0, 0.0, 0.0))
            .collect();
        assert_eq!(new_patch.control_points(), shifted.as_slice());
        assert_eq!((new_patch.row_count(), new_patch.column_count()), (3, 3));
        assert_eq!(new_patch.material(), "water");

        let door = entity_of(new_entity);
        assert_eq!(door.origin(), DVec3::new(64.0, 0.0, 16.0));
        assert_eq!(door.property("classname"), Some("func_door"));
        let [new_brush] = new_entity.children.as_slice() else {
            panic!("expected the entity to keep its brush");
        };
        let NodeContents::Brush(new_brush) = &new_brush.contents else {
            panic!("expected a brush");
        };
        assert_eq!(
            new_brush.bounds(),
            Bounds3::around(DVec3::new(64.0, 0.0, 16.0), 8.0)
        );
        assert_eq!(
            new_entity.logical_bounds(),
            Bounds3::around(DVec3::new(64.0, 0.0, 16.0), 8.0)
        );
    }

    #[test]
    fn singular_source_transformation_fails() {
        let mut tree = Tree::new();
        let (group, _) = group_with_entity(&mut tree);
        let target = clone(&mut tree, group);
        tree.update_group(group, |g| {
            g.set_transformation(DMat4::from_scale(DVec3::new(0.0, 1.0, 1.0)));
        })
        .unwrap();

        assert_eq!(
            update_linked_groups(&tree, group, &[target], &WORLD),
            Err(LinkError::NonInvertibleTransform)
        );
        assert_eq!(
            update_linked_groups(&tree, group, &[], &WORLD),
            Err(LinkError::NonInvertibleTransform)
        );
    }

    #[test]
    fn nested_group_names_are_kept() {
        let mut tree = Tree::new();
        let outer = tree.insert_detached(Group::new("outerGroupNode"));
        let inner = tree.insert(outer, Group::new("innerGroupNode")).unwrap();

        let inner_clone = clone(&mut tree, inner);
        rename(&mut tree, inner_clone, "innerGroupNodeClone");
        let outer_clone = clone(&mut tree, outer);
        rename(&mut tree, outer_clone, "outerGroupNodeClone");
        let nested_clone = tree.children_of(outer_clone)[0];
        rename(&mut tree, nested_clone, "innerGroupNodeNestedClone");

        let updates = update_linked_groups(&tree, outer, &[outer_clone], &WORLD).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].group, outer_clone);
        assert_eq!(
            updates[0].children[0].contents.as_group().map(Group::name),
            Some("innerGroupNodeNestedClone")
        );
    }

    type Properties = &'static [(&'static str, &'static str)];

    struct Case {
        source_protected: &'static [&'static str],
        target_protected: &'static [&'static str],
        source: Properties,
        target: Properties,
        expected: Properties,
    }

    const SOME: Properties = &[("some_key", "some_value")];
    const OTHER: Properties = &[("some_key", "other_value")];
    const KEY: &[&str] = &["some_key"];

    const fn case(
        source_protected: &'static [&'static str],
        target_protected: &'static [&'static str],
        source: Properties,
        target: Properties,
        expected: Properties,
    ) -> Case {
        Case {
            source_protected,
            target_protected,
            source,
            target,
            expected,
        }
    }

    const PROPERTY_CASES: &[Case] = &[
        // unchanged
        case(&[], &[], SOME, SOME, SOME),
        case(&[], KEY, SOME, SOME, SOME),
        case(KEY, &[], SOME, SOME, SOME),
        case(KEY, KEY, SOME, SOME, SOME),
        // added to source
        case(&[], &[], SOME, &[], SOME),
        case(&[], KEY, SOME, &[], &[]),
        case(KEY, &[], SOME, &[], &[]),
        case(KEY, KEY, SOME, &[], &[]),
        // changed in source
        case(&[], &[], OTHER, SOME, OTHER),
        case(KEY, &[], OTHER, SOME, SOME),
        case(&[], KEY, OTHER, SOME, SOME),
        case(KEY, KEY, OTHER, SOME, SOME),
        // removed from source
        case(&[], &[], &[], SOME, &[]),
        case(KEY, &[], &[], SOME, SOME),
        case(&[], KEY, &[], SOME, SOME),
        case(KEY, KEY, &[], SOME, SOME),
    ];

    fn properties(properties: Properties) -> Vec<EntityProperty> {
        properties
            .iter()
            .map(|&(key, value)| EntityProperty::new(key, value))
            .collect()
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn sorted<T: Ord>(mut v: Vec<T>) -> Vec<T> {
        v.sort();
        v
    }

    #[test]
    fn protected_properties_keep_target_values() {
        for (i, case) in PROPERTY_CASES.iter().enumerate() {
            let mut tree = Tree::new();
            let (group, entity) = group_with_entity(&mut tree);
            let target = clone(&mut tree, group);
            let target_entity = tree.children_of(target)[0];

            tree.update_entity(entity, |e| {
                e.set_properties(properties(case.source));
                e.set_protected_properties(keys(case.source_protected));
            })
            .unwrap();
            tree.update_entity(target_entity, |e| {
                e.set_properties(properties(case.target));
                e.set_protected_properties(keys(case.target_protected));
            })
            .unwrap();

            let updates = update_linked_groups(&tree, group, &[target], &WORLD).unwrap();
            assert_eq!(updates.len(), 1, "case {i}");
            let [new_entity] = updates[0].children.as_slice() else {
                panic!("case {i}: expected a single child");
            };
            let new_entity = entity_of(new_entity);
            assert_eq!(
                sorted(new_entity.properties().to_vec()),
                sorted(properties(case.expected)),
                "case {i}"
            );
            assert_eq!(
                sorted(new_entity.protected_properties().to_vec()),
                sorted(keys(case.target_protected)),
                "case {i}"
            );
        }
    }

    #[test]
    fn re_added_protected_keys_move_to_the_end() {
        let mut clone = Entity::with_properties(vec![
            EntityProperty::new("a", "1"),
            EntityProperty::new("b", "2"),
        ]);
        let mut existing = clone.clone();
        existing.add_or_update_property("a", "3");
        existing.set_protected_properties(keys(&["a"]));

        merge_protected_properties(&mut clone, &existing);
        assert_eq!(
            clone.properties(),
            &[EntityProperty::new("b", "2"), EntityProperty::new("a", "3")]
        );
        assert!(clone.is_protected("a"));
    }
}
