// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keystone Links: linked groups for Keystone scene trees.
//!
//! Groups that share a linked group id form a *link set*. Editing one member of a link
//! set and then propagating the change replaces the children of every other member with
//! a transformed copy of the edited member's children, so that all members stay
//! structurally identical while each keeps its own placement.
//!
//! - [`update_linked_groups`] computes the new children of the other members. It only
//!   reads the tree and either succeeds for all members or fails as a whole.
//! - [`UpdateLinkedGroupsHelper`] runs that computation for a batch of changed groups
//!   and swaps the results into a [`Document`], undoably.
//! - [`set_link_ids`] gives corresponding entities across the members of a link set a
//!   shared link id; [`generate_entity_link_ids`] computes such ids without writing them.
//! - [`visit_per_position`] and [`visit_all_per_position`] walk structurally matching
//!   trees position by position.
//!
//! Nested groups keep their names on the receiving side, and entity properties that are
//! protected on either side keep the receiving entity's values.
//!
//! ## Example
//!
//! ```rust
//! use glam::{DMat4, DVec3};
//! use keystone_links::{Document, MapDocument, UpdateLinkedGroupsHelper, set_linked_group_id};
//! use keystone_scene::{Entity, Group};
//!
//! let mut doc = MapDocument::default();
//! let layer = doc.default_layer();
//! let tree = doc.tree_mut();
//!
//! let source = tree.insert(layer, Group::new("crate")).unwrap();
//! set_linked_group_id(tree, source, "crates").unwrap();
//! let entity = tree.insert(source, Entity::new()).unwrap();
//! let copy = tree.clone_subtree(source).unwrap();
//! let target = tree.insert_subtree(layer, copy).unwrap();
//!
//! let offset = DMat4::from_translation(DVec3::new(128.0, 0.0, 0.0));
//! let world_bounds = doc.world_bounds();
//! doc.tree_mut().transform_subtree(target, &offset, &world_bounds).unwrap();
//!
//! // Edit the source, then propagate.
//! let lift = DMat4::from_translation(DVec3::new(0.0, 0.0, 16.0));
//! doc.tree_mut().transform_subtree(entity, &lift, &world_bounds).unwrap();
//! let mut helper = UpdateLinkedGroupsHelper::new(doc.tree(), vec![source]);
//! helper.apply(&mut doc).unwrap();
//!
//! let moved = doc.tree().children_of(target)[0];
//! assert_eq!(doc.tree().entity(moved).unwrap().origin(), DVec3::new(128.0, 0.0, 16.0));
//!
//! helper.undo(&mut doc).unwrap();
//! let restored = doc.tree().children_of(target)[0];
//! assert_eq!(doc.tree().entity(restored).unwrap().origin(), DVec3::new(128.0, 0.0, 0.0));
//! helper.release(doc.tree_mut());
//! ```
//!
//! ## Features
//!
//! - `std` (default): enables `std` support in dependencies.
//! - `rayon` (default): clones and transforms nodes on the rayon thread pool. Results
//!   are identical with and without it.
//! - `libm`: enables `libm` math in `glam` for `no_std` targets.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod document;
mod error;
mod helper;
mod link_ids;
mod matcher;
mod search;
mod update;

pub use document::{Document, MapDocument};
pub use error::LinkError;
pub use helper::{UpdateLinkedGroupsHelper, check_linked_groups_to_update};
pub use link_ids::{
    copy_link_ids, generate_entity_link_ids, generate_link_id, reset_link_ids, set_link_ids,
};
pub use matcher::{visit_all_per_position, visit_per_position};
pub use search::{find_all_linked_groups, find_linked_groups, set_linked_group_id};
pub use update::{LinkedGroupUpdate, update_linked_groups};
