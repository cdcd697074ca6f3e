// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keystone Scene: the in-memory scene tree of an id Tech style map.
//!
//! A map is a hierarchy of nodes: one world, its layers, and below them groups,
//! entities, brushes, and patches.
//!
//! - Nodes live in an arena and are addressed by generational [`NodeId`]s.
//! - Each node owns its ordered children; parent links are kept for upward queries.
//! - Subtrees can be detached without being destroyed, which lets callers swap whole
//!   child lists in and out of the tree (and back again on undo) while node identity
//!   stays stable.
//! - Bounds are cached and updated in a batched [`Tree::commit`] step.
//!
//! ## Node contents
//!
//! - [`World`] and [`Layer`]: organization only, no geometry.
//! - [`Group`]: a named group with an accumulated transformation and an optional
//!   linked group id that makes it a member of a link set.
//! - [`Entity`]: ordered key/value properties, protected property keys, and an
//!   optional link id. Point entities are positioned by their `origin` property.
//! - [`Brush`]: a convex polyhedron. Transforming a brush can fail.
//! - [`Patch`]: a grid of bezier control points.
//!
//! [`NodeType::accepts`] and [`Tree::can_add_child`] encode which nodes may contain which.
//!
//! ## API overview
//!
//! - [`Tree`]: the arena. Key operations:
//!   - [`Tree::insert`], [`Tree::insert_detached`], [`Tree::insert_subtree`] → [`NodeId`]
//!   - [`Tree::attach`], [`Tree::detach`], [`Tree::remove`], [`Tree::replace_children`]
//!   - [`Tree::set_contents`], [`Tree::update_group`], [`Tree::update_entity`]
//!   - [`Tree::clone_subtree`] / [`Tree::clone_children`] produce owned [`Subtree`] values.
//!   - [`Tree::transform_subtree`] transforms a node and its descendants atomically.
//!   - [`Tree::commit`], [`Tree::logical_bounds`], [`Tree::nodes_containing`].
//!   - [`Tree::open_group`] / [`Tree::close_group`] track the [`EditState`] of groups.
//! - [`Subtree`]: an owned node hierarchy outside of any tree.
//! - [`Bounds3`]: axis-aligned box over [`glam::DVec3`].
//! - [`SceneError`]: errors of fallible operations.
//!
//! ## Example
//!
//! ```rust
//! use glam::{DMat4, DVec3};
//! use keystone_scene::{Bounds3, Entity, Group, Layer, Tree, World};
//!
//! let (mut tree, world) = Tree::with_world(World::new("world"));
//! let layer = tree.insert(world, Layer::new("default")).unwrap();
//! let group = tree.insert(layer, Group::new("lights")).unwrap();
//! let light = tree.insert(group, Entity::new()).unwrap();
//!
//! let offset = DMat4::from_translation(DVec3::new(64.0, 0.0, 0.0));
//! tree.transform_subtree(group, &offset, &Bounds3::DEFAULT_WORLD).unwrap();
//! tree.commit();
//!
//! assert_eq!(tree.entity(light).unwrap().origin(), DVec3::new(64.0, 0.0, 0.0));
//! assert_eq!(tree.logical_bounds(group), Some(Bounds3::around(DVec3::new(64.0, 0.0, 0.0), 8.0)));
//! ```
//!
//! ## Features
//!
//! - `std` (default): enables `std` support in `glam`.
//! - `libm`: enables `libm` math in `glam` for `no_std` targets.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod contents;
mod error;
mod subtree;
mod tree;
mod types;

pub use contents::{
    Brush, BrushFace, CLASSNAME_KEY, DETERMINANT_EPSILON, Entity, EntityProperty, Group, Layer,
    NodeContents, NodeKind, NodeType, ORIGIN_KEY, POINT_ENTITY_HALF_SIZE, Patch, World,
    is_degenerate,
};
pub use error::SceneError;
pub use subtree::Subtree;
pub use tree::{QueryFilter, Tree};
pub use types::{Bounds3, EditState, NodeFlags, NodeId};
