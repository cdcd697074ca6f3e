// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the scene tree: node identifiers, flags, bounds, and edit state.

use glam::DVec3;

/// Identifier for a node in the tree (generational).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    /// Node flags controlling visibility and editing.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// Node is visible in the editor views.
        const VISIBLE  = 0b0000_0001;
        /// Node is unlocked and may be picked for editing.
        const EDITABLE = 0b0000_0010;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self::VISIBLE | Self::EDITABLE
    }
}

/// Edit state of a group node.
///
/// Opening a group marks all of its ancestor groups as [`EditState::DescendantOpen`];
/// closing it again closes the ancestors.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum EditState {
    /// The group is closed and behaves as a single object.
    #[default]
    Closed,
    /// The group is open; its children can be edited individually.
    Open,
    /// A group nested somewhere below this one is open.
    DescendantOpen,
}

/// Axis-aligned bounding box in 3D.
///
/// Containment checks are inclusive: a box touching the boundary of another box
/// from the inside is contained by it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds3 {
    /// Minimum corner.
    pub min: DVec3,
    /// Maximum corner.
    pub max: DVec3,
}

impl Bounds3 {
    /// The degenerate box at the origin.
    pub const ZERO: Self = Self::new(DVec3::ZERO, DVec3::ZERO);

    /// Default world bounds: 8192 units in every direction from the origin.
    pub const DEFAULT_WORLD: Self = Self::symmetric(8192.0);

    /// Create a new box from min/max corners.
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create a box centered on the origin extending `half_size` along every axis.
    #[inline]
    pub const fn symmetric(half_size: f64) -> Self {
        Self::new(DVec3::splat(-half_size), DVec3::splat(half_size))
    }

    /// Create a box centered on `center` extending `half_size` along every axis.
    #[inline]
    pub fn around(center: DVec3, half_size: f64) -> Self {
        Self::new(center - DVec3::splat(half_size), center + DVec3::splat(half_size))
    }

    /// The smallest box containing all points, or `None` if there are none.
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
        let mut it = points.into_iter();
        let first = it.next()?;
        Some(it.fold(Self::new(first, first), |acc, p| {
            Self::new(acc.min.min(p), acc.max.max(p))
        }))
    }

    /// The smallest box enclosing all boxes, or `None` if there are none.
    pub fn union_all(bounds: impl IntoIterator<Item = Self>) -> Option<Self> {
        let mut it = bounds.into_iter();
        let first = it.next()?;
        Some(it.fold(first, |acc, b| acc.union(&b)))
    }

    /// The smallest box enclosing both boxes.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Whether `other` lies entirely within this box.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    /// Whether the point lies within this box.
    #[inline]
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// Return true if the box has no volume. Assumes no NaN.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max.cmple(self.min).any()
    }

    /// Center of the box.
    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Extent of the box along each axis.
    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// The box moved by `delta`.
    #[inline]
    pub fn translate(&self, delta: DVec3) -> Self {
        Self::new(self.min + delta, self.max + delta)
    }
}
