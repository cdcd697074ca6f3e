// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported while linking groups and propagating their changes.

use alloc::string::String;

use keystone_scene::SceneError;

/// Error returned by link set operations.
///
/// Every operation that returns this error leaves the tree as it was before the call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Two changed groups belong to the same link set, so neither can be the source.
    #[error("Cannot update multiple members of the same link set")]
    ConflictingLinkSet {
        /// The shared linked group id.
        linked_group_id: String,
    },
    /// Matched trees differ in child count or node type at some position.
    #[error("Inconsistent linked group structure")]
    InconsistentStructure,
    /// The source group's transformation cannot be inverted.
    #[error("Group transformation is not invertible")]
    NonInvertibleTransform,
    /// Transforming a cloned node failed.
    #[error("Failed to transform a linked node")]
    TransformFailed(#[source] SceneError),
    /// A cloned node would lie outside of the world bounds.
    #[error("Updating a linked node would exceed world bounds")]
    ExceedsWorldBounds,
    /// Link ids need at least two groups to correlate.
    #[error("Link set must contain at least two groups")]
    TooFewGroups,
    /// The group has no linked group id.
    #[error("group is not a member of a link set")]
    NotLinked,
    /// The groups do not all share one linked group id.
    #[error("groups belong to different link sets")]
    MixedLinkSets,
    /// An entity of the source group has no link id to copy.
    #[error("source entity has no link id")]
    MissingLinkId,
    /// A tree operation failed.
    #[error(transparent)]
    Scene(#[from] SceneError),
}
