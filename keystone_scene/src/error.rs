// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by tree mutations and content transforms.

use crate::contents::NodeType;

/// Error returned by fallible [`Tree`](crate::Tree) operations and content transforms.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    /// The [`NodeId`](crate::NodeId) does not refer to a live node.
    #[error("node does not exist")]
    StaleNode,
    /// The child cannot be added to the parent.
    #[error("{child} node cannot be added to {parent} node")]
    CannotAddChild {
        /// Type of the prospective parent.
        parent: NodeType,
        /// Type of the rejected child.
        child: NodeType,
    },
    /// The child subtree contains a member of a link set that the parent or one of its
    /// ancestors already belongs to.
    #[error("a linked group cannot contain a member of its own link set")]
    RecursiveLinkedGroup,
    /// The child is the parent itself or one of its ancestors.
    #[error("a node cannot become its own descendant")]
    CyclicParent,
    /// The node was expected to be a group.
    #[error("node is not a group")]
    NotAGroup,
    /// The node was expected to be an entity.
    #[error("node is not an entity")]
    NotAnEntity,
    /// The node was expected to have no parent.
    #[error("node is still attached to a parent")]
    NotDetached,
    /// New contents were of a different type than the node.
    #[error("cannot replace {node} contents with {contents} contents")]
    ContentKindMismatch {
        /// Type of the node.
        node: NodeType,
        /// Type of the rejected contents.
        contents: NodeType,
    },
    /// The transformation collapses geometry (zero or near-zero determinant).
    #[error("transformation is degenerate")]
    DegenerateTransform,
    /// A brush without vertices or faces.
    #[error("brush has no geometry")]
    EmptyBrush,
    /// A brush face refers to a vertex that does not exist, or has too few vertices.
    #[error("brush face is invalid: index {index} with {vertex_count} vertices")]
    InvalidBrushFace {
        /// Offending vertex index (or face size for faces with too few vertices).
        index: usize,
        /// Number of vertices of the brush.
        vertex_count: usize,
    },
    /// The transformed brush would leave the world bounds.
    #[error("brush would exceed world bounds")]
    BrushOutOfWorld,
    /// The patch grid dimensions do not match its control points.
    #[error("invalid patch: {rows}x{columns} grid with {points} control points")]
    InvalidPatch {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        columns: usize,
        /// Number of control points supplied.
        points: usize,
    },
}
