// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Owned, detached node hierarchies.

use alloc::{vec, vec::Vec};

use crate::contents::NodeContents;
use crate::error::SceneError;
use crate::types::Bounds3;

/// A node and its descendants as a plain value, outside of any [`Tree`](crate::Tree).
///
/// Subtrees are produced by [`Tree::clone_subtree`](crate::Tree::clone_subtree) and
/// consumed by [`Tree::insert_subtree`](crate::Tree::insert_subtree). Since they are
/// values, they can be built and transformed on worker threads.
#[derive(Clone, Debug, PartialEq)]
pub struct Subtree {
    /// Contents of the root node.
    pub contents: NodeContents,
    /// Children in order.
    pub children: Vec<Subtree>,
}

impl Subtree {
    /// A subtree consisting of a single node.
    pub fn new(contents: impl Into<NodeContents>) -> Self {
        Self {
            contents: contents.into(),
            children: Vec::new(),
        }
    }

    /// A subtree with the given children.
    pub fn with_children(contents: impl Into<NodeContents>, children: Vec<Self>) -> Self {
        Self {
            contents: contents.into(),
            children,
        }
    }

    /// Number of nodes in the subtree, including the root.
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut stack = vec![self];
        while let Some(subtree) = stack.pop() {
            len += 1;
            stack.extend(&subtree.children);
        }
        len
    }

    /// Always false: a subtree has at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Logical bounds of the subtree root.
    pub fn logical_bounds(&self) -> Bounds3 {
        let children = Bounds3::union_all(self.children.iter().map(Self::logical_bounds));
        self.contents.logical_bounds(children)
    }

    /// Check the parent/child type rules everywhere in the subtree.
    pub fn validate(&self) -> Result<(), SceneError> {
        let mut stack = vec![self];
        while let Some(subtree) = stack.pop() {
            let parent = subtree.contents.node_type();
            for child in &subtree.children {
                let child_type = child.contents.node_type();
                if !parent.accepts(child_type) {
                    return Err(SceneError::CannotAddChild {
                        parent,
                        child: child_type,
                    });
                }
                stack.push(child);
            }
        }
        Ok(())
    }
}
