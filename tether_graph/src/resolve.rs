// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Forwarding-chain resolution: walk a forwarded feature back to the raw
//! feature it is derived from, and enumerate the tools along the way.
//!
//! A device is *owned* when a tool defines its features: its producer for a
//! fabricated device, else its tool grabber. Resolution asks the owning
//! tool's [`DeviceForwarder`](crate::types::DeviceForwarder) capability for
//! the source features of the key and recurses until it reaches a feature on
//! an unowned device. Add-time validation keeps the linked graph acyclic, so
//! the visited guard here is defensive: a malformed forwarder produces a
//! diagnostic instead of non-termination.

use alloc::vec::Vec;

use crate::error::GraphError;
use crate::graph::InteractionGraph;
use crate::types::{FeatureKey, ToolId};

/// One entry of a tool stack, from the terminal raw feature to the queried
/// feature.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StackEntry {
    /// A feature along the chain.
    Feature(FeatureKey),
    /// The tool transforming the feature below it into the feature above it.
    Tool(ToolId),
}

impl InteractionGraph {
    /// Resolve a forwarded feature to the terminal raw feature it derives
    /// from.
    ///
    /// Depth-first over each owning tool's source features, returning the
    /// first terminal (unowned) feature found. A key on an unowned device
    /// resolves to itself. Terminates in at most one step per live tool;
    /// a malformed forwarder that reports a cyclic chain yields
    /// [`GraphError::ForwardingCycle`].
    pub fn resolve_root_feature(&self, key: FeatureKey) -> Result<FeatureKey, GraphError> {
        if self.slot(key).is_none() {
            return Err(GraphError::UnknownFeature { key });
        }
        let mut visited: Vec<ToolId> = Vec::new();
        self.resolve_step(key, &mut visited)
    }

    fn resolve_step(
        &self,
        key: FeatureKey,
        visited: &mut Vec<ToolId>,
    ) -> Result<FeatureKey, GraphError> {
        let Some(owner) = self.owning_tool_of_device(key.device) else {
            return Ok(key);
        };
        if visited.contains(&owner) {
            log::warn!("forwarding chain of {key:?} revisits tool {owner:?}; aborting walk");
            return Err(GraphError::ForwardingCycle { key });
        }
        visited.push(owner);
        let sources = self.sources_through(owner, key);
        if sources.is_empty() {
            // A grabbing tool that does not forward: the chain ends here.
            return Ok(key);
        }
        let mut last_err = None;
        for source in sources {
            if self.slot(source).is_none() {
                last_err = Some(GraphError::UnknownFeature { key: source });
                continue;
            }
            match self.resolve_step(source, visited) {
                Ok(root) => return Ok(root),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.expect("non-empty sources yield a result"))
    }

    /// The ordered chain of features and tools from the terminal raw feature
    /// (root first) to `key`'s current position.
    ///
    /// Follows each tool's primary source. On a malformed cyclic chain this
    /// degrades to a diagnostic plus the truncated chain walked so far rather
    /// than an error, so callers visualizing ownership still get the prefix.
    pub fn collect_tool_stack(&self, key: FeatureKey) -> Result<Vec<StackEntry>, GraphError> {
        if self.slot(key).is_none() {
            return Err(GraphError::UnknownFeature { key });
        }
        let mut entries: Vec<StackEntry> = Vec::new();
        let mut visited: Vec<ToolId> = Vec::new();
        let mut current = key;
        entries.push(StackEntry::Feature(current));
        while let Some(owner) = self.owning_tool_of_device(current.device) {
            if visited.contains(&owner) {
                log::warn!(
                    "tool stack of {key:?} revisits tool {owner:?}; returning truncated chain"
                );
                break;
            }
            visited.push(owner);
            let Some(&primary) = self.sources_through(owner, current).first() else {
                break;
            };
            if self.slot(primary).is_none() {
                return Err(GraphError::UnknownFeature { key: primary });
            }
            entries.push(StackEntry::Tool(owner));
            entries.push(StackEntry::Feature(primary));
            current = primary;
        }
        entries.reverse();
        Ok(entries)
    }

    fn sources_through(&self, tool: ToolId, key: FeatureKey) -> Vec<FeatureKey> {
        self.tool_node(tool)
            .and_then(|node| node.tool.as_forwarder())
            .map(|forwarder| forwarder.source_features(key))
            .unwrap_or_default()
    }
}
