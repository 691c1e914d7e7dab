// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-level membership lists for devices and tools.
//!
//! Level 0 holds devices only (tools start at level 1). Buckets preserve
//! insertion order so level-ordered iteration is deterministic. The table
//! always ends at the highest occupied level: callers run [`LevelTable::trim`]
//! after detaching.

use alloc::vec::Vec;

use crate::types::{DeviceId, ToolId};

#[derive(Clone, Debug, Default)]
struct LevelBucket {
    devices: Vec<DeviceId>,
    tools: Vec<ToolId>,
}

impl LevelBucket {
    fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.tools.is_empty()
    }
}

/// Array of per-level membership lists, indexed `0..=max_level`.
#[derive(Clone, Debug, Default)]
pub(crate) struct LevelTable {
    buckets: Vec<LevelBucket>,
}

impl LevelTable {
    /// Grow the table so `level` is addressable.
    fn expand_to(&mut self, level: u32) {
        let needed = level as usize + 1;
        if self.buckets.len() < needed {
            self.buckets.resize_with(needed, LevelBucket::default);
        }
    }

    /// Drop empty trailing levels so the highest occupied level is the last entry.
    pub(crate) fn trim(&mut self) {
        while self.buckets.last().is_some_and(LevelBucket::is_empty) {
            self.buckets.pop();
        }
    }

    pub(crate) fn attach_device(&mut self, id: DeviceId, level: u32) {
        self.expand_to(level);
        self.buckets[level as usize].devices.push(id);
    }

    // Detach is a linear retain, not a swap-remove: buckets must keep
    // insertion order for deterministic level-ordered iteration, and buckets
    // stay small (nodes sharing one level).
    pub(crate) fn detach_device(&mut self, id: DeviceId, level: u32) {
        if let Some(bucket) = self.buckets.get_mut(level as usize) {
            bucket.devices.retain(|d| *d != id);
        }
    }

    pub(crate) fn attach_tool(&mut self, id: ToolId, level: u32) {
        self.expand_to(level);
        self.buckets[level as usize].tools.push(id);
    }

    pub(crate) fn detach_tool(&mut self, id: ToolId, level: u32) {
        if let Some(bucket) = self.buckets.get_mut(level as usize) {
            bucket.tools.retain(|t| *t != id);
        }
    }

    /// Number of levels currently addressable (one past the highest occupied
    /// level once trimmed).
    pub(crate) fn level_count(&self) -> usize {
        self.buckets.len()
    }

    /// Devices level 0 upward, insertion order within a level.
    pub(crate) fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.buckets.iter().flat_map(|b| b.devices.iter().copied())
    }

    /// Tools level 1 upward, insertion order within a level.
    pub(crate) fn tools(&self) -> impl Iterator<Item = ToolId> + '_ {
        self.buckets.iter().flat_map(|b| b.tools.iter().copied())
    }
}
