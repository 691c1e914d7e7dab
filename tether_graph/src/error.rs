// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type for graph mutation and resolution.
//!
//! Grab conflicts (`AlreadyGrabbed`, `NotGrabber`) are local and non-fatal:
//! the plain [`acquire_device`](crate::graph::InteractionGraph::acquire_device)
//! / [`release_device`](crate::graph::InteractionGraph::release_device) calls
//! report them as a boolean, and the `try_*` counterparts exist for callers
//! that want a uniform error channel. The add-time kinds (`CyclicAssignment`,
//! `UnknownFeature`) are rejected before the tool is linked, so the graph's
//! invariants are never actually violated at runtime.

use alloc::string::String;

use crate::types::{DeviceId, FeatureKey};

/// Errors reported by the interaction graph.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// The device already has a different current grabber.
    #[error("device {device:?} already has a different grabber")]
    AlreadyGrabbed {
        /// The contested device.
        device: DeviceId,
    },

    /// A release was attempted by someone other than the current grabber.
    /// Treated as a no-op by the graph, not as a fatal condition.
    #[error("release attempted on device {device:?} by a non-grabber")]
    NotGrabber {
        /// The device whose grab was left untouched.
        device: DeviceId,
    },

    /// A proposed assignment would close a loop in the producer/consumer
    /// relation. Rejected before the tool is linked into the graph.
    #[error("assignment through feature {key:?} would close a producer/consumer loop")]
    CyclicAssignment {
        /// The consumed feature whose chain walked back on itself.
        key: FeatureKey,
    },

    /// The referenced feature is not present in the graph.
    #[error("feature {key:?} is not present in the graph")]
    UnknownFeature {
        /// The offending key.
        key: FeatureKey,
    },

    /// Name-based lookup found no device registered under the name.
    #[error("no device is registered under the name `{name}`")]
    UnknownDevice {
        /// The unresolved device name.
        name: String,
    },

    /// A device removal was attempted while a live tool still consumes one of
    /// its features. A caller-ordering contract violation: remove the
    /// consuming tools first.
    #[error("device {device:?} is still consumed by a live tool")]
    DanglingReference {
        /// The device that was left in place.
        device: DeviceId,
    },

    /// A malformed forwarder reported a cyclic source chain. Defensive only:
    /// add-time validation keeps the linked graph acyclic.
    #[error("forwarding chain reported a cycle at feature {key:?}")]
    ForwardingCycle {
        /// The feature at which the walk revisited a tool.
        key: FeatureKey,
    },

    /// The operation referenced a device or tool handle that is no longer
    /// live (removed, or its slot was reused).
    #[error("operation on a stale device or tool handle")]
    StaleHandle,
}
