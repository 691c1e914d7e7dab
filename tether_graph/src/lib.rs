// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tether Graph: the binding graph between input devices and interactive tools.
//!
//! ## Overview
//!
//! This crate is the interaction core of a 3D UI toolkit: it maintains the
//! mutable, cycle-free bipartite graph that binds *input devices* (physical
//! trackers/buttons/valuators and the virtual devices tools fabricate) to the
//! *tools* consuming their features, under continuous runtime change.
//! It does not render anything, talk to hardware, or parse configuration —
//! collaborators feed it devices, tools, and raw feature edges, and it
//! answers with deterministic dispatch and level-ordered iteration.
//!
//! ## Levels
//!
//! Every node carries a *level*: its topological depth in the
//! producer/consumer relation. Devices with no tool above them sit at level 0;
//! a tool sits one level above the highest device it consumes; a device
//! fabricated (or grabbed) by a tool rides at that tool's level. The
//! [`graph::InteractionGraph`] restores these rules after every acquire or
//! release by re-leveling only the downstream subgraph of the change, and
//! level-ordered iteration gives collaborators a deterministic update and
//! render order.
//!
//! ## Grabs
//!
//! A tool may *acquire* a device, taking exclusive ownership of all of its
//! feature slots; a reserved sentinel ([`types::Grabber::Physical`])
//! permanently holds purely physical devices for the raw tracking layer.
//! Grab conflicts are reported as a boolean status, never as a panic.
//!
//! ## Dispatch
//!
//! Raw press/release/valuator edges enter through
//! [`graph::InteractionGraph::feature_pressed`] and friends. Ownership of a
//! press is latched for the full press/release cycle, so every delivered
//! `down` is paired with exactly one `up` to the same tool — including across
//! mid-press grabs and kill-zone preemption (see [`dispatch`]).
//!
//! ## Forwarding chains
//!
//! Tools that fabricate virtual devices expose a
//! [`types::DeviceForwarder`] capability; [`resolve`] walks it to map a
//! forwarded feature back to the raw feature it derives from, or to collect
//! the full tool stack for visualization.
//!
//! ## Concurrency
//!
//! All graph mutation and dispatch happen synchronously on one thread within
//! the application's per-frame update pass; the graph carries no locking.
//! The `tether_frame` crate provides the synchronized once-per-frame handoff
//! from device-adapter threads.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod dispatch;
pub mod error;
pub mod graph;
pub mod resolve;
pub mod types;

mod level;
#[cfg(test)]
mod testutil;

pub use dispatch::DispatchOutcome;
pub use error::GraphError;
pub use graph::InteractionGraph;
pub use resolve::StackEntry;
pub use types::{
    ButtonConsumer, DeviceForwarder, DeviceId, DeviceSpec, FeatureKey, FeatureKind, FeatureSlot,
    Grabber, SlotFlags, Tool, ToolId, ValuatorConsumer,
};
