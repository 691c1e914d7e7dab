// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame integration between device adapters and the Tether graph.
//!
//! The interaction core in [`tether_graph`] is single-threaded: all mutation
//! and dispatch happen inside the application's update pass. Device adapters,
//! though, report from their own threads at hardware rate. This crate
//! provides the one synchronized handoff between the two worlds:
//!
//! - [`SampleMailbox`] is the staging buffer adapter threads push raw
//!   [`FeatureSample`]s into, at any time, from any thread.
//! - [`FramePump`] drains the mailbox exactly once per frame, collapses raw
//!   samples into state *edges*, and drives the graph's dispatch entry points
//!   in level order (devices level 0 upward, key order within a device).
//!
//! The pump carries the previous per-feature state across frames, so a press
//! in one frame and its release in the next still pair up, and a full click
//! inside a single frame dispatches down-then-up rather than collapsing to
//! nothing.

mod pump;
mod snapshot;

pub use pump::{FramePump, FrameStats};
pub use snapshot::{FeatureSample, SampleMailbox, SampleValue};
