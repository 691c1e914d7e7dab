// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The staging buffer between device-adapter threads and the frame pump.

use std::sync::{Mutex, PoisonError};

use tether_graph::FeatureKey;

/// Raw value carried by one sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleValue {
    /// Instantaneous button state.
    Button(bool),
    /// Instantaneous valuator position, nominally in `[-1, 1]`.
    Valuator(f64),
}

/// One raw feature sample, as reported by a device adapter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureSample {
    /// The sampled feature.
    pub key: FeatureKey,
    /// The sampled value.
    pub value: SampleValue,
}

/// Staging buffer for raw samples.
///
/// Adapter threads [`push`](Self::push) whenever their hardware reports; the
/// pump [`drain`](Self::drain)s the whole buffer once per frame. The swap
/// under the lock is the single synchronized handoff between the adapter
/// threads and the update pass; everything downstream of it is
/// single-threaded.
#[derive(Debug, Default)]
pub struct SampleMailbox {
    staged: Mutex<Vec<FeatureSample>>,
}

impl SampleMailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage one sample. Callable from any thread.
    pub fn push(&self, sample: FeatureSample) {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }

    /// Take every staged sample in arrival order, leaving the buffer empty.
    pub fn drain(&self) -> Vec<FeatureSample> {
        std::mem::take(
            &mut *self
                .staged
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}
