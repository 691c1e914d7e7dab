// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test-only recording tool: logs every delivery and forwards through an
//! externally mutable source map, so tests can wire up virtual devices after
//! the tool has been added.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::types::{
    ButtonConsumer, DeviceForwarder, FeatureKey, Tool, ValuatorConsumer,
};

/// One delivery observed by a [`RecordingTool`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Event {
    Down(FeatureKey),
    Up(FeatureKey),
    Valuator(FeatureKey, f64),
}

pub(crate) type SharedLog = Rc<RefCell<Vec<(&'static str, Event)>>>;
pub(crate) type SourceMap = Rc<RefCell<BTreeMap<FeatureKey, Vec<FeatureKey>>>>;

pub(crate) fn new_log() -> SharedLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub(crate) struct RecordingTool {
    tag: &'static str,
    consumed: Vec<FeatureKey>,
    sources: SourceMap,
    log: SharedLog,
}

impl RecordingTool {
    /// Build a tool consuming `consumed`; returns the handle to its source
    /// map so forwarding entries can be added once virtual devices exist.
    pub(crate) fn new(
        tag: &'static str,
        consumed: Vec<FeatureKey>,
        log: SharedLog,
    ) -> (Self, SourceMap) {
        let sources: SourceMap = Rc::new(RefCell::new(BTreeMap::new()));
        (
            Self {
                tag,
                consumed,
                sources: sources.clone(),
                log,
            },
            sources,
        )
    }
}

impl Tool for RecordingTool {
    fn class_name(&self) -> &str {
        self.tag
    }

    fn consumed_features(&self) -> &[FeatureKey] {
        &self.consumed
    }

    fn as_button_consumer(&mut self) -> Option<&mut dyn ButtonConsumer> {
        Some(self)
    }

    fn as_valuator_consumer(&mut self) -> Option<&mut dyn ValuatorConsumer> {
        Some(self)
    }

    fn as_forwarder(&self) -> Option<&dyn DeviceForwarder> {
        Some(self)
    }
}

impl ButtonConsumer for RecordingTool {
    fn button_down(&mut self, key: FeatureKey) {
        self.log.borrow_mut().push((self.tag, Event::Down(key)));
    }

    fn button_up(&mut self, key: FeatureKey) {
        self.log.borrow_mut().push((self.tag, Event::Up(key)));
    }
}

impl ValuatorConsumer for RecordingTool {
    fn valuator_changed(&mut self, key: FeatureKey, value: f64) {
        self.log
            .borrow_mut()
            .push((self.tag, Event::Valuator(key, value)));
    }
}

impl DeviceForwarder for RecordingTool {
    fn source_features(&self, forwarded: FeatureKey) -> Vec<FeatureKey> {
        self.sources
            .borrow()
            .get(&forwarded)
            .cloned()
            .unwrap_or_default()
    }

    fn forwarded_features(&self, source: FeatureKey) -> Vec<FeatureKey> {
        self.sources
            .borrow()
            .iter()
            .filter(|(_, sources)| sources.contains(&source))
            .map(|(forwarded, _)| *forwarded)
            .collect()
    }
}
