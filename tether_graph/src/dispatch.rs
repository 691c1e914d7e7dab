// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Feature-slot event dispatch: entitlement, press latching, and preemption.
//!
//! ## Entitlement and latching
//!
//! A press is delivered to the tool currently *entitled* to the feature: the
//! tool grabbing the device if any, else the tool the slot is statically
//! bound to. Delivery latches the slot's owner for the full press/release
//! cycle, so the matching release goes to the same tool even if intervening
//! acquire/release calls changed levels mid-press. Every delivered `down` is
//! paired with exactly one `up` to the same tool.
//!
//! ## Preemption
//!
//! Two sources suppress a slot:
//! - the injected kill-zone predicate (a geometric test owned by the
//!   interaction layer; this module only honors its boolean answer): a press
//!   over a killed feature is never delivered, and the matching release is
//!   swallowed;
//! - a grab transfer: when a tool grabs a device mid-press, in-flight presses
//!   latched to other tools are closed with a forced `button_up`, and the
//!   eventual raw release is swallowed.
//!
//! Either way, no tool ever sees an unmatched half of a press/release pair.

use crate::error::GraphError;
use crate::graph::InteractionGraph;
use crate::types::{DeviceId, FeatureKey, FeatureKind, SlotFlags, ToolId};

/// What dispatch did with one raw event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    /// Delivered to the given tool.
    Delivered(ToolId),
    /// Suppressed; for a press this also latches the swallow of the matching
    /// release.
    Preempted,
    /// No tool is entitled to the feature (or the edge was redundant); dropped.
    Unclaimed,
}

impl InteractionGraph {
    /// Install or clear the kill-zone predicate.
    ///
    /// The predicate is consulted for every press and valuator change; `true`
    /// means a higher-priority interaction has intercepted the feature.
    pub fn set_kill_zone(&mut self, predicate: Option<fn(FeatureKey) -> bool>) {
        self.kill_zone = predicate;
    }

    /// The tool currently entitled to a feature: the device's tool grabber,
    /// else the slot's static binding.
    pub fn entitled_tool(&self, key: FeatureKey) -> Option<ToolId> {
        if let Some(crate::types::Grabber::Tool(tool)) = self.grabber_of(key.device) {
            return Some(tool);
        }
        self.slot(key)?.bound_tool()
    }

    /// A raw press arrived on a button feature.
    pub fn feature_pressed(&mut self, key: FeatureKey) -> Result<DispatchOutcome, GraphError> {
        debug_assert_eq!(key.kind, FeatureKind::Button, "press on a non-button key");
        if self.slot(key).is_none() {
            return Err(GraphError::UnknownFeature { key });
        }
        let entitled = self.entitled_tool(key);
        let killed = self.kill_zone.is_some_and(|in_zone| in_zone(key));
        {
            let slot = self.slot_mut(key).expect("checked above");
            if slot.owner.is_some() {
                log::trace!("duplicate press on {key:?} dropped");
                return Ok(DispatchOutcome::Unclaimed);
            }
            if killed {
                slot.flags.insert(SlotFlags::PREEMPTED | SlotFlags::IN_KILL_ZONE);
                return Ok(DispatchOutcome::Preempted);
            }
        }
        let Some(tool) = entitled else {
            return Ok(DispatchOutcome::Unclaimed);
        };
        self.slot_mut(key).expect("checked above").owner = Some(tool);
        self.deliver_button_down(tool, key);
        Ok(DispatchOutcome::Delivered(tool))
    }

    /// A raw release arrived on a button feature.
    pub fn feature_released(&mut self, key: FeatureKey) -> Result<DispatchOutcome, GraphError> {
        debug_assert_eq!(key.kind, FeatureKind::Button, "release on a non-button key");
        let Some(slot) = self.slot_mut(key) else {
            return Err(GraphError::UnknownFeature { key });
        };
        if slot.flags.contains(SlotFlags::PREEMPTED) {
            slot.flags
                .remove(SlotFlags::PREEMPTED | SlotFlags::IN_KILL_ZONE);
            return Ok(DispatchOutcome::Preempted);
        }
        let Some(owner) = slot.owner.take() else {
            return Ok(DispatchOutcome::Unclaimed);
        };
        self.deliver_button_up(owner, key);
        Ok(DispatchOutcome::Delivered(owner))
    }

    /// A raw valuator change arrived.
    ///
    /// Valuators have no press cycle and thus no latch; the change goes to the
    /// currently entitled tool unless the kill-zone predicate claims the
    /// feature.
    pub fn feature_valuator_changed(
        &mut self,
        key: FeatureKey,
        value: f64,
    ) -> Result<DispatchOutcome, GraphError> {
        debug_assert_eq!(
            key.kind,
            FeatureKind::Valuator,
            "valuator change on a non-valuator key"
        );
        if self.slot(key).is_none() {
            return Err(GraphError::UnknownFeature { key });
        }
        if self.kill_zone.is_some_and(|in_zone| in_zone(key)) {
            return Ok(DispatchOutcome::Preempted);
        }
        let Some(tool) = self.entitled_tool(key) else {
            return Ok(DispatchOutcome::Unclaimed);
        };
        if let Some(node) = self.tool_node_mut(tool) {
            match node.tool.as_valuator_consumer() {
                Some(consumer) => consumer.valuator_changed(key, value),
                None => log::warn!("tool {tool:?} consumes {key:?} without a valuator capability"),
            }
        }
        Ok(DispatchOutcome::Delivered(tool))
    }

    /// Force-close in-flight presses latched to tools other than `new_grabber`
    /// when their device is grabbed away: the latched owner receives its
    /// matching `button_up` now, and the slot is marked preempted so the
    /// eventual raw release is swallowed.
    pub(crate) fn preempt_latched_slots(&mut self, device: DeviceId, new_grabber: ToolId) {
        let latched: alloc::vec::Vec<(FeatureKey, ToolId)> = self
            .device_node(device)
            .map(|node| {
                node.slots
                    .iter()
                    .filter_map(|slot| {
                        slot.owner
                            .filter(|&owner| owner != new_grabber)
                            .map(|owner| (slot.key, owner))
                    })
                    .collect()
            })
            .unwrap_or_default();
        for (key, owner) in latched {
            let slot = self.slot_mut(key).expect("slot enumerated above");
            slot.owner = None;
            slot.flags.insert(SlotFlags::PREEMPTED);
            log::trace!("press on {key:?} preempted away from {owner:?}");
            self.deliver_button_up(owner, key);
        }
    }

    /// Close every in-flight press latched to `tool` before the tool goes
    /// away, so removal never strands a half-pair.
    pub(crate) fn close_latches_of_tool(&mut self, tool: ToolId) {
        let latched: alloc::vec::Vec<FeatureKey> = self
            .devices_by_level()
            .collect::<alloc::vec::Vec<_>>()
            .into_iter()
            .filter_map(|device| self.device_node(device))
            .flat_map(|node| node.slots.iter())
            .filter(|slot| slot.owner == Some(tool))
            .map(|slot| slot.key)
            .collect();
        for key in latched {
            let slot = self.slot_mut(key).expect("slot enumerated above");
            slot.owner = None;
            slot.flags.remove(SlotFlags::PREEMPTED | SlotFlags::IN_KILL_ZONE);
            self.deliver_button_up(tool, key);
        }
    }

    fn deliver_button_down(&mut self, tool: ToolId, key: FeatureKey) {
        if let Some(node) = self.tool_node_mut(tool) {
            match node.tool.as_button_consumer() {
                Some(consumer) => consumer.button_down(key),
                None => log::warn!("tool {tool:?} consumes {key:?} without a button capability"),
            }
        }
    }

    fn deliver_button_up(&mut self, tool: ToolId, key: FeatureKey) {
        if let Some(node) = self.tool_node_mut(tool) {
            if let Some(consumer) = node.tool.as_button_consumer() {
                consumer.button_up(key);
            }
        }
    }
}
