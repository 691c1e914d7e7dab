// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the binding graph: generational handles, feature keys,
//! slot state, grab state, and the tool capability traits.

use alloc::string::String;
use alloc::vec::Vec;

/// Identifier for a device node in the graph.
///
/// This is a small, copyable handle that stays stable across updates but becomes
/// invalid when the underlying slot is reused.
/// It consists of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On add, a fresh slot is allocated with generation `1`.
/// - On remove, the slot is freed; any existing `DeviceId` that pointed to that slot is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `DeviceId`.
///
/// Stale `DeviceId`s never alias a different live device because the generation must match.
/// Use [`InteractionGraph::is_device_alive`](crate::graph::InteractionGraph::is_device_alive)
/// to check liveness.
///
/// The derived total order (slot index, then generation) exists only so that
/// keys and id sets can be sorted deterministically; it carries no semantic
/// meaning beyond that.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DeviceId(pub(crate) u32, pub(crate) u32);

impl DeviceId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Identifier for a tool node in the graph.
///
/// Same generational semantics as [`DeviceId`]: a slot index plus a generation
/// counter, stale after removal, never aliasing a different live tool.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ToolId(pub(crate) u32, pub(crate) u32);

impl ToolId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Kind of control addressed by a [`FeatureKey`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FeatureKind {
    /// A binary control with press/release edges.
    Button,
    /// A continuous control reporting a scalar value.
    Valuator,
}

/// Identifies one control (a button or a valuator) on one device.
///
/// Immutable, hashable, and totally ordered (device, then kind, then index)
/// so feature sets iterate deterministically.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FeatureKey {
    /// Device the control lives on.
    pub device: DeviceId,
    /// Button or valuator.
    pub kind: FeatureKind,
    /// Index within the device's controls of that kind.
    pub index: u16,
}

impl FeatureKey {
    /// Build a button key on `device`.
    pub const fn button(device: DeviceId, index: u16) -> Self {
        Self {
            device,
            kind: FeatureKind::Button,
            index,
        }
    }

    /// Build a valuator key on `device`.
    pub const fn valuator(device: DeviceId, index: u16) -> Self {
        Self {
            device,
            kind: FeatureKind::Valuator,
            index,
        }
    }
}

bitflags::bitflags! {
    /// Per-slot dispatch state.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SlotFlags: u8 {
        /// The pending press on this slot was suppressed; the matching release
        /// will be swallowed instead of delivered.
        const PREEMPTED    = 0b0000_0001;
        /// The suppression came from the injected kill-zone predicate rather
        /// than a grab transfer.
        const IN_KILL_ZONE = 0b0000_0010;
    }
}

impl Default for SlotFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Per-feature binding and ownership record.
///
/// Exists 1:1 with every live [`FeatureKey`]: created when its device is
/// added, destroyed when the device is removed. The static binding
/// (`bound_tool`) is set when a consuming tool is added; the press latch
/// (`owner`) is held only for the duration of one press/release cycle.
#[derive(Clone, Debug)]
pub struct FeatureSlot {
    /// The feature this slot tracks.
    pub key: FeatureKey,
    pub(crate) bound_tool: Option<ToolId>,
    pub(crate) owner: Option<ToolId>,
    pub(crate) flags: SlotFlags,
}

impl FeatureSlot {
    pub(crate) fn new(key: FeatureKey) -> Self {
        Self {
            key,
            bound_tool: None,
            owner: None,
            flags: SlotFlags::empty(),
        }
    }

    /// Tool statically bound to this feature through its assignment, if any.
    pub fn bound_tool(&self) -> Option<ToolId> {
        self.bound_tool
    }

    /// Tool currently holding the press latch, if a press is in flight.
    pub fn owner(&self) -> Option<ToolId> {
        self.owner
    }

    /// True if the pending press was suppressed and the matching release will
    /// be swallowed.
    pub fn is_preempted(&self) -> bool {
        self.flags.contains(SlotFlags::PREEMPTED)
    }

    /// True if the suppression came from the kill-zone predicate.
    pub fn in_kill_zone(&self) -> bool {
        self.flags.contains(SlotFlags::IN_KILL_ZONE)
    }
}

/// The entity exclusively holding a device.
///
/// A grab, once set, owns all of the device's feature slots.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Grabber {
    /// Reserved sentinel: the raw tracking layer's permanent ownership of a
    /// purely physical device.
    Physical,
    /// A tool holding the device.
    Tool(ToolId),
}

/// What a collaborator hands over when registering a device.
#[derive(Clone, Debug)]
pub struct DeviceSpec {
    /// Stable name used by the persistence surface to re-resolve bindings.
    pub name: String,
    /// Number of button controls.
    pub buttons: u16,
    /// Number of valuator controls.
    pub valuators: u16,
    /// Whether the device is tracked in navigational coordinates.
    pub navigational: bool,
}

impl DeviceSpec {
    /// Describe a device with the given control counts.
    pub fn new(name: impl Into<String>, buttons: u16, valuators: u16) -> Self {
        Self {
            name: name.into(),
            buttons,
            valuators,
            navigational: false,
        }
    }

    /// Mark the device as navigational.
    pub fn navigational(mut self) -> Self {
        self.navigational = true;
        self
    }

    /// Total number of feature slots on the device.
    pub fn feature_count(&self) -> usize {
        usize::from(self.buttons) + usize::from(self.valuators)
    }

    /// Dense slot index of a control, or `None` if out of range.
    ///
    /// Buttons occupy `[0, buttons)`, valuators `[buttons, buttons + valuators)`.
    pub fn slot_index(&self, kind: FeatureKind, index: u16) -> Option<usize> {
        match kind {
            FeatureKind::Button if index < self.buttons => Some(usize::from(index)),
            FeatureKind::Valuator if index < self.valuators => {
                Some(usize::from(self.buttons) + usize::from(index))
            }
            _ => None,
        }
    }

    /// Inverse of [`Self::slot_index`]: the key stored at a dense slot index.
    pub(crate) fn key_at(&self, device: DeviceId, slot: usize) -> FeatureKey {
        if slot < usize::from(self.buttons) {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "slot < buttons, which is a u16"
            )]
            FeatureKey::button(device, slot as u16)
        } else {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "slot - buttons < valuators, which is a u16"
            )]
            FeatureKey::valuator(device, (slot - usize::from(self.buttons)) as u16)
        }
    }
}

/// Button press/release sink.
///
/// One of the closed set of tool capabilities; implement it for tool kinds
/// that consume button features.
pub trait ButtonConsumer {
    /// A press on a consumed button was delivered to this tool.
    fn button_down(&mut self, key: FeatureKey);
    /// The matching release for a previously delivered press.
    fn button_up(&mut self, key: FeatureKey);
}

/// Valuator change sink.
pub trait ValuatorConsumer {
    /// A consumed valuator changed to `value`.
    fn valuator_changed(&mut self, key: FeatureKey, value: f64);
}

/// Forwarding capability for tools that fabricate virtual devices.
///
/// Consulted during [forwarding-chain resolution](crate::resolve) and by
/// collaborators that mirror raw state onto forwarded features.
pub trait DeviceForwarder {
    /// The upstream features a forwarded feature is derived from.
    ///
    /// The first entry is the primary source; chain queries follow it.
    fn source_features(&self, forwarded: FeatureKey) -> Vec<FeatureKey>;

    /// The forwarded features derived from an upstream source feature.
    fn forwarded_features(&self, source: FeatureKey) -> Vec<FeatureKey>;
}

/// An interactive tool as seen by the graph.
///
/// Concrete tool kinds implement the subset of capabilities they need and
/// return them from the `as_*` accessors; the default impls advertise
/// nothing. The resolved input assignment (`consumed_features`) must stay
/// fixed for the lifetime of the tool — the graph snapshots it at add time.
pub trait Tool {
    /// Tool class name, used for diagnostics and by the persistence surface.
    fn class_name(&self) -> &str;

    /// The ordered list of features this tool consumes.
    fn consumed_features(&self) -> &[FeatureKey];

    /// Button capability, if the tool consumes buttons.
    fn as_button_consumer(&mut self) -> Option<&mut dyn ButtonConsumer> {
        None
    }

    /// Valuator capability, if the tool consumes valuators.
    fn as_valuator_consumer(&mut self) -> Option<&mut dyn ValuatorConsumer> {
        None
    }

    /// Forwarding capability, if the tool fabricates virtual devices.
    fn as_forwarder(&self) -> Option<&dyn DeviceForwarder> {
        None
    }
}
