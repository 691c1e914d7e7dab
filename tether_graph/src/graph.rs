// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The graph manager: device/tool arenas, the level table, and the
//! add/remove/acquire/release operations with their re-leveling fixpoint.
//!
//! ## Levels
//!
//! A device's level is defined by its strongest claim: the producing tool's
//! level if it is a fabricated (virtual) device, else the grabbing tool's
//! level, else 0. A tool sits one level above the highest device it consumes
//! (level 1 when it consumes nothing). [`InteractionGraph::rebalance`] restores
//! both rules after every acquire/release by propagating through the affected
//! downstream subgraph only; the producer/consumer relation is kept acyclic at
//! add time, so the fixpoint terminates.
//!
//! ## Grabs
//!
//! A grab transfers exclusive ownership of all of a device's feature slots to
//! the grabber. Physical devices are permanently held by the
//! [`Grabber::Physical`] sentinel from the moment they are added; tools
//! contend only for fabricated devices. Grab conflicts are reported as a
//! boolean, never as a panic or a hard error.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::error::GraphError;
use crate::level::LevelTable;
use crate::types::{DeviceId, DeviceSpec, FeatureKey, FeatureKind, FeatureSlot, Grabber, Tool, ToolId};

pub(crate) struct DeviceNode {
    pub(crate) generation: u32,
    pub(crate) spec: DeviceSpec,
    pub(crate) level: u32,
    pub(crate) grabber: Option<Grabber>,
    pub(crate) producer: Option<ToolId>,
    pub(crate) slots: Vec<FeatureSlot>,
}

pub(crate) struct ToolNode {
    pub(crate) generation: u32,
    pub(crate) tool: Box<dyn Tool>,
    pub(crate) level: u32,
    pub(crate) consumed: SmallVec<[FeatureKey; 8]>,
    pub(crate) produced: Vec<DeviceId>,
}

/// The binding graph between input devices and interactive tools.
///
/// One instance per running application, explicitly constructed and owned by
/// the application's run loop; collaborators receive it by reference. All
/// mutation happens synchronously on one thread, so the graph carries no
/// internal locking.
pub struct InteractionGraph {
    devices: Vec<Option<DeviceNode>>,
    device_generations: Vec<u32>,
    device_free: Vec<usize>,
    tools: Vec<Option<ToolNode>>,
    tool_generations: Vec<u32>,
    tool_free: Vec<usize>,
    pub(crate) levels: LevelTable,
    names: BTreeMap<String, DeviceId>,
    pub(crate) kill_zone: Option<fn(FeatureKey) -> bool>,
}

impl Default for InteractionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InteractionGraph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let live_devices = self.devices.iter().filter(|d| d.is_some()).count();
        let live_tools = self.tools.iter().filter(|t| t.is_some()).count();
        f.debug_struct("InteractionGraph")
            .field("devices_alive", &live_devices)
            .field("tools_alive", &live_tools)
            .field("levels", &self.levels.level_count())
            .finish_non_exhaustive()
    }
}

impl InteractionGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            device_generations: Vec::new(),
            device_free: Vec::new(),
            tools: Vec::new(),
            tool_generations: Vec::new(),
            tool_free: Vec::new(),
            levels: LevelTable::default(),
            names: BTreeMap::new(),
            kill_zone: None,
        }
    }

    // --- device lifecycle ---

    /// Register a physical input device at level 0.
    ///
    /// The device is permanently grabbed by [`Grabber::Physical`]: the raw
    /// tracking layer owns it, and tools contend only for fabricated devices.
    /// Device names must be unique; a duplicate is registered under a
    /// `#n`-suffixed name with a warning, so the persistence surface keeps
    /// resolving the original holder.
    pub fn add_device(&mut self, spec: DeviceSpec) -> DeviceId {
        let id = self.alloc_device(spec, 0, Some(Grabber::Physical), None);
        self.levels.attach_device(id, 0);
        log::debug!("added physical device {id:?}");
        id
    }

    /// Register a virtual device fabricated by `producer`.
    ///
    /// The device's level is pinned to the producer's level for as long as
    /// both live: every re-level of the producer is pushed onto it. It is
    /// born ungrabbed, so a downstream tool may acquire it.
    pub fn add_virtual_device(
        &mut self,
        producer: ToolId,
        spec: DeviceSpec,
    ) -> Result<DeviceId, GraphError> {
        let level = self
            .tool_node(producer)
            .ok_or(GraphError::StaleHandle)?
            .level;
        let id = self.alloc_device(spec, level, None, Some(producer));
        self.levels.attach_device(id, level);
        self.tool_node_mut(producer)
            .expect("liveness checked above")
            .produced
            .push(id);
        log::debug!("tool {producer:?} fabricated device {id:?} at level {level}");
        Ok(id)
    }

    /// Remove a device.
    ///
    /// Fails with [`GraphError::DanglingReference`] — leaving the graph
    /// unchanged — while any live tool still consumes one of its features;
    /// remove the consuming tools first.
    pub fn remove_device(&mut self, id: DeviceId) -> Result<(), GraphError> {
        if !self.is_device_alive(id) {
            return Err(GraphError::StaleHandle);
        }
        if let Some(consumer) = self.consumers_of_device(id).first() {
            log::warn!("device {id:?} removed while still consumed by tool {consumer:?}");
            return Err(GraphError::DanglingReference { device: id });
        }
        if let Some(producer) = self.device_node(id).and_then(|d| d.producer) {
            if let Some(node) = self.tool_node_mut(producer) {
                node.produced.retain(|d| *d != id);
            }
        }
        self.retract_device(id);
        self.levels.trim();
        Ok(())
    }

    // --- tool lifecycle ---

    /// Add a tool with its resolved input assignment.
    ///
    /// Validates the assignment before linking: every consumed feature must
    /// exist ([`GraphError::UnknownFeature`]) and must not close a loop in the
    /// producer/consumer relation ([`GraphError::CyclicAssignment`]). Slots
    /// that are still unbound are bound to the new tool; features already
    /// bound elsewhere stay with their first binder, and this tool can only
    /// reach them by grabbing the device.
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) -> Result<ToolId, GraphError> {
        let consumed: SmallVec<[FeatureKey; 8]> =
            tool.consumed_features().iter().copied().collect();
        for &key in &consumed {
            if self.slot(key).is_none() {
                return Err(GraphError::UnknownFeature { key });
            }
        }
        for &key in &consumed {
            let mut path = Vec::new();
            if self.device_chain_has_cycle(key.device, &mut path) {
                return Err(GraphError::CyclicAssignment { key });
            }
        }
        let level = self.level_over_consumed(consumed.iter(), None);
        let id = self.alloc_tool(tool, level, consumed.clone());
        for &key in &consumed {
            let slot = self.slot_mut(key).expect("validated above");
            if slot.bound_tool.is_none() {
                slot.bound_tool = Some(id);
            }
        }
        self.levels.attach_tool(id, level);
        log::debug!("added tool {id:?} at level {level}");
        Ok(id)
    }

    /// Remove a tool.
    ///
    /// Releases every device the tool grabs and retracts every virtual device
    /// it produced. Fails with [`GraphError::DanglingReference`] — before any
    /// mutation — if another live tool still consumes one of those produced
    /// devices; a produced device merely *grabbed* by another tool is
    /// retracted anyway, with the foreign grab released and its in-flight
    /// presses closed. Presses latched to the tool itself are closed with a
    /// final `button_up` so no half-pair is left behind.
    pub fn remove_tool(&mut self, id: ToolId) -> Result<(), GraphError> {
        let Some(node) = self.tool_node(id) else {
            return Err(GraphError::StaleHandle);
        };
        let produced = node.produced.clone();
        let consumed = node.consumed.clone();
        for &device in &produced {
            if let Some(consumer) = self.consumers_of_device(device).first() {
                log::warn!(
                    "tool {id:?} removed while its device {device:?} is consumed by {consumer:?}"
                );
                return Err(GraphError::DanglingReference { device });
            }
        }

        self.close_latches_of_tool(id);
        let grabbed: Vec<DeviceId> = self
            .live_devices()
            .filter(|&d| self.grabber_of(d) == Some(Grabber::Tool(id)))
            .collect();
        for device in grabbed {
            let released = self.release_device(device, Grabber::Tool(id));
            debug_assert!(released, "grab scan and release disagree");
        }
        for device in produced.into_iter().rev() {
            // Another live tool may hold a grab on the device without
            // consuming it; close its in-flight presses and drop the grab
            // before the device goes away.
            if let Some(Grabber::Tool(holder)) = self.grabber_of(device) {
                if holder != id {
                    log::warn!("device {device:?} retracted out of a live grab by {holder:?}");
                    self.preempt_latched_slots(device, id);
                    let released = self.release_device(device, Grabber::Tool(holder));
                    debug_assert!(released, "grab scan and release disagree");
                }
            }
            self.retract_device(device);
        }
        for key in consumed {
            if let Some(slot) = self.slot_mut(key) {
                if slot.bound_tool == Some(id) {
                    slot.bound_tool = None;
                }
            }
        }
        let level = self
            .tool_node(id)
            .expect("liveness checked above")
            .level;
        self.levels.detach_tool(id, level);
        self.tools[id.idx()] = None;
        self.tool_free.push(id.idx());
        self.levels.trim();
        log::debug!("removed tool {id:?}");
        Ok(())
    }

    // --- acquire/release ---

    /// Grab a device for `grabber`.
    ///
    /// Returns `false` — with the graph untouched — if the device is stale,
    /// already held by a *different* grabber, or the grab would make the
    /// grabbing tool's level depend on the device's own level (a loop no
    /// re-leveling fixpoint could settle); `true` if the grab was taken or
    /// was already held by the same grabber. A fresh grab re-levels the
    /// affected downstream subgraph and force-releases in-flight presses
    /// latched to other tools (their slots become preempted, so the eventual
    /// raw release is swallowed).
    pub fn acquire_device(&mut self, device: DeviceId, grabber: Grabber) -> bool {
        let Some(node) = self.device_node(device) else {
            log::warn!("acquire on stale device {device:?}");
            return false;
        };
        match node.grabber {
            Some(current) if current == grabber => true,
            Some(_) => false,
            None => {
                if let Grabber::Tool(tool) = grabber {
                    if !self.is_tool_alive(tool) {
                        log::warn!("acquire of {device:?} by stale tool {tool:?}");
                        return false;
                    }
                    // A producer claim pins the device's level, so only a
                    // grab on a non-produced device adds a level dependency.
                    if node.producer.is_none() && self.grab_would_close_level_loop(device, tool) {
                        log::warn!("grab of {device:?} by {tool:?} would close a level loop");
                        return false;
                    }
                }
                self.device_node_mut(device)
                    .expect("liveness checked above")
                    .grabber = Some(grabber);
                log::debug!("device {device:?} grabbed by {grabber:?}");
                if let Grabber::Tool(tool) = grabber {
                    self.preempt_latched_slots(device, tool);
                }
                self.rebalance(device);
                true
            }
        }
    }

    /// Release a grab.
    ///
    /// A no-op returning `false` when `grabber` does not currently hold the
    /// device; otherwise clears the grab and re-levels.
    pub fn release_device(&mut self, device: DeviceId, grabber: Grabber) -> bool {
        let Some(node) = self.device_node_mut(device) else {
            log::warn!("release on stale device {device:?}");
            return false;
        };
        if node.grabber != Some(grabber) {
            log::trace!("release of {device:?} by non-grabber {grabber:?}");
            return false;
        }
        node.grabber = None;
        log::debug!("device {device:?} released by {grabber:?}");
        self.rebalance(device);
        true
    }

    /// [`Self::acquire_device`] with a uniform error channel.
    pub fn try_acquire(&mut self, device: DeviceId, grabber: Grabber) -> Result<(), GraphError> {
        if !self.is_device_alive(device) {
            return Err(GraphError::StaleHandle);
        }
        if self.acquire_device(device, grabber) {
            Ok(())
        } else {
            Err(GraphError::AlreadyGrabbed { device })
        }
    }

    /// [`Self::release_device`] with a uniform error channel.
    pub fn try_release(&mut self, device: DeviceId, grabber: Grabber) -> Result<(), GraphError> {
        if !self.is_device_alive(device) {
            return Err(GraphError::StaleHandle);
        }
        if self.release_device(device, grabber) {
            Ok(())
        } else {
            Err(GraphError::NotGrabber { device })
        }
    }

    // --- queries ---

    /// True if `id` refers to a live device (slot exists and generation matches).
    pub fn is_device_alive(&self, id: DeviceId) -> bool {
        self.devices
            .get(id.idx())
            .and_then(|d| d.as_ref())
            .is_some_and(|d| d.generation == id.1)
    }

    /// True if `id` refers to a live tool.
    pub fn is_tool_alive(&self, id: ToolId) -> bool {
        self.tools
            .get(id.idx())
            .and_then(|t| t.as_ref())
            .is_some_and(|t| t.generation == id.1)
    }

    /// Current grabber of a device, if any.
    pub fn grabber_of(&self, id: DeviceId) -> Option<Grabber> {
        self.device_node(id).and_then(|d| d.grabber)
    }

    /// True if the device is currently grabbed by a tool.
    pub fn is_grabbed(&self, id: DeviceId) -> bool {
        matches!(self.grabber_of(id), Some(Grabber::Tool(_)))
    }

    /// True if the device is held by the physical-layer sentinel.
    pub fn is_physical(&self, id: DeviceId) -> bool {
        self.grabber_of(id) == Some(Grabber::Physical)
    }

    /// True if the device is tracked in navigational coordinates.
    pub fn is_navigational(&self, id: DeviceId) -> bool {
        self.device_node(id).is_some_and(|d| d.spec.navigational)
    }

    /// Level of a live device.
    pub fn device_level(&self, id: DeviceId) -> Option<u32> {
        self.device_node(id).map(|d| d.level)
    }

    /// Level of a live tool.
    pub fn tool_level(&self, id: ToolId) -> Option<u32> {
        self.tool_node(id).map(|t| t.level)
    }

    /// The tool that fabricated a device, if it is virtual.
    pub fn producer_of(&self, id: DeviceId) -> Option<ToolId> {
        self.device_node(id).and_then(|d| d.producer)
    }

    /// Name a device was registered under.
    pub fn device_name(&self, id: DeviceId) -> Option<&str> {
        self.device_node(id).map(|d| d.spec.name.as_str())
    }

    /// Look up a device by its registered name.
    pub fn device_by_name(&self, name: &str) -> Option<DeviceId> {
        self.names.get(name).copied()
    }

    /// Re-resolve a recorded binding by device name, as the persistence
    /// surface replays tools in recorded order.
    pub fn feature_by_name(
        &self,
        name: &str,
        kind: FeatureKind,
        index: u16,
    ) -> Result<FeatureKey, GraphError> {
        let device = self
            .device_by_name(name)
            .ok_or_else(|| GraphError::UnknownDevice { name: name.into() })?;
        let key = FeatureKey {
            device,
            kind,
            index,
        };
        if self.slot(key).is_none() {
            return Err(GraphError::UnknownFeature { key });
        }
        Ok(key)
    }

    /// Read-only view of a feature's slot.
    pub fn slot(&self, key: FeatureKey) -> Option<&FeatureSlot> {
        let node = self.device_node(key.device)?;
        let idx = node.spec.slot_index(key.kind, key.index)?;
        node.slots.get(idx)
    }

    /// Borrow a live tool.
    pub fn tool(&self, id: ToolId) -> Option<&dyn Tool> {
        self.tool_node(id).map(|t| &*t.tool)
    }

    /// Borrow a live tool mutably.
    pub fn tool_mut(&mut self, id: ToolId) -> Option<&mut (dyn Tool + '_)> {
        // Not a `map`: the closure would pin the boxed trait object to
        // `'static` instead of reborrowing it.
        match self.tool_node_mut(id) {
            Some(node) => Some(&mut *node.tool),
            None => None,
        }
    }

    /// The snapshot of the assignment a tool was added with.
    pub fn consumed_features_of(&self, id: ToolId) -> Option<&[FeatureKey]> {
        self.tool_node(id).map(|t| t.consumed.as_slice())
    }

    /// Devices fabricated by a tool, in creation order.
    pub fn produced_devices_of(&self, id: ToolId) -> Option<&[DeviceId]> {
        self.tool_node(id).map(|t| t.produced.as_slice())
    }

    /// Devices level 0 upward, insertion order within a level.
    ///
    /// Values are per-frame-valid ids, not handles into internal structure.
    pub fn devices_by_level(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.levels.devices()
    }

    /// Tools level 1 upward, insertion order within a level.
    pub fn tools_by_level(&self) -> impl Iterator<Item = ToolId> + '_ {
        self.levels.tools()
    }

    /// One past the highest occupied level.
    pub fn level_count(&self) -> usize {
        self.levels.level_count()
    }

    // --- re-leveling fixpoint ---

    /// Restore the level rules after `changed` gained or lost a claim.
    ///
    /// Worklist fixpoint: recompute the changed device, then every tool
    /// consuming one of its features; a re-leveled tool pushes the devices
    /// whose level it defines (produced and grabbed) back onto the worklist.
    /// Only the downstream subgraph of the change is touched, and the
    /// producer/consumer relation is acyclic, so this terminates.
    fn rebalance(&mut self, changed: DeviceId) {
        let mut work: Vec<DeviceId> = alloc::vec![changed];
        while let Some(device) = work.pop() {
            if !self.is_device_alive(device) {
                continue;
            }
            let target = self.device_target_level(device);
            let current = self.device_node(device).expect("checked alive").level;
            if target != current {
                self.levels.detach_device(device, current);
                self.device_node_mut(device).expect("checked alive").level = target;
                self.levels.attach_device(device, target);
                log::trace!("device {device:?} re-leveled {current} -> {target}");
            }
            for tool in self.consumers_of_device(device) {
                let new_level = self.compute_tool_level(tool);
                let old_level = self.tool_node(tool).expect("consumer is live").level;
                if new_level == old_level {
                    continue;
                }
                self.levels.detach_tool(tool, old_level);
                self.tool_node_mut(tool).expect("consumer is live").level = new_level;
                self.levels.attach_tool(tool, new_level);
                log::trace!("tool {tool:?} re-leveled {old_level} -> {new_level}");
                let node = self.tool_node(tool).expect("consumer is live");
                work.extend(node.produced.iter().copied());
                let grabbed: Vec<DeviceId> = self
                    .live_devices()
                    .filter(|&d| self.grabber_of(d) == Some(Grabber::Tool(tool)))
                    .collect();
                work.extend(grabbed);
            }
        }
        self.levels.trim();
    }

    /// The level a device's current claims demand.
    fn device_target_level(&self, id: DeviceId) -> u32 {
        let node = self.device_node(id).expect("caller checked liveness");
        if let Some(producer) = node.producer {
            return self.tool_node(producer).map_or(0, |t| t.level);
        }
        match node.grabber {
            Some(Grabber::Tool(tool)) => self.tool_node(tool).map_or(0, |t| t.level),
            _ => 0,
        }
    }

    /// `1 + max(level of consumed devices)`, or 1 when nothing is consumed.
    pub(crate) fn compute_tool_level(&self, id: ToolId) -> u32 {
        let Some(node) = self.tool_node(id) else {
            return 1;
        };
        self.level_over_consumed(node.consumed.iter(), Some(id))
    }

    fn level_over_consumed<'a>(
        &self,
        keys: impl Iterator<Item = &'a FeatureKey>,
        tool: Option<ToolId>,
    ) -> u32 {
        let mut max = 0;
        for key in keys {
            let Some(device) = self.device_node(key.device) else {
                continue;
            };
            // A non-produced device grabbed by this very tool rides at the
            // tool's own level; feeding it back into the max would never
            // reach a fixpoint.
            if let Some(id) = tool {
                if device.producer.is_none() && device.grabber == Some(Grabber::Tool(id)) {
                    continue;
                }
            }
            max = max.max(device.level);
        }
        max + 1
    }

    /// True if granting `tool` the grab on `device` would make the tool's
    /// level depend, transitively, on the device's own level.
    ///
    /// A direct self-grab is exempt: [`Self::compute_tool_level`] already
    /// excludes it. Anything longer (two tools grabbing each other's consumed
    /// devices) has no settling point and must be refused up front.
    fn grab_would_close_level_loop(&self, device: DeviceId, tool: ToolId) -> bool {
        let mut visited = Vec::new();
        self.level_depends_on_device(tool, device, tool, &mut visited)
    }

    /// Walk the level-dependency relation from `current` with the proposed
    /// grab of `target` by `grabber` applied.
    fn level_depends_on_device(
        &self,
        current: ToolId,
        target: DeviceId,
        grabber: ToolId,
        visited: &mut Vec<ToolId>,
    ) -> bool {
        if visited.contains(&current) {
            return false;
        }
        visited.push(current);
        let Some(node) = self.tool_node(current) else {
            return false;
        };
        for key in &node.consumed {
            let Some(dev) = self.device_node(key.device) else {
                continue;
            };
            let held_by = if key.device == target && dev.producer.is_none() {
                Some(Grabber::Tool(grabber))
            } else {
                dev.grabber
            };
            // Mirror the fixpoint's self-grab exclusion.
            if dev.producer.is_none() && held_by == Some(Grabber::Tool(current)) {
                continue;
            }
            if key.device == target {
                return true;
            }
            let owner = dev.producer.or(match held_by {
                Some(Grabber::Tool(t)) => Some(t),
                _ => None,
            });
            if let Some(owner) = owner {
                if self.level_depends_on_device(owner, target, grabber, visited) {
                    return true;
                }
            }
        }
        false
    }

    /// Path-tracking walk up the producer/grabber chain; true if a tool is
    /// revisited along the current path.
    fn device_chain_has_cycle(&self, device: DeviceId, path: &mut Vec<ToolId>) -> bool {
        let Some(tool) = self.owning_tool_of_device(device) else {
            return false;
        };
        if path.contains(&tool) {
            return true;
        }
        path.push(tool);
        let mut found = false;
        if let Some(node) = self.tool_node(tool) {
            for key in &node.consumed {
                if self.device_chain_has_cycle(key.device, path) {
                    found = true;
                    break;
                }
            }
        }
        path.pop();
        found
    }

    /// The tool a device's features are forwarded through: its producer, else
    /// its tool grabber.
    pub(crate) fn owning_tool_of_device(&self, id: DeviceId) -> Option<ToolId> {
        let node = self.device_node(id)?;
        if let Some(producer) = node.producer {
            return Some(producer);
        }
        match node.grabber {
            Some(Grabber::Tool(tool)) => Some(tool),
            _ => None,
        }
    }

    // --- internals ---

    pub(crate) fn device_node(&self, id: DeviceId) -> Option<&DeviceNode> {
        let node = self.devices.get(id.idx())?.as_ref()?;
        (node.generation == id.1).then_some(node)
    }

    pub(crate) fn device_node_mut(&mut self, id: DeviceId) -> Option<&mut DeviceNode> {
        let node = self.devices.get_mut(id.idx())?.as_mut()?;
        (node.generation == id.1).then_some(node)
    }

    pub(crate) fn tool_node(&self, id: ToolId) -> Option<&ToolNode> {
        let node = self.tools.get(id.idx())?.as_ref()?;
        (node.generation == id.1).then_some(node)
    }

    pub(crate) fn tool_node_mut(&mut self, id: ToolId) -> Option<&mut ToolNode> {
        let node = self.tools.get_mut(id.idx())?.as_mut()?;
        (node.generation == id.1).then_some(node)
    }

    pub(crate) fn slot_mut(&mut self, key: FeatureKey) -> Option<&mut FeatureSlot> {
        let node = self.device_node_mut(key.device)?;
        let idx = node.spec.slot_index(key.kind, key.index)?;
        node.slots.get_mut(idx)
    }

    /// Live tools with at least one consumed feature on `device`, arena order.
    pub(crate) fn consumers_of_device(&self, device: DeviceId) -> Vec<ToolId> {
        let mut out = Vec::new();
        for (idx, slot) in self.tools.iter().enumerate() {
            let Some(node) = slot else { continue };
            if node.consumed.iter().any(|k| k.device == device) {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "ids use 32-bit indices by design"
                )]
                out.push(ToolId::new(idx as u32, node.generation));
            }
        }
        out
    }

    fn live_devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref().map(|node| {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "ids use 32-bit indices by design"
                )]
                DeviceId::new(idx as u32, node.generation)
            })
        })
    }

    fn alloc_device(
        &mut self,
        mut spec: DeviceSpec,
        level: u32,
        grabber: Option<Grabber>,
        producer: Option<ToolId>,
    ) -> DeviceId {
        if self.names.contains_key(&spec.name) {
            let base = spec.name.clone();
            let mut n = 2_u32;
            while self.names.contains_key(&alloc::format!("{base}#{n}")) {
                n += 1;
            }
            spec.name = alloc::format!("{base}#{n}");
            log::warn!("device name `{base}` is already registered; using `{}`", spec.name);
        }
        let (idx, generation) = if let Some(idx) = self.device_free.pop() {
            let generation = self.device_generations[idx].saturating_add(1);
            self.device_generations[idx] = generation;
            (idx, generation)
        } else {
            self.devices.push(None);
            self.device_generations.push(1);
            (self.devices.len() - 1, 1)
        };
        #[allow(
            clippy::cast_possible_truncation,
            reason = "ids use 32-bit indices by design"
        )]
        let id = DeviceId::new(idx as u32, generation);
        let slots = (0..spec.feature_count())
            .map(|slot| FeatureSlot::new(spec.key_at(id, slot)))
            .collect();
        self.names.insert(spec.name.clone(), id);
        self.devices[idx] = Some(DeviceNode {
            generation,
            spec,
            level,
            grabber,
            producer,
            slots,
        });
        id
    }

    fn alloc_tool(
        &mut self,
        tool: Box<dyn Tool>,
        level: u32,
        consumed: SmallVec<[FeatureKey; 8]>,
    ) -> ToolId {
        let (idx, generation) = if let Some(idx) = self.tool_free.pop() {
            let generation = self.tool_generations[idx].saturating_add(1);
            self.tool_generations[idx] = generation;
            (idx, generation)
        } else {
            self.tools.push(None);
            self.tool_generations.push(1);
            (self.tools.len() - 1, 1)
        };
        self.tools[idx] = Some(ToolNode {
            generation,
            tool,
            level,
            consumed,
            produced: Vec::new(),
        });
        #[allow(
            clippy::cast_possible_truncation,
            reason = "ids use 32-bit indices by design"
        )]
        ToolId::new(idx as u32, generation)
    }

    /// Drop a device the caller has already verified to be unconsumed.
    fn retract_device(&mut self, id: DeviceId) {
        let (level, name) = {
            let node = self
                .device_node(id)
                .expect("retract of a checked-live device");
            (node.level, node.spec.name.clone())
        };
        self.names.remove(&name);
        self.levels.detach_device(id, level);
        self.devices[id.idx()] = None;
        self.device_free.push(id.idx());
        log::debug!("removed device {id:?}");
    }
}
