// Copyright 2026 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-frame pump: collapse staged samples into edges and dispatch them
//! in level order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tether_graph::{DispatchOutcome, FeatureKey, FeatureKind, InteractionGraph};

use crate::snapshot::{FeatureSample, SampleMailbox, SampleValue};

/// Per-frame dispatch counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
    /// Samples drained from the mailbox this frame.
    pub samples: usize,
    /// Edges delivered to a tool.
    pub delivered: usize,
    /// Edges swallowed by preemption or the kill zone.
    pub preempted: usize,
    /// Edges with no entitled tool.
    pub unclaimed: usize,
    /// Samples dropped because their feature no longer exists, or because
    /// their value kind does not match the feature.
    pub dropped: usize,
}

impl FrameStats {
    fn tally(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered(_) => self.delivered += 1,
            DispatchOutcome::Preempted => self.preempted += 1,
            DispatchOutcome::Unclaimed => self.unclaimed += 1,
        }
    }
}

/// Drives [`InteractionGraph`] dispatch from staged samples, once per frame.
///
/// The pump holds the previous per-feature state, so raw samples collapse
/// into state *edges*: a button sample dispatches only when it differs from
/// the last seen state, valuator runs collapse to their final value, and a
/// full click inside one frame still dispatches down-then-up.
#[derive(Debug, Default)]
pub struct FramePump {
    mailbox: Arc<SampleMailbox>,
    buttons: BTreeMap<FeatureKey, bool>,
    valuators: BTreeMap<FeatureKey, f64>,
}

impl FramePump {
    /// Create a pump with a fresh, empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for adapter threads to stage samples into.
    pub fn mailbox(&self) -> Arc<SampleMailbox> {
        self.mailbox.clone()
    }

    /// Drain the mailbox and dispatch the collapsed edges.
    ///
    /// Features are processed in the graph's level order: devices level 0
    /// upward, key order within a device, so upstream raw features are always
    /// dispatched before the forwarded features derived from them. Within one
    /// feature, edges keep their arrival order.
    pub fn run_frame(&mut self, graph: &mut InteractionGraph) -> FrameStats {
        let staged = self.mailbox.drain();
        let mut stats = FrameStats {
            samples: staged.len(),
            ..FrameStats::default()
        };

        let mut runs: BTreeMap<FeatureKey, Vec<SampleValue>> = BTreeMap::new();
        for FeatureSample { key, value } in staged {
            runs.entry(key).or_default().push(value);
        }
        let mut ordered: Vec<(FeatureKey, Vec<SampleValue>)> = runs.into_iter().collect();
        // Stale keys sort last and get dropped at dispatch.
        ordered.sort_by_key(|(key, _)| (graph.device_level(key.device).unwrap_or(u32::MAX), *key));

        for (key, run) in ordered {
            match key.kind {
                FeatureKind::Button => self.pump_button(graph, key, run, &mut stats),
                FeatureKind::Valuator => self.pump_valuator(graph, key, run, &mut stats),
            }
        }
        stats
    }

    fn pump_button(
        &mut self,
        graph: &mut InteractionGraph,
        key: FeatureKey,
        run: Vec<SampleValue>,
        stats: &mut FrameStats,
    ) {
        let mut state = self.buttons.get(&key).copied().unwrap_or(false);
        let mut iter = run.into_iter();
        while let Some(value) = iter.next() {
            let SampleValue::Button(pressed) = value else {
                log::warn!("valuator sample staged for button feature {key:?}");
                stats.dropped += 1;
                continue;
            };
            if pressed == state {
                continue;
            }
            let outcome = if pressed {
                graph.feature_pressed(key)
            } else {
                graph.feature_released(key)
            };
            match outcome {
                Ok(outcome) => {
                    state = pressed;
                    stats.tally(outcome);
                }
                Err(err) => {
                    log::warn!("dropping button samples for {key:?}: {err}");
                    stats.dropped += 1 + iter.len();
                    self.buttons.remove(&key);
                    return;
                }
            }
        }
        self.buttons.insert(key, state);
    }

    fn pump_valuator(
        &mut self,
        graph: &mut InteractionGraph,
        key: FeatureKey,
        run: Vec<SampleValue>,
        stats: &mut FrameStats,
    ) {
        let mut last = None;
        for value in run {
            match value {
                SampleValue::Valuator(v) => last = Some(v),
                SampleValue::Button(_) => {
                    log::warn!("button sample staged for valuator feature {key:?}");
                    stats.dropped += 1;
                }
            }
        }
        let Some(value) = last else { return };
        if self.valuators.get(&key) == Some(&value) {
            return;
        }
        match graph.feature_valuator_changed(key, value) {
            Ok(outcome) => {
                self.valuators.insert(key, value);
                stats.tally(outcome);
            }
            Err(err) => {
                log::warn!("dropping valuator sample for {key:?}: {err}");
                stats.dropped += 1;
                self.valuators.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread;

    use tether_graph::{ButtonConsumer, DeviceSpec, Tool, ToolId, ValuatorConsumer};

    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Seen {
        Down(&'static str, FeatureKey),
        Up(&'static str, FeatureKey),
        Valuator(&'static str, FeatureKey, f64),
    }

    type Log = Rc<RefCell<Vec<Seen>>>;

    struct LogTool {
        tag: &'static str,
        consumed: Vec<FeatureKey>,
        log: Log,
    }

    impl Tool for LogTool {
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
    }

    impl ButtonConsumer for LogTool {
        fn button_down(&mut self, key: FeatureKey) {
            self.log.borrow_mut().push(Seen::Down(self.tag, key));
        }

        fn button_up(&mut self, key: FeatureKey) {
            self.log.borrow_mut().push(Seen::Up(self.tag, key));
        }
    }

    impl ValuatorConsumer for LogTool {
        fn valuator_changed(&mut self, key: FeatureKey, value: f64) {
            self.log.borrow_mut().push(Seen::Valuator(self.tag, key, value));
        }
    }

    fn wand_with_tool(graph: &mut InteractionGraph, log: &Log) -> (FeatureKey, FeatureKey, ToolId) {
        let p = graph.add_device(DeviceSpec::new("wand", 1, 1));
        let button = FeatureKey::button(p, 0);
        let valuator = FeatureKey::valuator(p, 0);
        let tool = graph
            .add_tool(Box::new(LogTool {
                tag: "t",
                consumed: vec![button, valuator],
                log: log.clone(),
            }))
            .unwrap();
        (button, valuator, tool)
    }

    fn button_sample(key: FeatureKey, pressed: bool) -> FeatureSample {
        FeatureSample {
            key,
            value: SampleValue::Button(pressed),
        }
    }

    #[test]
    fn click_within_one_frame_dispatches_down_then_up() {
        let log = Log::default();
        let mut graph = InteractionGraph::new();
        let (button, _, _) = wand_with_tool(&mut graph, &log);
        let mut pump = FramePump::new();

        pump.mailbox().push(button_sample(button, true));
        pump.mailbox().push(button_sample(button, false));
        let stats = pump.run_frame(&mut graph);

        assert_eq!(stats.samples, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(
            *log.borrow(),
            vec![Seen::Down("t", button), Seen::Up("t", button)]
        );
    }

    #[test]
    fn repeated_state_samples_collapse_and_presses_pair_across_frames() {
        let log = Log::default();
        let mut graph = InteractionGraph::new();
        let (button, _, _) = wand_with_tool(&mut graph, &log);
        let mut pump = FramePump::new();

        for _ in 0..3 {
            pump.mailbox().push(button_sample(button, true));
        }
        let stats = pump.run_frame(&mut graph);
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.delivered, 1);

        // An empty frame changes nothing.
        assert_eq!(pump.run_frame(&mut graph), FrameStats::default());

        pump.mailbox().push(button_sample(button, false));
        let stats = pump.run_frame(&mut graph);
        assert_eq!(stats.delivered, 1);
        assert_eq!(
            *log.borrow(),
            vec![Seen::Down("t", button), Seen::Up("t", button)]
        );
    }

    #[test]
    fn valuator_runs_collapse_to_the_final_value() {
        let log = Log::default();
        let mut graph = InteractionGraph::new();
        let (_, valuator, _) = wand_with_tool(&mut graph, &log);
        let mut pump = FramePump::new();

        for v in [0.2, 0.4, 0.9] {
            pump.mailbox().push(FeatureSample {
                key: valuator,
                value: SampleValue::Valuator(v),
            });
        }
        let stats = pump.run_frame(&mut graph);
        assert_eq!(stats.delivered, 1);
        assert_eq!(*log.borrow(), vec![Seen::Valuator("t", valuator, 0.9)]);

        // An unchanged value does not re-dispatch.
        pump.mailbox().push(FeatureSample {
            key: valuator,
            value: SampleValue::Valuator(0.9),
        });
        assert_eq!(pump.run_frame(&mut graph).delivered, 0);
    }

    #[test]
    fn adapter_threads_hand_off_through_the_mailbox() {
        let log = Log::default();
        let mut graph = InteractionGraph::new();
        let (button, valuator, _) = wand_with_tool(&mut graph, &log);
        let mut pump = FramePump::new();

        let handles: Vec<_> = [
            FeatureSample {
                key: button,
                value: SampleValue::Button(true),
            },
            FeatureSample {
                key: valuator,
                value: SampleValue::Valuator(0.5),
            },
        ]
        .into_iter()
        .map(|sample| {
            let mailbox = pump.mailbox();
            thread::spawn(move || mailbox.push(sample))
        })
        .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pump.run_frame(&mut graph);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.delivered, 2);
    }

    #[test]
    fn upstream_devices_dispatch_before_forwarded_ones() {
        let log = Log::default();
        let mut graph = InteractionGraph::new();
        let (button, _, t) = wand_with_tool(&mut graph, &log);
        // A virtual device one level up, consumed by a second tool.
        let v = graph
            .add_virtual_device(t, DeviceSpec::new("wand-forwarded", 1, 0))
            .unwrap();
        let forwarded = FeatureKey::button(v, 0);
        graph
            .add_tool(Box::new(LogTool {
                tag: "up",
                consumed: vec![forwarded],
                log: log.clone(),
            }))
            .unwrap();
        let mut pump = FramePump::new();

        // Staged out of order; the pump re-orders by level.
        pump.mailbox().push(button_sample(forwarded, true));
        pump.mailbox().push(button_sample(button, true));
        let stats = pump.run_frame(&mut graph);

        assert_eq!(stats.delivered, 2);
        assert_eq!(
            *log.borrow(),
            vec![Seen::Down("t", button), Seen::Down("up", forwarded)]
        );
    }

    #[test]
    fn samples_for_removed_features_are_dropped() {
        let log = Log::default();
        let mut graph = InteractionGraph::new();
        let (button, _, t) = wand_with_tool(&mut graph, &log);
        let mut pump = FramePump::new();

        pump.mailbox().push(button_sample(button, true));
        pump.mailbox().push(button_sample(button, false));
        graph.remove_tool(t).unwrap();
        graph.remove_device(button.device).unwrap();
        let stats = pump.run_frame(&mut graph);

        assert_eq!(stats.samples, 2);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.delivered, 0);
        assert!(log.borrow().is_empty());
    }
}
