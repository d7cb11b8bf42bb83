use crate::controller::snapshot::Snapshot;
use crate::mapping::action::{Action, ActionConfig, Effect, MouseOp};
use crate::mapping::error::SinkError;
use crate::mapping::sink::{apply_effect, OutputSink};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What one tick of the pipeline produced
#[derive(Debug, Default)]
pub struct TickReport {
    pub effects: Vec<Effect>,
    pub failures: Vec<SinkError>,
}

/// Ordered list of actions evaluated left to right every tick
#[derive(Debug, Clone, Default)]
pub struct ActionPipeline {
    actions: Vec<Action>,
}

impl ActionPipeline {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn from_configs(configs: &[ActionConfig]) -> Self {
        let actions: Vec<Action> = configs.iter().map(Action::from).collect();
        info!("Action pipeline built with {} actions", actions.len());
        for (index, config) in configs.iter().enumerate() {
            debug!("  [{}] {:?}", index, config);
        }
        Self::new(actions)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every action once and delivers its effects before the next action
    /// runs.
    ///
    /// Sink failures are collected, not propagated. Action state has already
    /// advanced by then, so a refused scroll does not shift the repeat
    /// schedule.
    pub fn run_tick<S: OutputSink + ?Sized>(
        &mut self,
        current: &mut Snapshot,
        previous: Option<&Snapshot>,
        now: Instant,
        sink: &mut S,
    ) -> TickReport {
        let mut report = TickReport::default();

        for action in &mut self.actions {
            for effect in action.update(current, previous, now) {
                debug!("effect: {}", effect);
                if let Err(e) = apply_effect(sink, &effect) {
                    warn!("Output sink failed on {}: {}", effect, e);
                    report.failures.push(e);
                }
                report.effects.push(effect);
            }
        }

        report
    }

    /// Clears every repeat schedule.
    pub fn reset(&mut self) {
        for action in &mut self.actions {
            action.reset();
        }
    }

    /// Releases the mouse buttons click actions still hold according to
    /// `last`. Used when input stops, so nothing stays pressed.
    pub fn release_held<S: OutputSink + ?Sized>(
        &self,
        last: Option<&Snapshot>,
        sink: &mut S,
    ) -> TickReport {
        let mut report = TickReport::default();

        for action in &self.actions {
            let Some(button) = action.held_mouse_button(last) else {
                continue;
            };
            let effect = Effect::Mouse(MouseOp::Release(button));
            info!("Releasing held mouse button {}", button);
            if let Err(e) = apply_effect(sink, &effect) {
                warn!("Failed to release mouse button {}: {}", button, e);
                report.failures.push(e);
            }
            report.effects.push(effect);
        }

        report
    }
}
