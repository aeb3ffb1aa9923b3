//! Frame loop: COMPUTE then DRAW, forever
//!
//! One tick dispatches the force kernel from `Slot::current(step)` into
//! `Slot::next(step)`, waits for the backend to finish, advances the step
//! counter and then (if the draw cadence allows) draws from the new current
//! slot. The draw therefore always sees a buffer the kernel has finished
//! writing, and the next dispatch writes the other buffer.
//!
//! The loop has no convergence test; it runs until stopped from outside.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, trace_span};

use crate::backend::Backend;
use crate::error::{LayoutError, Result};
use crate::state::{Slot, Vec2};

/// Phase of the frame state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Compute,
    Draw,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Step counter after the tick
    pub step: u64,
    /// Whether a draw was submitted
    pub drew: bool,
}

impl TickOutcome {
    /// Phases the tick ran, in order
    pub fn phases(&self) -> &'static [Phase] {
        if self.drew {
            &[Phase::Compute, Phase::Draw]
        } else {
            &[Phase::Compute]
        }
    }
}

/// Drives a [`Backend`] through compute and draw phases
pub struct FrameOrchestrator<B: Backend> {
    backend: B,
    step: u64,
    draw_every: u64,
    frames_drawn: u64,
}

impl<B: Backend> FrameOrchestrator<B> {
    /// Draw after every compute step
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            step: 0,
            draw_every: 1,
            frames_drawn: 0,
        }
    }

    /// Draw after every `draw_every` compute steps
    pub fn with_draw_every(mut self, draw_every: u64) -> Result<Self> {
        if draw_every == 0 {
            return Err(LayoutError::Configuration(
                "draw cadence must be positive".into(),
            ));
        }
        self.draw_every = draw_every;
        Ok(self)
    }

    /// Run one COMPUTE phase and, when due, one DRAW phase.
    ///
    /// Each phase runs inside a `phase` trace span carrying the step.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        {
            let _span = trace_span!("phase", phase = ?Phase::Compute, step = self.step).entered();
            self.backend
                .dispatch(Slot::current(self.step), Slot::next(self.step))?;
        }
        self.step += 1;

        let drew = self.step % self.draw_every == 0;
        if drew {
            let _span = trace_span!("phase", phase = ?Phase::Draw, step = self.step).entered();
            self.backend.draw(Slot::current(self.step))?;
            self.frames_drawn += 1;
        }

        Ok(TickOutcome {
            step: self.step,
            drew,
        })
    }

    /// Run exactly `steps` ticks
    #[instrument(skip(self))]
    pub fn run_for(&mut self, steps: u64) -> Result<()> {
        for _ in 0..steps {
            self.tick()?;
        }
        debug!(step = self.step, frames = self.frames_drawn, "run finished");
        Ok(())
    }

    /// Tick until `stop` is raised.
    ///
    /// The flag is checked between ticks, so on return the current slot holds
    /// the output of the last completed step.
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<u64> {
        info!(nodes = self.backend.node_count(), "layout loop started");
        let start = self.step;
        while !stop.load(Ordering::Relaxed) {
            self.tick()?;
        }
        info!(steps = self.step - start, "layout loop stopped");
        Ok(self.step - start)
    }

    /// Read back the positions of the last completed step
    pub fn positions(&mut self) -> Result<Vec<Vec2>> {
        self.backend.read_positions(Slot::current(self.step))
    }

    /// Steps completed so far
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Draws submitted so far
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Borrow the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutably borrow the backend
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consume the orchestrator, returning the backend
    pub fn into_backend(self) -> B {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Records every call so sequencing can be checked
    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<Call>,
        stop_after: Option<(usize, Arc<AtomicBool>)>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Dispatch(Slot, Slot),
        Draw(Slot),
    }

    impl Backend for RecordingBackend {
        fn node_count(&self) -> usize {
            1
        }

        fn dispatch(&mut self, read: Slot, write: Slot) -> Result<()> {
            self.calls.push(Call::Dispatch(read, write));
            if let Some((limit, flag)) = &self.stop_after {
                let dispatches = self
                    .calls
                    .iter()
                    .filter(|c| matches!(c, Call::Dispatch(..)))
                    .count();
                if dispatches >= *limit {
                    flag.store(true, Ordering::Relaxed);
                }
            }
            Ok(())
        }

        fn draw(&mut self, current: Slot) -> Result<()> {
            self.calls.push(Call::Draw(current));
            Ok(())
        }

        fn read_positions(&mut self, _slot: Slot) -> Result<Vec<Vec2>> {
            Ok(vec![[0.0, 0.0]])
        }
    }

    #[test]
    fn test_draw_reads_slot_just_written() {
        let mut orch = FrameOrchestrator::new(RecordingBackend::default());
        orch.run_for(3).unwrap();

        assert_eq!(
            orch.backend().calls,
            vec![
                Call::Dispatch(Slot::Ping, Slot::Pong),
                Call::Draw(Slot::Pong),
                Call::Dispatch(Slot::Pong, Slot::Ping),
                Call::Draw(Slot::Ping),
                Call::Dispatch(Slot::Ping, Slot::Pong),
                Call::Draw(Slot::Pong),
            ]
        );
        assert_eq!(orch.step(), 3);
        assert_eq!(orch.frames_drawn(), 3);
    }

    #[test]
    fn test_draw_cadence() {
        let mut orch = FrameOrchestrator::new(RecordingBackend::default())
            .with_draw_every(3)
            .unwrap();
        let outcomes: Vec<bool> = (0..6).map(|_| orch.tick().unwrap().drew).collect();
        assert_eq!(outcomes, vec![false, false, true, false, false, true]);
        assert_eq!(orch.frames_drawn(), 2);

        // Every draw still reads the slot the preceding dispatch wrote
        let calls = &orch.backend().calls;
        for pair in calls.windows(2) {
            if let [Call::Dispatch(_, written), Call::Draw(drawn)] = pair {
                assert_eq!(written, drawn);
            }
        }
    }

    #[test]
    fn test_tick_reports_phases_run() {
        let mut orch = FrameOrchestrator::new(RecordingBackend::default())
            .with_draw_every(2)
            .unwrap();

        let first = orch.tick().unwrap();
        assert_eq!(first.phases(), &[Phase::Compute]);
        let second = orch.tick().unwrap();
        assert_eq!(second.phases(), &[Phase::Compute, Phase::Draw]);

        // One backend call per phase reported
        let reported = first.phases().len() + second.phases().len();
        assert_eq!(orch.backend().calls.len(), reported);
    }

    #[test]
    fn test_zero_cadence_rejected() {
        let result = FrameOrchestrator::new(RecordingBackend::default()).with_draw_every(0);
        assert!(matches!(result, Err(LayoutError::Configuration(_))));
    }

    #[test]
    fn test_run_until_stops_on_flag() {
        let stop = Arc::new(AtomicBool::new(false));
        let backend = RecordingBackend {
            calls: Vec::new(),
            stop_after: Some((5, stop.clone())),
        };
        let mut orch = FrameOrchestrator::new(backend);
        let steps = orch.run_until(&stop).unwrap();
        assert_eq!(steps, 5);
        // The last tick finished its draw before the loop noticed the flag
        assert_eq!(orch.backend().calls.last(), Some(&Call::Draw(Slot::Pong)));
    }

    #[test]
    fn test_run_until_from_another_thread() {
        let stop = Arc::new(AtomicBool::new(false));
        let stopper = {
            let stop = stop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                stop.store(true, Ordering::Relaxed);
            })
        };
        let mut orch = FrameOrchestrator::new(RecordingBackend::default());
        orch.run_until(&stop).unwrap();
        stopper.join().unwrap();
        assert!(orch.step() > 0);
    }

    #[test]
    fn test_positions_read_current_slot() {
        let mut orch = FrameOrchestrator::new(RecordingBackend::default());
        orch.tick().unwrap();
        assert_eq!(orch.positions().unwrap(), vec![[0.0, 0.0]]);
    }
}
