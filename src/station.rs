use crate::backoff::{backoff_delay, RandomSource, MAX_BACKOFF_ATTEMPTS};
use crate::bus::Bus;
use crate::events::{StationEvent, StepEvents};
use crate::signal::{Signal, SignalKind, StationId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationState {
    Idle,
    AwaitingSend,
    Transmitting,
    Backoff,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationStats {
    pub frames_queued: u32,
    pub frames_originated: u32,
    pub frames_completed: u32,
    pub frames_aborted: u32,
    pub jams_sent: u32,
    pub jams_received: u32,
    pub max_backoff_iteration: u32,
}

/// Per-run parameters and randomness a station needs to take its turn.
pub struct StepContext<'a> {
    pub frame_duration: u32,
    pub origination_probability: f64,
    pub source: &'a mut dyn RandomSource,
}

/// A device tapping the bus at a fixed slot.
#[derive(Debug, Clone)]
pub struct Station {
    position: usize,
    identity: StationId,
    pending: Option<StationId>,
    wait_ticks: u64,
    jamming: bool,
    backoff_active: bool,
    backoff_iteration: u32,
    transmitting: bool,
    aborted: bool,
    stats: StationStats,
}

impl Station {
    pub fn new(position: usize, identity: StationId) -> Self {
        Self {
            position,
            identity,
            pending: None,
            wait_ticks: 0,
            jamming: false,
            backoff_active: false,
            backoff_iteration: 0,
            transmitting: false,
            aborted: false,
            stats: StationStats::default(),
        }
    }

    /// Station that starts the run with one frame of its own identity pending.
    pub fn with_pending_frame(position: usize, identity: StationId) -> Self {
        let mut station = Self::new(position, identity);
        station.queue_frame();
        station
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn identity(&self) -> StationId {
        self.identity
    }

    pub fn pending(&self) -> Option<StationId> {
        self.pending
    }

    pub fn wait_ticks(&self) -> u64 {
        self.wait_ticks
    }

    pub fn is_jamming(&self) -> bool {
        self.jamming
    }

    pub fn is_backoff_active(&self) -> bool {
        self.backoff_active
    }

    pub fn backoff_iteration(&self) -> u32 {
        self.backoff_iteration
    }

    pub fn stats(&self) -> &StationStats {
        &self.stats
    }

    pub fn state(&self) -> StationState {
        match self.pending {
            None if self.aborted => StationState::Aborted,
            None => StationState::Idle,
            Some(_) if self.transmitting => StationState::Transmitting,
            Some(_) if self.jamming || self.backoff_active => StationState::Backoff,
            Some(_) => StationState::AwaitingSend,
        }
    }

    /// Make a frame pending. Does nothing while another frame is pending.
    pub fn queue_frame(&mut self) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(self.identity);
        self.aborted = false;
        self.stats.frames_queued += 1;
        true
    }

    /// Take this station's turn for one tick.
    ///
    /// The station reads and writes only the slot at its own position. What it
    /// reacts to is the content of that slot before its own send attempt.
    pub fn step(&mut self, bus: &mut Bus, ctx: &mut StepContext<'_>) -> StepEvents {
        let mut events = StepEvents::new();

        if self.pending.is_none()
            && ctx.origination_probability > 0.0
            && ctx.source.chance(ctx.origination_probability)
            && self.queue_frame()
        {
            let _ = events.push(StationEvent::FrameQueued);
        }

        if self.backoff_iteration >= MAX_BACKOFF_ATTEMPTS {
            self.abort();
            let _ = events.push(StationEvent::Aborted);
        }

        let observed = bus.slot(self.position);

        if observed.is_none() {
            match self.pending {
                Some(identity) if self.wait_ticks == 0 => {
                    bus.place(self.position, Signal::data(identity, ctx.frame_duration));
                    self.originate();
                    let _ = events.push(StationEvent::Originated);
                }
                // Carrier idle: count down towards the next attempt.
                _ => self.wait_ticks = self.wait_ticks.saturating_sub(1),
            }
        }

        let (Some(signal), Some(pending)) = (observed, self.pending) else {
            return events;
        };

        if signal.kind == SignalKind::Data(pending) && signal.lifetime == 1 {
            self.complete();
            let _ = events.push(StationEvent::Completed);
        } else if matches!(signal.kind, SignalKind::Data(id) if id != pending) && self.wait_ticks < 1 {
            bus.place(self.position, Signal::jam(ctx.frame_duration));
            self.jamming = true;
            self.backoff_iteration += 1;
            self.stats.jams_sent += 1;
            self.stats.max_backoff_iteration = self.stats.max_backoff_iteration.max(self.backoff_iteration);
            let _ = events.push(StationEvent::JamSent {
                iteration: self.backoff_iteration,
            });
            let _ = events.push(self.back_off(ctx));
        } else if signal.is_jam() && self.wait_ticks == 0 {
            self.stats.jams_received += 1;
            let _ = events.push(StationEvent::Jammed);
            let _ = events.push(self.back_off(ctx));
        }

        events
    }

    fn originate(&mut self) {
        self.transmitting = true;
        self.jamming = false;
        self.stats.frames_originated += 1;
    }

    fn complete(&mut self) {
        self.pending = None;
        self.transmitting = false;
        self.jamming = false;
        self.reset_backoff();
        self.stats.frames_completed += 1;
    }

    fn abort(&mut self) {
        self.pending = None;
        self.transmitting = false;
        self.jamming = false;
        self.aborted = true;
        self.reset_backoff();
        self.stats.frames_aborted += 1;
    }

    fn back_off(&mut self, ctx: &mut StepContext<'_>) -> StationEvent {
        self.wait_ticks = backoff_delay(self.backoff_iteration, ctx.frame_duration, &mut *ctx.source);
        self.backoff_active = true;
        self.transmitting = false;
        StationEvent::BackoffScheduled {
            wait_ticks: self.wait_ticks,
            iteration: self.backoff_iteration,
        }
    }

    fn reset_backoff(&mut self) {
        self.backoff_active = false;
        self.backoff_iteration = 0;
    }
}
