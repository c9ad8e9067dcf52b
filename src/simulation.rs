use crate::backoff::{RandomSource, SeededSource};
use crate::bus::{Bus, BusSnapshot, PropagationMode};
use crate::config::{ConfigError, SimulationConfig, MAX_STATIONS};
use crate::events::{EventLog, EventRecord, StationEvent};
use crate::signal::StationId;
use crate::station::{Station, StationState, StationStats, StepContext};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Everything that happened during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub tick: u64,
    pub events: alloc::vec::Vec<EventRecord>,
    pub occupied: usize,
    /// Present when the configuration asks for snapshots.
    pub snapshot: Option<BusSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReport {
    pub identity: StationId,
    pub position: usize,
    pub state: StationState,
    pub pending: Option<StationId>,
    pub backoff_iteration: u32,
    pub stats: StationStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub ticks_run: u64,
    pub bus_length: usize,
    pub frame_duration: u32,
    pub seed: u64,
    pub propagation: PropagationMode,
    pub first_collision_tick: Option<u64>,
    pub peak_occupancy: usize,
    pub stations: alloc::vec::Vec<StationReport>,
    pub totals: StationStats,
}

/// Stepped-clock driver: every tick each station acts in list order, then
/// the bus propagates once.
pub struct Simulation {
    config: SimulationConfig,
    bus: Bus,
    stations: Vec<Station, MAX_STATIONS>,
    identities: alloc::vec::Vec<StationId>,
    source: Box<dyn RandomSource>,
    tick: u64,
    events: EventLog,
    first_collision_tick: Option<u64>,
    peak_occupancy: usize,
}

impl Simulation {
    /// Build a run with a `ChaCha8` source seeded from the configuration.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        let source = SeededSource::new(config.seed);
        Self::with_source(config, source)
    }

    /// Build a run that draws all randomness from `source`.
    pub fn with_source(config: SimulationConfig, source: impl RandomSource + 'static) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut stations = Vec::new();
        for station in &config.stations {
            let built = if station.start_pending {
                Station::with_pending_frame(station.position, station.identity)
            } else {
                Station::new(station.position, station.identity)
            };
            stations.push(built).map_err(|_| ConfigError::TooManyStations {
                count: config.stations.len(),
                max: MAX_STATIONS,
            })?;
        }

        info!(
            bus_length = config.bus_length,
            stations = config.stations.len(),
            frame_duration = config.frame_duration,
            tick_count = config.tick_count,
            seed = config.seed,
            "simulation configured"
        );

        Ok(Self {
            bus: Bus::with_mode(config.bus_length, config.propagation),
            identities: config.station_identities(),
            stations,
            source: Box::new(source),
            tick: 0,
            events: EventLog::new(),
            first_collision_tick: None,
            peak_occupancy: 0,
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station(&self, identity: StationId) -> Option<&Station> {
        self.stations.iter().find(|station| station.identity() == identity)
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn first_collision_tick(&self) -> Option<u64> {
        self.first_collision_tick
    }

    pub fn is_finished(&self) -> bool {
        self.tick >= self.config.tick_count
    }

    pub fn snapshot(&self) -> BusSnapshot {
        self.bus.snapshot(&self.identities)
    }

    /// Advance the clock by one tick.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick += 1;
        let tick = self.tick;
        let mut records = alloc::vec::Vec::new();

        let mut ctx = StepContext {
            frame_duration: self.config.frame_duration,
            origination_probability: self.config.origination_probability,
            source: &mut *self.source,
        };

        for station in self.stations.iter_mut() {
            let identity = station.identity();
            for event in station.step(&mut self.bus, &mut ctx) {
                log_event(tick, identity, event);
                self.events.record(tick, identity, event);
                records.push(EventRecord {
                    tick,
                    station: identity,
                    event,
                });
            }
        }

        self.bus.propagate();

        let occupied = self.bus.occupied();
        self.peak_occupancy = self.peak_occupancy.max(occupied);
        if self.first_collision_tick.is_none() && self.bus.has_collision(&self.identities) {
            self.first_collision_tick = Some(tick);
            info!(tick, "first collision on the bus");
        }

        TickOutcome {
            tick,
            events: records,
            occupied,
            snapshot: self.config.record_snapshots.then(|| self.snapshot()),
        }
    }

    /// Run the remaining ticks. There is no early exit.
    pub fn run(&mut self) -> SimulationReport {
        self.run_with(|_| {})
    }

    /// Run the remaining ticks, handing every outcome to `observer`.
    pub fn run_with<F>(&mut self, mut observer: F) -> SimulationReport
    where
        F: FnMut(&TickOutcome),
    {
        while !self.is_finished() {
            let outcome = self.tick();
            observer(&outcome);
        }

        let report = self.report();
        info!(
            ticks = report.ticks_run,
            completed = report.totals.frames_completed,
            aborted = report.totals.frames_aborted,
            jams = report.totals.jams_sent,
            "simulation finished"
        );
        report
    }

    pub fn report(&self) -> SimulationReport {
        let stations: alloc::vec::Vec<StationReport> = self
            .stations
            .iter()
            .map(|station| StationReport {
                identity: station.identity(),
                position: station.position(),
                state: station.state(),
                pending: station.pending(),
                backoff_iteration: station.backoff_iteration(),
                stats: *station.stats(),
            })
            .collect();

        let totals = stations.iter().fold(StationStats::default(), |mut acc, station| {
            acc.frames_queued += station.stats.frames_queued;
            acc.frames_originated += station.stats.frames_originated;
            acc.frames_completed += station.stats.frames_completed;
            acc.frames_aborted += station.stats.frames_aborted;
            acc.jams_sent += station.stats.jams_sent;
            acc.jams_received += station.stats.jams_received;
            acc.max_backoff_iteration = acc.max_backoff_iteration.max(station.stats.max_backoff_iteration);
            acc
        });

        SimulationReport {
            ticks_run: self.tick,
            bus_length: self.config.bus_length,
            frame_duration: self.config.frame_duration,
            seed: self.config.seed,
            propagation: self.config.propagation,
            first_collision_tick: self.first_collision_tick,
            peak_occupancy: self.peak_occupancy,
            stations,
            totals,
        }
    }
}

fn log_event(tick: u64, station: StationId, event: StationEvent) {
    match event {
        StationEvent::FrameQueued => trace!(tick, station, "frame queued"),
        StationEvent::Originated => debug!(tick, station, "frame originated"),
        StationEvent::Completed => info!(tick, station, "frame delivered"),
        StationEvent::JamSent { iteration } => debug!(tick, station, iteration, "collision detected, jam sent"),
        StationEvent::Jammed => debug!(tick, station, "jam received"),
        StationEvent::BackoffScheduled { wait_ticks, iteration } => {
            debug!(tick, station, wait_ticks, iteration, "backoff scheduled");
        }
        StationEvent::Aborted => warn!(tick, station, "frame aborted after repeated collisions"),
    }
}
