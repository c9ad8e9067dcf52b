use crate::bus::PropagationMode;
use crate::signal::StationId;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use std::collections::HashSet;
use thiserror::Error;

/// Capacity of the station table.
pub const MAX_STATIONS: usize = 32;

// Reference scenario: an 80-slot cable with two stations.
const DEFAULT_BUS_LENGTH: usize = 80;
const DEFAULT_TICK_COUNT: u64 = 2000;
const TUNED_ORIGINATION_PROBABILITY: f64 = 0.4;
const DEFAULT_STATIONS: [(usize, StationId); 2] = [(20, 1), (60, 2)];

const_assert!(MAX_STATIONS >= DEFAULT_STATIONS.len());

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("bus length must be positive")]
    EmptyBus,
    #[error("frame duration must be positive")]
    ZeroFrameDuration,
    #[error("tick count must be positive")]
    ZeroTickCount,
    #[error("at least one station is required")]
    NoStations,
    #[error("{count} stations configured, at most {max} supported")]
    TooManyStations { count: usize, max: usize },
    #[error("station {identity} sits at slot {position}, outside a bus of {bus_length} slots")]
    PositionOutOfRange {
        identity: StationId,
        position: usize,
        bus_length: usize,
    },
    #[error("stations {first} and {second} share slot {position}")]
    SharedPosition {
        position: usize,
        first: StationId,
        second: StationId,
    },
    #[error("station identity 0 is reserved for the idle state")]
    ReservedIdentity,
    #[error("station identity {0} is used more than once")]
    DuplicateIdentity(StationId),
    #[error("origination probability {0} is outside [0, 1]")]
    InvalidProbability(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub position: usize,
    pub identity: StationId,
    /// Whether the station holds a frame when the run starts.
    #[serde(default = "default_start_pending")]
    pub start_pending: bool,
}

fn default_start_pending() -> bool {
    true
}

impl StationConfig {
    pub fn new(position: usize, identity: StationId) -> Self {
        Self {
            position,
            identity,
            start_pending: true,
        }
    }

    pub fn idle(position: usize, identity: StationId) -> Self {
        Self {
            start_pending: false,
            ..Self::new(position, identity)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub bus_length: usize,
    pub stations: Vec<StationConfig>,
    /// Ticks a signal lives while actively transmitted.
    pub frame_duration: u32,
    pub tick_count: u64,
    /// Per-tick chance that an idle station queues a new frame.
    pub origination_probability: f64,
    pub seed: u64,
    pub propagation: PropagationMode,
    /// Keep a rendering of the bus in every tick outcome.
    pub record_snapshots: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bus_length: DEFAULT_BUS_LENGTH,
            stations: DEFAULT_STATIONS
                .iter()
                .map(|&(position, identity)| StationConfig::new(position, identity))
                .collect(),
            frame_duration: (2 * DEFAULT_BUS_LENGTH) as u32,
            tick_count: DEFAULT_TICK_COUNT,
            // Reserved: the reference scenario fixes both frames up front.
            origination_probability: 0.0,
            seed: 0,
            propagation: PropagationMode::LeftToRight,
            record_snapshots: false,
        }
    }
}

impl SimulationConfig {
    /// Probability the reference scenario was tuned for, for callers that
    /// enable continuous traffic.
    pub const REFERENCE_ORIGINATION_PROBABILITY: f64 = TUNED_ORIGINATION_PROBABILITY;

    pub fn single_station(bus_length: usize, position: usize, frame_duration: u32, tick_count: u64) -> Self {
        Self {
            bus_length,
            stations: vec![StationConfig::new(position, 1)],
            frame_duration,
            tick_count,
            ..Self::default()
        }
    }

    pub fn station_identities(&self) -> Vec<StationId> {
        self.stations.iter().map(|station| station.identity).collect()
    }

    /// Reject anything that would make the run ill-defined. Nothing is
    /// simulated unless this passes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus_length == 0 {
            return Err(ConfigError::EmptyBus);
        }
        if self.frame_duration == 0 {
            return Err(ConfigError::ZeroFrameDuration);
        }
        if self.tick_count == 0 {
            return Err(ConfigError::ZeroTickCount);
        }
        if self.stations.is_empty() {
            return Err(ConfigError::NoStations);
        }
        if self.stations.len() > MAX_STATIONS {
            return Err(ConfigError::TooManyStations {
                count: self.stations.len(),
                max: MAX_STATIONS,
            });
        }
        if !self.origination_probability.is_finite() || !(0.0..=1.0).contains(&self.origination_probability) {
            return Err(ConfigError::InvalidProbability(self.origination_probability));
        }

        let mut identities = HashSet::new();
        for (index, station) in self.stations.iter().enumerate() {
            if station.identity == 0 {
                return Err(ConfigError::ReservedIdentity);
            }
            if station.position >= self.bus_length {
                return Err(ConfigError::PositionOutOfRange {
                    identity: station.identity,
                    position: station.position,
                    bus_length: self.bus_length,
                });
            }
            if let Some(other) = self.stations[..index].iter().find(|s| s.position == station.position) {
                return Err(ConfigError::SharedPosition {
                    position: station.position,
                    first: other.identity,
                    second: station.identity,
                });
            }
            if !identities.insert(station.identity) {
                return Err(ConfigError::DuplicateIdentity(station.identity));
            }
        }

        Ok(())
    }
}
