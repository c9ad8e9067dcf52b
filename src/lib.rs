//! # CSMA/CD Bus Simulator
//!
//! A deterministic, stepped simulation of Carrier-Sense Multiple Access with
//! Collision Detection over a shared bus.
//!
//! ## Features
//!
//! - **Signal propagation**: signals spread one slot per tick in both directions,
//!   superimpose on contact and expire when their lifetime runs out
//! - **Station state machine**: carrier sense, collision detection, jamming and
//!   truncated exponential backoff with a 16-attempt abort
//! - **Reproducible runs**: every random draw goes through an injectable,
//!   seedable [`backoff::RandomSource`]
//! - **Observable output**: a one-glyph-per-slot rendering of the bus every tick
//!
//! ## Quick Start
//!
//! ```rust
//! use csmabus::{Simulation, SimulationConfig};
//!
//! // Two stations at slots 20 and 60 of an 80-slot bus
//! let mut simulation = Simulation::new(SimulationConfig::default()).unwrap();
//!
//! let outcome = simulation.tick();
//! assert_eq!(outcome.events.len(), 2);
//!
//! let report = simulation.run();
//! println!("first collision at tick {:?}", report.first_collision_tick);
//! ```
//!
//! ## Architecture
//!
//! - [`signal`] - What occupies a bus slot
//! - [`bus`] - The medium and its propagation pass
//! - [`station`] - Per-station medium access state machine
//! - [`backoff`] - Random sources and the backoff window
//! - [`events`] - Station events and the bounded event log
//! - [`config`] - Run parameters and their validation
//! - [`simulation`] - The stepped clock tying it together

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

extern crate alloc;

pub mod backoff;
pub mod bus;
pub mod config;
pub mod events;
pub mod signal;
pub mod simulation;
pub mod station;

// Re-export main public types for convenience
pub use bus::{Bus, BusSnapshot, PropagationMode, SlotSymbol};
pub use config::{ConfigError, SimulationConfig, StationConfig};
pub use signal::{Signal, SignalKind, StationId};
pub use simulation::{Simulation, SimulationReport, TickOutcome};
pub use station::{Station, StationState};
