use crate::signal::StationId;
use heapless::Vec;
use serde::{Deserialize, Serialize};

const MAX_EVENT_HISTORY: usize = 256;
/// Upper bound of events a single station can raise in one tick.
pub const MAX_EVENTS_PER_STEP: usize = 4;

pub type StepEvents = Vec<StationEvent, MAX_EVENTS_PER_STEP>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationEvent {
    /// A new frame became pending on an idle station.
    FrameQueued,
    /// The station put its frame on the bus.
    Originated,
    /// The station's own frame sat on its slot for its whole lifetime.
    Completed,
    /// A foreign signal reached the station mid-frame; jam was sent.
    JamSent { iteration: u32 },
    /// The station saw a jam and is backing off.
    Jammed,
    BackoffScheduled { wait_ticks: u64, iteration: u32 },
    /// Too many collisions; the frame was dropped.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub tick: u64,
    pub station: StationId,
    pub event: StationEvent,
}

/// Bounded history of station events, oldest dropped first.
#[derive(Debug, Default)]
pub struct EventLog {
    history: Vec<EventRecord, MAX_EVENT_HISTORY>,
    total_recorded: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tick: u64, station: StationId, event: StationEvent) {
        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(EventRecord { tick, station, event });
        self.total_recorded += 1;
    }

    pub fn history(&self) -> &[EventRecord] {
        &self.history
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn for_station(&self, station: StationId) -> impl Iterator<Item = &EventRecord> {
        self.history.iter().filter(move |record| record.station == station)
    }

    pub fn first(&self, predicate: impl Fn(&EventRecord) -> bool) -> Option<&EventRecord> {
        self.history.iter().find(|record| predicate(record))
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_records_in_order() {
        let mut log = EventLog::new();
        log.record(1, 1, StationEvent::Originated);
        log.record(1, 2, StationEvent::Originated);
        log.record(41, 1, StationEvent::JamSent { iteration: 1 });

        assert_eq!(log.history().len(), 3);
        assert_eq!(log.for_station(1).count(), 2);
        let jam = log.first(|r| matches!(r.event, StationEvent::JamSent { .. }));
        assert_eq!(jam.map(|r| r.tick), Some(41));
    }

    #[test]
    fn test_log_drops_oldest_when_full() {
        let mut log = EventLog::new();
        for tick in 0..(MAX_EVENT_HISTORY as u64 + 10) {
            log.record(tick, 1, StationEvent::Jammed);
        }

        assert_eq!(log.history().len(), MAX_EVENT_HISTORY);
        assert_eq!(log.history()[0].tick, 10);
        assert_eq!(log.total_recorded(), MAX_EVENT_HISTORY as u64 + 10);

        log.clear();
        assert!(log.history().is_empty());
    }
}
