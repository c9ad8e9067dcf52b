use crate::signal::{Signal, SignalKind, StationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// How one propagation pass reads and writes the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// In-place scan from slot 0 upwards. A slot written on the right is
    /// skipped for the rest of the pass, which gives rightward fronts a head
    /// start over leftward ones.
    #[default]
    LeftToRight,
    /// Reads the bus as it was before the pass and writes a fresh copy, so
    /// the outcome does not depend on scan direction. Traces differ from
    /// the left-to-right scan.
    Symmetric,
}

/// The shared medium: a fixed row of slots, each holding at most one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bus {
    slots: Vec<Option<Signal>>,
    mode: PropagationMode,
}

impl Bus {
    pub fn new(length: usize) -> Self {
        Self::with_mode(length, PropagationMode::default())
    }

    pub fn with_mode(length: usize, mode: PropagationMode) -> Self {
        Self {
            slots: vec![None; length],
            mode,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn mode(&self) -> PropagationMode {
        self.mode
    }

    pub fn slot(&self, index: usize) -> Option<Signal> {
        self.slots.get(index).copied().flatten()
    }

    pub fn slots(&self) -> &[Option<Signal>] {
        &self.slots
    }

    /// Overwrite a slot. Stations use this for their own position only.
    pub fn place(&mut self, index: usize, signal: Signal) {
        debug_assert!(index < self.slots.len(), "slot {} outside bus of {}", index, self.slots.len());
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(signal);
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// True when any slot carries jam or a superposition no station sent.
    pub fn has_collision(&self, stations: &[StationId]) -> bool {
        self.slots.iter().flatten().any(|signal| match signal.kind {
            SignalKind::Jam => true,
            SignalKind::Data(id) => !stations.contains(&id),
        })
    }

    /// Advance every signal by one step: spread, merge, decay and expire.
    pub fn propagate(&mut self) {
        match self.mode {
            PropagationMode::LeftToRight => self.propagate_left_to_right(),
            PropagationMode::Symmetric => self.propagate_symmetric(),
        }
        trace!(occupied = self.occupied(), "bus propagated");
    }

    fn propagate_left_to_right(&mut self) {
        let len = self.slots.len();
        let mut index = 0;

        while index < len {
            let Some(signal) = self.slots[index] else {
                index += 1;
                continue;
            };

            let expired = signal.is_expiring();
            if expired {
                self.slots[index] = None;
            }

            let mut wrote_right = false;
            if !signal.decaying {
                if index > 0 {
                    spread_into(&mut self.slots[index - 1], signal);
                }
                if index + 1 < len {
                    wrote_right = spread_into(&mut self.slots[index + 1], signal);
                }
            }

            if !expired {
                self.slots[index] = Some(signal.decay());
            }

            // A fresh write on the right is not revisited in this pass.
            index += if wrote_right { 2 } else { 1 };
        }
    }

    fn propagate_symmetric(&mut self) {
        let before = &self.slots;
        let mut after: Vec<Option<Signal>> = before
            .iter()
            .copied()
            .map(|slot| slot.filter(|signal| !signal.is_expiring()).map(Signal::decay))
            .collect();

        for (index, slot) in before.iter().enumerate() {
            let Some(signal) = *slot else { continue };
            if signal.decaying {
                continue;
            }
            if index > 0 {
                spread_into(&mut after[index - 1], signal);
            }
            if index + 1 < after.len() {
                spread_into(&mut after[index + 1], signal);
            }
        }

        self.slots = after;
    }

    pub fn snapshot(&self, stations: &[StationId]) -> BusSnapshot {
        BusSnapshot {
            symbols: self
                .slots
                .iter()
                .map(|slot| SlotSymbol::classify(*slot, stations))
                .collect(),
        }
    }
}

/// Write `signal` into a neighbouring slot. Returns whether the slot changed.
fn spread_into(slot: &mut Option<Signal>, signal: Signal) -> bool {
    match *slot {
        None => {
            *slot = Some(signal.spread());
            true
        }
        Some(resident) if resident.kind != signal.kind => {
            *slot = Some(signal.merge(resident));
            true
        }
        Some(_) => false,
    }
}

/// What an observer sees in one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotSymbol {
    Empty,
    Jam,
    Station(StationId),
    Collision,
}

impl SlotSymbol {
    pub fn classify(slot: Option<Signal>, stations: &[StationId]) -> Self {
        match slot.map(|signal| signal.kind) {
            None => SlotSymbol::Empty,
            Some(SignalKind::Jam) => SlotSymbol::Jam,
            Some(SignalKind::Data(id)) if stations.contains(&id) => SlotSymbol::Station(id),
            Some(SignalKind::Data(_)) => SlotSymbol::Collision,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            SlotSymbol::Empty => ' ',
            SlotSymbol::Jam => '#',
            SlotSymbol::Collision => '!',
            SlotSymbol::Station(id) => u32::try_from(id)
                .ok()
                .and_then(|digit| char::from_digit(digit, 36))
                .map_or('*', |glyph| glyph.to_ascii_uppercase()),
        }
    }
}

/// Rendering of the whole bus at the end of a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSnapshot {
    pub symbols: Vec<SlotSymbol>,
}

impl BusSnapshot {
    pub fn count(&self, symbol: SlotSymbol) -> usize {
        self.symbols.iter().filter(|s| **s == symbol).count()
    }

    pub fn is_idle(&self) -> bool {
        self.symbols.iter().all(|s| *s == SlotSymbol::Empty)
    }
}

impl fmt::Display for BusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, symbol) in self.symbols.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", symbol.glyph())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_signal_spreads_both_ways() {
        let mut bus = Bus::new(5);
        bus.place(2, Signal::data(1, 10));
        bus.propagate();

        assert_eq!(bus.slot(1), Some(Signal::data(1, 10)));
        assert_eq!(bus.slot(3), Some(Signal::data(1, 10)));
        assert_eq!(bus.slot(2), Some(Signal::data(1, 10).decay()));
    }

    #[test]
    fn test_decaying_signal_stays_put() {
        let mut bus = Bus::new(3);
        bus.place(1, Signal::data(1, 10).decay());
        bus.propagate();

        assert_eq!(bus.slot(0), None);
        assert_eq!(bus.slot(2), None);
        assert_eq!(bus.slot(1).map(|s| s.lifetime), Some(8));
    }

    #[test]
    fn test_expired_signal_is_cleared() {
        let mut bus = Bus::new(3);
        bus.place(1, Signal::data(1, 2).decay());
        assert_eq!(bus.slot(1).map(|s| s.lifetime), Some(1));

        bus.propagate();
        assert_eq!(bus.slot(1), None);
        assert_eq!(bus.occupied(), 0);
    }

    #[test]
    fn test_right_write_is_skipped_this_pass() {
        let mut bus = Bus::new(4);
        bus.place(0, Signal::data(1, 10));
        bus.propagate();

        // The copy at slot 1 was not processed, so nothing reached slot 2.
        assert_eq!(bus.slot(1), Some(Signal::data(1, 10)));
        assert_eq!(bus.slot(2), None);
    }

    #[test]
    fn test_wavefront_advances_one_slot_per_pass() {
        let mut bus = Bus::new(21);
        bus.place(10, Signal::data(1, 50));
        for _ in 0..5 {
            bus.propagate();
        }

        assert!(bus.slot(5).is_some());
        assert!(bus.slot(15).is_some());
        assert_eq!(bus.slot(4), None);
        assert_eq!(bus.slot(16), None);
    }

    #[test]
    fn test_opposing_fronts_merge() {
        let mut bus = Bus::new(5);
        bus.place(1, Signal::data(1, 10));
        bus.place(3, Signal::data(2, 10));
        bus.propagate();

        // Slot 2 first gets a copy of 1, then 2's leftward spread merges into it.
        assert_eq!(bus.slot(2).map(|s| s.kind), Some(SignalKind::Data(3)));
    }

    #[test]
    fn test_same_identity_is_not_merged() {
        let mut bus = Bus::new(3);
        bus.place(0, Signal::data(1, 10));
        bus.place(1, Signal::data(1, 4).decay());
        bus.propagate();

        assert_eq!(bus.slot(1).map(|s| s.kind), Some(SignalKind::Data(1)));
        assert_eq!(bus.slot(1).map(|s| s.lifetime), Some(2));
    }

    #[test]
    fn test_propagation_is_deterministic() {
        let mut first = Bus::new(30);
        first.place(5, Signal::data(1, 40));
        first.place(20, Signal::data(2, 40));
        first.place(12, Signal::jam(40));
        let mut second = first.clone();

        for _ in 0..25 {
            first.propagate();
            second.propagate();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_symmetric_mode_is_mirror_invariant() {
        let mut forward = Bus::with_mode(11, PropagationMode::Symmetric);
        forward.place(2, Signal::data(1, 30));
        let mut mirrored = Bus::with_mode(11, PropagationMode::Symmetric);
        mirrored.place(8, Signal::data(1, 30));

        for _ in 0..6 {
            forward.propagate();
            mirrored.propagate();
            let reversed: Vec<_> = mirrored.slots().iter().rev().copied().collect();
            assert_eq!(forward.slots(), reversed.as_slice());
        }
    }

    #[test]
    fn test_snapshot_rendering() {
        let mut bus = Bus::new(5);
        bus.place(0, Signal::data(1, 3));
        bus.place(1, Signal::jam(3));
        bus.place(2, Signal::data(3, 3));
        bus.place(4, Signal::data(2, 3));

        let snapshot = bus.snapshot(&[1, 2]);
        assert_eq!(snapshot.to_string(), "1 # !   2");
        assert_eq!(snapshot.count(SlotSymbol::Collision), 1);
        assert!(!snapshot.is_idle());
        assert!(bus.has_collision(&[1, 2]));
    }

    #[test]
    fn test_collision_detection_ignores_station_traffic() {
        let mut bus = Bus::new(4);
        bus.place(0, Signal::data(1, 3));
        bus.place(3, Signal::data(2, 3));
        assert!(!bus.has_collision(&[1, 2]));

        bus.place(1, Signal::data(3, 3));
        assert!(bus.has_collision(&[1, 2]));
        assert!(!bus.has_collision(&[1, 2, 3]));
    }

    #[test]
    fn test_glyphs_for_large_identities() {
        assert_eq!(SlotSymbol::Station(9).glyph(), '9');
        assert_eq!(SlotSymbol::Station(10).glyph(), 'A');
        assert_eq!(SlotSymbol::Station(35).glyph(), 'Z');
        assert_eq!(SlotSymbol::Station(36).glyph(), '*');
    }
}
