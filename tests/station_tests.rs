use csmabus::backoff::{backoff_window, RandomSource, ScriptedSource, SeededSource, MAX_BACKOFF_ATTEMPTS};
use csmabus::bus::Bus;
use csmabus::events::StationEvent;
use csmabus::signal::{Signal, SignalKind};
use csmabus::station::{Station, StationState, StepContext};

const FRAME: u32 = 160;

fn step(station: &mut Station, bus: &mut Bus, source: &mut dyn RandomSource) -> Vec<StationEvent> {
    let mut ctx = StepContext {
        frame_duration: FRAME,
        origination_probability: 0.0,
        source,
    };
    station.step(bus, &mut ctx).into_iter().collect()
}

#[test]
fn test_backoff_wait_within_window_for_every_iteration() {
    let mut source = SeededSource::new(2024);
    let mut bus = Bus::new(3);
    let mut station = Station::with_pending_frame(1, 1);

    for _ in 0..40 {
        bus.place(1, Signal::data(7, 10));
        let iteration_before = station.backoff_iteration();
        let events = step(&mut station, &mut bus, &mut source);

        if let Some(StationEvent::BackoffScheduled { wait_ticks, iteration }) = events.last().copied() {
            assert_eq!(iteration, iteration_before + 1);
            assert!(wait_ticks <= backoff_window(iteration) * u64::from(FRAME));
            assert_eq!(wait_ticks % u64::from(FRAME), 0);
        }

        // Drain the wait on an idle carrier before the next collision.
        bus.clear();
        while station.wait_ticks() > 0 {
            step(&mut station, &mut bus, &mut source);
            bus.clear();
        }
        if station.pending().is_none() {
            break;
        }
    }

    assert!(station.stats().jams_sent > 0);
}

#[test]
fn test_jam_only_over_foreign_data() {
    let mut source = ScriptedSource::constant(0);
    let mut bus = Bus::new(3);
    let mut station = Station::with_pending_frame(1, 4);

    // Own signal mid-frame.
    bus.place(1, Signal::data(4, 50));
    assert!(step(&mut station, &mut bus, &mut source).is_empty());
    assert_eq!(bus.slot(1).map(|s| s.kind), Some(SignalKind::Data(4)));

    // Jam on the slot is never answered with another jam.
    bus.place(1, Signal::jam(50));
    let events = step(&mut station, &mut bus, &mut source);
    assert!(!events.iter().any(|e| matches!(e, StationEvent::JamSent { .. })));
    assert_eq!(station.stats().jams_sent, 0);

    // Foreign data is.
    bus.place(1, Signal::data(9, 50));
    let events = step(&mut station, &mut bus, &mut source);
    assert!(events.iter().any(|e| matches!(e, StationEvent::JamSent { iteration: 1 })));
    assert_eq!(bus.slot(1).map(|s| s.kind), Some(SignalKind::Jam));
}

#[test]
fn test_idle_station_ignores_traffic() {
    let mut source = ScriptedSource::constant(0);
    let mut bus = Bus::new(3);
    let mut station = Station::new(1, 4);

    bus.place(1, Signal::data(9, 50));
    assert!(step(&mut station, &mut bus, &mut source).is_empty());
    assert_eq!(bus.slot(1).map(|s| s.kind), Some(SignalKind::Data(9)));
    assert_eq!(station.state(), StationState::Idle);
}

#[test]
fn test_persistent_collisions_abort_exactly_once() {
    let mut source = ScriptedSource::constant(0);
    let mut bus = Bus::new(1);
    let mut station = Station::with_pending_frame(0, 1);
    let mut aborts = 0;
    let mut highest_iteration = 0;

    for _ in 0..100 {
        // Noise from an unseen sender keeps the slot busy every tick.
        bus.place(0, Signal::data(99, 5));
        for event in step(&mut station, &mut bus, &mut source) {
            match event {
                StationEvent::Aborted => aborts += 1,
                StationEvent::Completed => panic!("frame cannot complete under constant noise"),
                _ => {}
            }
        }
        highest_iteration = highest_iteration.max(station.backoff_iteration());
        assert!(station.backoff_iteration() <= MAX_BACKOFF_ATTEMPTS);
    }

    assert_eq!(aborts, 1);
    assert_eq!(highest_iteration, MAX_BACKOFF_ATTEMPTS);
    assert_eq!(station.state(), StationState::Aborted);
    assert_eq!(station.stats().frames_aborted, 1);
    assert_eq!(station.stats().jams_sent, MAX_BACKOFF_ATTEMPTS);
}

#[test]
fn test_requeue_after_abort_starts_fresh() {
    let mut source = ScriptedSource::constant(0);
    let mut bus = Bus::new(1);
    let mut station = Station::with_pending_frame(0, 1);

    for _ in 0..=MAX_BACKOFF_ATTEMPTS {
        bus.place(0, Signal::data(99, 5));
        step(&mut station, &mut bus, &mut source);
    }
    assert_eq!(station.state(), StationState::Aborted);

    assert!(station.queue_frame());
    assert!(!station.queue_frame());
    assert_eq!(station.backoff_iteration(), 0);
    assert_eq!(station.state(), StationState::AwaitingSend);

    bus.clear();
    let events = step(&mut station, &mut bus, &mut source);
    assert_eq!(events, vec![StationEvent::Originated]);
    assert_eq!(station.state(), StationState::Transmitting);
}
