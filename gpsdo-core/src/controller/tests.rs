use super::*;
use crate::store::RamRegion;
use crate::timers::Timers;

type Store = CalibrationStore<RamRegion<16>>;

fn store_with(saved: Option<u16>) -> Store {
    let mut store = CalibrationStore::new(RamRegion::new());
    if let Some(value) = saved {
        store.append(value).unwrap();
    }
    store
}

fn controller() -> Controller {
    Controller::new(DisciplineConfig::new()).unwrap()
}

fn mark(value: u32) -> Cycle {
    Cycle::with_mark(TimeMark { value, accuracy: 21 })
}

/// Drives a controller through the resume path until it tracks from `first`.
fn tracking_from(saved: u16, first: u32) -> (Controller, Store) {
    let mut store = store_with(Some(saved));
    let mut ctl = controller();
    ctl.step(&Cycle::default(), &mut store);
    ctl.step(&mark(first), &mut store);
    ctl.step(&mark(first), &mut store);
    ctl.step(&mark(first), &mut store);
    assert_eq!(ctl.state(), VcoState::Track);
    assert_eq!(ctl.prev_mark(), Some(first));
    (ctl, store)
}

// ── Dead reckoning ───────────────────────────────────────────────────────────

#[test]
fn test_empty_store_applies_default_then_acquires() {
    let mut store = store_with(None);
    let mut ctl = controller();
    assert_eq!(ctl.state(), VcoState::DeadReckon);

    let actions = ctl.step(&Cycle::default(), &mut store);
    assert_eq!(actions.dac, Some(34_150));
    assert!(actions.start_settle);
    assert!(actions.rearm_decoder);
    assert!(actions.reload_watchdog);
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);

    let actions = ctl.step(&mark(250_000), &mut store);
    assert_eq!(ctl.state(), VcoState::Acquire);
    assert_eq!(ctl.step_size(), 16_384);
    assert!(actions.resync_divider);
    assert!(actions.reload_watchdog);
    assert_eq!(actions.dac, None);
}

#[test]
fn test_hold_waits_for_settle() {
    let mut store = store_with(None);
    let mut ctl = controller();
    ctl.step(&Cycle::default(), &mut store);

    let settling = Cycle {
        settling: true,
        pulse_seen: true,
        ..mark(250_000)
    };
    assert_eq!(ctl.step(&settling, &mut store), Actions::default());
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);

    let pulse = Cycle {
        pulse_seen: true,
        ..Cycle::default()
    };
    ctl.step(&pulse, &mut store);
    assert_eq!(ctl.state(), VcoState::Acquire);
}

#[test]
fn test_hold_ignores_watchdog() {
    let mut store = store_with(None);
    let mut ctl = controller();
    ctl.step(&Cycle::default(), &mut store);

    let expired = Cycle {
        watchdog_expired: true,
        ..Cycle::default()
    };
    for _ in 0..3 {
        assert_eq!(ctl.step(&expired, &mut store), Actions::default());
    }
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);
    assert_eq!(store.last(), None);
}

#[test]
fn test_saved_value_resumes_through_resync_and_arm() {
    let mut store = store_with(Some(30_000));
    let mut ctl = controller();

    let actions = ctl.step(&Cycle::default(), &mut store);
    assert_eq!(actions.dac, Some(30_000));
    assert!(!actions.reload_watchdog);
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);

    let actions = ctl.step(&mark(120_000), &mut store);
    assert_eq!(ctl.state(), VcoState::TrackResync);
    assert!(!actions.resync_divider);
    assert!(actions.reload_watchdog);

    let pulse = Cycle {
        pulse_seen: true,
        ..Cycle::default()
    };
    let actions = ctl.step(&pulse, &mut store);
    assert_eq!(ctl.state(), VcoState::TrackArm);
    assert!(actions.resync_divider);

    // A pulse alone does not arm tracking; a mark does.
    ctl.step(&pulse, &mut store);
    assert_eq!(ctl.state(), VcoState::TrackArm);
    ctl.step(&mark(120_400), &mut store);
    assert_eq!(ctl.state(), VcoState::Track);
    assert_eq!(ctl.prev_mark(), Some(120_400));
    assert_eq!(ctl.dac(), 30_000);
    assert_eq!(ctl.cycles_remaining(), 5);
}

// ── Acquire ──────────────────────────────────────────────────────────────────

fn acquiring() -> (Controller, Store) {
    let mut store = store_with(None);
    let mut ctl = controller();
    ctl.step(&Cycle::default(), &mut store);
    ctl.step(&mark(200_000), &mut store);
    assert_eq!(ctl.state(), VcoState::Acquire);
    (ctl, store)
}

#[test]
fn test_acquire_later_mark_lowers_dac_and_halves_step() {
    let (mut ctl, mut store) = acquiring();

    // First mark in Acquire only primes the comparison.
    assert_eq!(ctl.step(&mark(200_000), &mut store).dac, None);
    assert_eq!(ctl.prev_mark(), Some(200_000));

    let actions = ctl.step(&mark(200_500), &mut store);
    assert_eq!(actions.dac, Some(34_150 - 16_384));
    assert_eq!(ctl.step_size(), 8192);

    let actions = ctl.step(&mark(200_100), &mut store);
    assert_eq!(actions.dac, Some(34_150 - 16_384 + 8192));
    assert_eq!(ctl.step_size(), 4096);
}

#[test]
fn test_acquire_ends_in_track_after_unit_step() {
    let (mut ctl, mut store) = acquiring();
    ctl.step(&mark(100_000), &mut store);

    for i in 1..=15 {
        assert_eq!(ctl.state(), VcoState::Acquire);
        ctl.step(&mark(100_000 + i * 10), &mut store);
    }
    assert_eq!(ctl.state(), VcoState::Track);
    // 16384 + 8192 + ... + 1 taken off the default.
    assert_eq!(ctl.dac(), 34_150 - 32_767);
    assert_eq!(ctl.prev_mark(), Some(100_150));
    assert_eq!(ctl.cycles_remaining(), 5);
}

#[test]
fn test_acquire_saturates_at_dac_limits() {
    let (mut ctl, mut store) = acquiring();
    ctl.step(&mark(100_000), &mut store);
    for i in 1..=5 {
        ctl.step(&mark(100_000 - i * 10), &mut store);
    }
    // 34150 + 16384 + 8192 + 4096 + 2048 + 1024 overflows u16.
    assert_eq!(ctl.dac(), u16::MAX);
}

#[test]
fn test_acquire_timeout_falls_back_to_dead_reckon() {
    let (mut ctl, mut store) = acquiring();
    let expired = Cycle {
        watchdog_expired: true,
        ..Cycle::default()
    };
    ctl.step(&expired, &mut store);
    assert_eq!(ctl.state(), VcoState::DeadReckon);

    let actions = ctl.step(&Cycle::default(), &mut store);
    assert_eq!(actions.dac, Some(34_150));
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);
}

// ── Track ────────────────────────────────────────────────────────────────────

#[test]
fn test_track_corrects_once_per_window() {
    let (mut ctl, mut store) = tracking_from(30_000, 100_000);

    for value in [100_010, 100_020, 100_030, 100_040] {
        assert_eq!(ctl.step(&mark(value), &mut store).dac, None);
    }
    assert_eq!(ctl.accumulated_error(), 40);
    assert_eq!(ctl.cycles_remaining(), 1);

    // Average 10 ns, 10 * 1264 / 1000 = 12 LSB.
    let actions = ctl.step(&mark(100_050), &mut store);
    assert_eq!(actions.dac, Some(30_012));
    assert_eq!(ctl.accumulated_error(), 0);
    assert_eq!(ctl.cycles_remaining(), 5);
    assert_eq!(ctl.corrections(), 1);
}

#[test]
fn test_track_correction_across_wraparound() {
    let (mut ctl, mut store) = tracking_from(30_000, 999_990);
    let mut last = None;
    for value in [10, 30, 50, 70, 90] {
        last = ctl.step(&mark(value), &mut store).dac;
    }
    // Average +20 ns gives 25 LSB.
    assert_eq!(last, Some(30_025));

    let (mut ctl, mut store) = tracking_from(30_000, 10);
    for value in [999_990, 999_970, 999_950, 999_930, 999_910] {
        last = ctl.step(&mark(value), &mut store).dac;
    }
    assert_eq!(last, Some(29_975));
}

#[test]
fn test_unchanged_mark_counts_toward_window() {
    let (mut ctl, mut store) = tracking_from(30_000, 100_000);
    let mut last = None;
    for _ in 0..5 {
        last = ctl.step(&mark(100_000), &mut store).dac;
    }
    assert_eq!(last, Some(30_000));
    assert_eq!(ctl.corrections(), 1);
}

#[test]
fn test_deadlock_band_resyncs_without_accumulating() {
    let (mut ctl, mut store) = tracking_from(30_000, 100_000);
    ctl.step(&mark(100_010), &mut store);

    let actions = ctl.step(&mark(500_000), &mut store);
    assert!(actions.resync_divider);
    assert!(actions.reload_watchdog);
    assert_eq!(actions.dac, None);
    assert_eq!(ctl.state(), VcoState::Track);
    assert_eq!(ctl.prev_mark(), Some(100_010));
    assert_eq!(ctl.accumulated_error(), 10);
    assert_eq!(ctl.cycles_remaining(), 4);
    assert_eq!(ctl.deadlock_resyncs(), 1);
}

#[test]
fn test_channel_activity_keeps_watchdog_alive() {
    let (mut ctl, mut store) = tracking_from(30_000, 100_000);
    let cycle = Cycle {
        mark: Some(Err(DecodeError::NotUsable { time_valid: true })),
        watchdog_expired: true,
        ..Cycle::default()
    };
    let actions = ctl.step(&cycle, &mut store);
    assert!(actions.reload_watchdog);
    assert_eq!(ctl.state(), VcoState::Track);

    // A corrupted frame says nothing about the receiver.
    let cycle = Cycle {
        mark: Some(Err(DecodeError::ChecksumFailure)),
        watchdog_expired: true,
        ..Cycle::default()
    };
    ctl.step(&cycle, &mut store);
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);
}

#[test]
fn test_watchdog_expiry_in_track_saves_and_holds() {
    let (mut ctl, mut store) = tracking_from(30_000, 100_000);
    for value in [100_010, 100_020, 100_030, 100_040, 100_050] {
        ctl.step(&mark(value), &mut store);
    }
    assert_eq!(ctl.dac(), 30_012);

    let timers = Timers::new();
    let timeout = ctl.config().gps_timeout_ticks;
    timers.gps_watchdog.reload(timeout);
    for _ in 1..timeout {
        timers.tick();
    }
    assert!(!timers.gps_watchdog.expired());
    let quiet = Cycle {
        watchdog_expired: timers.gps_watchdog.expired(),
        ..Cycle::default()
    };
    ctl.step(&quiet, &mut store);
    assert_eq!(ctl.state(), VcoState::Track);

    timers.tick();
    assert!(timers.gps_watchdog.expired());
    let expired = Cycle {
        watchdog_expired: timers.gps_watchdog.expired(),
        ..Cycle::default()
    };
    let actions = ctl.step(&expired, &mut store);
    assert_eq!(actions.dac, None);
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);
    assert_eq!(ctl.dac(), 30_012);
    assert_eq!(store.last(), Some(30_012));
    assert_eq!(store.find_last_written(), Some(1));

    // Lock lost this way re-acquires from the held DAC.
    ctl.step(&mark(300_000), &mut store);
    assert_eq!(ctl.state(), VcoState::Acquire);
    assert_eq!(ctl.step_size(), 16_384);
    assert_eq!(ctl.dac(), 30_012);
}

#[test]
fn test_watchdog_expiry_while_arming_does_not_save() {
    let mut store = store_with(Some(30_000));
    let mut ctl = controller();
    ctl.step(&Cycle::default(), &mut store);
    ctl.step(&mark(120_000), &mut store);
    assert_eq!(ctl.state(), VcoState::TrackResync);

    let expired = Cycle {
        watchdog_expired: true,
        ..Cycle::default()
    };
    ctl.step(&expired, &mut store);
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);
    assert_eq!(store.find_last_written(), Some(0));
}

#[test]
fn test_failed_save_still_drops_to_hold() {
    let (mut ctl, _) = tracking_from(30_000, 100_000);
    // A full store whose erase fails.
    let mut store = store_with(None);
    for value in 1..=8 {
        store.append(value).unwrap();
    }
    let mut store = CalibrationStore::new(RamRegion::<16> {
        fail_erase: true,
        ..*store.region()
    });

    let expired = Cycle {
        watchdog_expired: true,
        ..Cycle::default()
    };
    ctl.step(&expired, &mut store);
    assert_eq!(ctl.state(), VcoState::DeadReckonHold);
    assert_eq!(store.last(), Some(8));
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn test_restart_reloads_from_store() {
    let (mut ctl, mut store) = tracking_from(30_000, 100_000);
    for value in [100_010, 100_020, 100_030, 100_040, 100_050] {
        ctl.step(&mark(value), &mut store);
    }
    store.append(ctl.dac()).unwrap();

    ctl.restart();
    assert_eq!(ctl.state(), VcoState::DeadReckon);
    let actions = ctl.step(&Cycle::default(), &mut store);
    assert_eq!(actions.dac, Some(30_012));
    assert_eq!(ctl.step_size(), 16_384);
    assert_eq!(ctl.accumulated_error(), 0);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = DisciplineConfig {
        average_window: 0,
        ..DisciplineConfig::new()
    };
    assert_eq!(Controller::new(config).err(), Some(ConfigError::ZeroAverageWindow));
}

#[test]
fn test_accuracy_is_recorded() {
    let (ctl, _) = tracking_from(30_000, 100_000);
    assert_eq!(ctl.last_accuracy(), 21);
}
