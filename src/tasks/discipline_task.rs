use core::sync::atomic::Ordering;

use embassy_executor::task;
use embassy_stm32::peripherals::SPI1;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Ticker};
use gpsdo_core::config::TICK_MS;
use gpsdo_core::{Actions, CalibrationStore, Controller, Cycle, TimeMarkDecoder};

use crate::drivers::ad5761::Ad5761;
use crate::drivers::flash::FlashRegion;
use crate::state::DisciplineStatus;
use crate::{DIVIDER_RESYNC, PULSE_SEEN, SHARED_ASSEMBLER, TIMERS};

/// Control cycles between two status snapshots (5 s).
const STATUS_EVERY: u32 = 5_000 / TICK_MS;

// ── Task ─────────────────────────────────────────────────────────────────────

/// Disciplining loop, one control cycle per tick.
///
/// Takes the ready frame, validates it, steps the controller and applies the
/// requested actions to the DAC, the countdowns and the pulse divider.
#[task]
pub async fn discipline_task(
    mut dac: Ad5761<'static, SPI1>,
    mut store: CalibrationStore<FlashRegion<'static>>,
    mut controller: Controller,
    status_tx: Sender<'static, CriticalSectionRawMutex, DisciplineStatus, 1>,
) {
    let mut decoder = TimeMarkDecoder::new();
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS as u64));
    let mut cycles: u32 = 0;

    loop {
        ticker.next().await;
        cycles = cycles.wrapping_add(1);

        // ── A. Gather inputs ─────────────────────────────────────────────────
        let cycle = Cycle {
            mark: SHARED_ASSEMBLER.take().map(|frame| decoder.validate(&frame)),
            pulse_seen: PULSE_SEEN.swap(false, Ordering::AcqRel),
            watchdog_expired: TIMERS.gps_watchdog.expired(),
            settling: !TIMERS.settle.expired(),
        };
        if let Some(Err(e)) = cycle.mark {
            defmt::trace!("time-mark rejected: {}", e);
        }

        // ── B. Step ──────────────────────────────────────────────────────────
        let actions = controller.step(&cycle, &mut store);

        // ── C. Apply ─────────────────────────────────────────────────────────
        apply(&actions, &controller, &mut dac, &mut decoder);

        // ── D. Status ────────────────────────────────────────────────────────
        if cycles % STATUS_EVERY == 0 {
            let status = DisciplineStatus {
                state: controller.state(),
                dac: controller.dac(),
                step: controller.step_size(),
                accumulated_error: controller.accumulated_error(),
                accuracy_ns: controller.last_accuracy(),
                corrections: controller.corrections(),
                deadlock_resyncs: controller.deadlock_resyncs(),
                watchdog_ticks: TIMERS.gps_watchdog.remaining(),
                store_erases: store.erases(),
                decoder: decoder.stats(),
                framing: SHARED_ASSEMBLER.stats(),
            };
            let _ = status_tx.try_send(status);
        }
    }
}

fn apply(
    actions: &Actions,
    controller: &Controller,
    dac: &mut Ad5761<'static, SPI1>,
    decoder: &mut TimeMarkDecoder,
) {
    let config = controller.config();

    if actions.rearm_decoder {
        decoder.rearm();
    }
    if let Some(code) = actions.dac {
        if dac.set(code).is_err() {
            defmt::warn!("DAC write {=u16} failed", code);
        }
    }
    if actions.start_settle {
        TIMERS.settle.reload(config.settle_ticks);
    }
    if actions.reload_watchdog {
        TIMERS.gps_watchdog.reload(config.gps_timeout_ticks);
    }
    if actions.resync_divider {
        DIVIDER_RESYNC.signal(());
    }
}
