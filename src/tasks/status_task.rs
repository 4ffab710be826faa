use embassy_executor::task;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;

use crate::state::DisciplineStatus;

/// Status task: logs each snapshot the disciplining loop publishes.
#[task]
pub async fn status_task(status_rx: Receiver<'static, CriticalSectionRawMutex, DisciplineStatus, 1>) {
    loop {
        let s = status_rx.receive().await;
        defmt::info!(
            "[VCO] {} dac={=u16} step={=u32} err={=i64} acc={=u32}ns wd={=u16}",
            s.state,
            s.dac,
            s.step,
            s.accumulated_error,
            s.accuracy_ns,
            s.watchdog_ticks
        );
        defmt::info!(
            "[STAT] corr={=u32} deadlock={=u32} erases={=u32} dec={} framing={}",
            s.corrections,
            s.deadlock_resyncs,
            s.store_erases,
            s.decoder,
            s.framing
        );
    }
}
