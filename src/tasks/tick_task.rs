use embassy_executor::task;
use embassy_time::{Duration, Ticker};
use gpsdo_core::config::TICK_MS;

use crate::TIMERS;

/// Application tick: decrements every countdown once per `TICK_MS`.
#[task]
pub async fn tick_task() {
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS as u64));
    loop {
        ticker.next().await;
        TIMERS.tick();
    }
}
