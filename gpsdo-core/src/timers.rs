use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// A 16-bit countdown shared between the tick context and the control loop.
///
/// The counter sits behind a critical-section mutex: a load or reload from
/// the control loop can never interleave with a decrement from the tick.
pub struct Countdown {
    ticks: Mutex<CriticalSectionRawMutex, Cell<u16>>,
}

impl Countdown {
    /// Creates an already-expired countdown.
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    pub fn reload(&self, ticks: u16) {
        self.ticks.lock(|cell| cell.set(ticks));
    }

    /// Decrements by one tick, stopping at zero.
    pub fn tick(&self) {
        self.ticks.lock(|cell| cell.set(cell.get().saturating_sub(1)));
    }

    pub fn remaining(&self) -> u16 {
        self.ticks.lock(|cell| cell.get())
    }

    pub fn expired(&self) -> bool {
        self.remaining() == 0
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

/// The countdowns driven by the application tick.
pub struct Timers {
    /// Reloaded by GPS activity; reaching zero means GPS is lost.
    pub gps_watchdog: Countdown,
    /// Holds off GPS reaction while the VCO settles after a DAC load.
    pub settle: Countdown,
}

impl Timers {
    pub const fn new() -> Self {
        Self {
            gps_watchdog: Countdown::new(),
            settle: Countdown::new(),
        }
    }

    /// Advances every countdown by one tick. Called from the tick context.
    pub fn tick(&self) {
        self.gps_watchdog.tick();
        self.settle.tick();
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_starts_expired() {
        let countdown = Countdown::new();
        assert!(countdown.expired());
        countdown.tick();
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn test_countdown_expires_after_reload_ticks() {
        let countdown = Countdown::new();
        countdown.reload(3);
        countdown.tick();
        countdown.tick();
        assert!(!countdown.expired());
        countdown.tick();
        assert!(countdown.expired());
    }

    #[test]
    fn test_timers_tick_all() {
        static TIMERS: Timers = Timers::new();
        TIMERS.gps_watchdog.reload(2);
        TIMERS.settle.reload(1);
        TIMERS.tick();
        assert_eq!(TIMERS.gps_watchdog.remaining(), 1);
        assert!(TIMERS.settle.expired());
    }
}
