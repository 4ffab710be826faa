use crate::config::{ConfigError, DisciplineConfig};
use crate::phase::phase_delta;
use crate::store::{CalibrationStore, NvRegion};
use crate::timemark::{DecodeError, TimeMark};

#[cfg(test)]
mod tests;

/// Operating mode of the VCO disciplining loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VcoState {
    /// Load the DAC from the calibration store (or the default) on entry.
    DeadReckon,
    /// Hold the current DAC until GPS activity shows up.
    DeadReckonHold,
    /// Bisection search towards the right DAC code.
    Acquire,
    /// Averaged proportional correction from successive marks.
    Track,
    /// Waiting for GPS activity to resync the divider before tracking.
    TrackResync,
    /// Divider resynced; waiting for the first mark to track from.
    TrackArm,
}

impl VcoState {
    /// States in which a silent receiver trips the GPS watchdog.
    pub fn is_gps_driven(self) -> bool {
        matches!(
            self,
            VcoState::Acquire | VcoState::Track | VcoState::TrackResync | VcoState::TrackArm
        )
    }
}

/// Inputs gathered for one control cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cycle {
    /// Result of validating the frame taken this cycle, if one was ready.
    pub mark: Option<Result<TimeMark, DecodeError>>,
    /// A GPS time-pulse edge was captured since the last cycle.
    pub pulse_seen: bool,
    /// The GPS watchdog countdown has reached zero.
    pub watchdog_expired: bool,
    /// The post-load settle countdown is still running.
    pub settling: bool,
}

impl Cycle {
    pub fn with_mark(mark: TimeMark) -> Self {
        Self {
            mark: Some(Ok(mark)),
            ..Self::default()
        }
    }
}

/// Side effects requested by one control cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Actions {
    /// New DAC code to write.
    pub dac: Option<u16>,
    pub reload_watchdog: bool,
    /// Start the post-load settle countdown.
    pub start_settle: bool,
    /// Reset the pulse divider so it restarts on the next GPS pulse.
    pub resync_divider: bool,
    /// Reset the decoder's epoch filter.
    pub rearm_decoder: bool,
}

/// VCO disciplining state machine.
///
/// [`Controller::step`] runs once per control cycle and returns the
/// [`Actions`] the caller must apply. The calibration store is read when
/// dead-reckoning starts and written when lock is lost from `Track`.
pub struct Controller {
    config: DisciplineConfig,
    state: VcoState,
    dac: u16,
    step: u32,
    prev_mark: Option<u32>,
    accumulated_error: i64,
    cycles_remaining: u8,
    resume_from_saved: bool,
    last_accuracy: u32,
    corrections: u32,
    deadlock_resyncs: u32,
}

impl Controller {
    pub fn new(config: DisciplineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: VcoState::DeadReckon,
            dac: config.dac_default,
            step: config.acquire_step,
            prev_mark: None,
            accumulated_error: 0,
            cycles_remaining: config.average_window,
            resume_from_saved: false,
            last_accuracy: 0,
            corrections: 0,
            deadlock_resyncs: 0,
        })
    }

    /// Back to `DeadReckon` with cleared working state.
    pub fn restart(&mut self) {
        self.state = VcoState::DeadReckon;
        self.step = self.config.acquire_step;
        self.prev_mark = None;
        self.accumulated_error = 0;
        self.cycles_remaining = self.config.average_window;
        self.resume_from_saved = false;
    }

    pub fn step<R: NvRegion>(&mut self, cycle: &Cycle, store: &mut CalibrationStore<R>) -> Actions {
        let mut actions = Actions::default();

        let (mark, channel_active) = match cycle.mark {
            Some(Ok(mark)) => {
                self.last_accuracy = mark.accuracy;
                (Some(mark.value), true)
            }
            Some(Err(err)) => (None, err.channel_active()),
            None => (None, false),
        };

        match self.state {
            VcoState::DeadReckon => self.enter_dead_reckon(store, &mut actions),
            VcoState::DeadReckonHold => {
                if !cycle.settling && (cycle.pulse_seen || mark.is_some()) {
                    self.leave_hold(&mut actions);
                }
            }
            VcoState::Acquire => {
                if let Some(mark) = mark {
                    self.acquire(mark, &mut actions);
                }
            }
            VcoState::Track => {
                if let Some(mark) = mark {
                    self.track(mark, &mut actions);
                }
            }
            VcoState::TrackResync => {
                if cycle.pulse_seen || mark.is_some() {
                    actions.resync_divider = true;
                    actions.reload_watchdog = true;
                    self.transition(VcoState::TrackArm);
                }
            }
            VcoState::TrackArm => {
                if let Some(mark) = mark {
                    actions.reload_watchdog = true;
                    self.enter_track(mark);
                }
            }
        }

        if self.state.is_gps_driven() {
            if channel_active {
                actions.reload_watchdog = true;
            }
            if cycle.watchdog_expired && !actions.reload_watchdog {
                self.gps_lost(store);
            }
        }

        actions
    }

    pub fn state(&self) -> VcoState {
        self.state
    }

    pub fn dac(&self) -> u16 {
        self.dac
    }

    /// Current bisection step (meaningful in `Acquire`).
    pub fn step_size(&self) -> u32 {
        self.step
    }

    pub fn prev_mark(&self) -> Option<u32> {
        self.prev_mark
    }

    pub fn accumulated_error(&self) -> i64 {
        self.accumulated_error
    }

    pub fn cycles_remaining(&self) -> u8 {
        self.cycles_remaining
    }

    pub fn last_accuracy(&self) -> u32 {
        self.last_accuracy
    }

    /// DAC corrections applied in `Track` since power-up.
    pub fn corrections(&self) -> u32 {
        self.corrections
    }

    pub fn deadlock_resyncs(&self) -> u32 {
        self.deadlock_resyncs
    }

    pub fn config(&self) -> &DisciplineConfig {
        &self.config
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    fn enter_dead_reckon<R: NvRegion>(&mut self, store: &mut CalibrationStore<R>, actions: &mut Actions) {
        match store.last() {
            Some(saved) => {
                self.dac = saved;
                self.resume_from_saved = true;
                info!("dead reckoning from saved DAC {=u16}", saved);
            }
            None => {
                self.dac = self.config.dac_default;
                self.resume_from_saved = false;
                // No calibration yet: pretend GPS is present for one timeout.
                actions.reload_watchdog = true;
                info!("dead reckoning from default DAC {=u16}", self.dac);
            }
        }
        actions.dac = Some(self.dac);
        actions.start_settle = true;
        actions.rearm_decoder = true;
        self.transition(VcoState::DeadReckonHold);
    }

    fn leave_hold(&mut self, actions: &mut Actions) {
        actions.reload_watchdog = true;
        if self.resume_from_saved {
            self.resume_from_saved = false;
            self.transition(VcoState::TrackResync);
        } else {
            actions.resync_divider = true;
            self.step = self.config.acquire_step;
            self.prev_mark = None;
            self.transition(VcoState::Acquire);
        }
    }

    fn acquire(&mut self, mark: u32, actions: &mut Actions) {
        let Some(prev) = self.prev_mark else {
            self.prev_mark = Some(mark);
            return;
        };

        let step = self.step.min(u16::MAX as u32) as u16;
        self.dac = if mark > prev {
            self.dac.saturating_sub(step)
        } else {
            self.dac.saturating_add(step)
        };
        actions.dac = Some(self.dac);
        debug!("acquire: mark {=u32} step {=u32} dac {=u16}", mark, self.step, self.dac);

        if self.step > 1 {
            self.step >>= 1;
            self.prev_mark = Some(mark);
        } else {
            self.enter_track(mark);
        }
    }

    fn enter_track(&mut self, mark: u32) {
        self.prev_mark = Some(mark);
        self.accumulated_error = 0;
        self.cycles_remaining = self.config.average_window;
        self.transition(VcoState::Track);
    }

    fn track(&mut self, mark: u32, actions: &mut Actions) {
        if self.config.in_deadlock_band(mark) {
            warn!("mark {=u32} in deadlock band, resyncing divider", mark);
            self.deadlock_resyncs = self.deadlock_resyncs.wrapping_add(1);
            actions.resync_divider = true;
            actions.reload_watchdog = true;
            return;
        }

        if let Some(prev) = self.prev_mark {
            if mark != prev {
                self.accumulated_error += phase_delta(prev, mark) as i64;
            }
        }
        self.prev_mark = Some(mark);

        self.cycles_remaining = self.cycles_remaining.saturating_sub(1);
        if self.cycles_remaining > 0 {
            return;
        }
        self.cycles_remaining = self.config.average_window;

        let average = self.accumulated_error / self.config.average_window as i64;
        self.accumulated_error = 0;
        let correction = average.unsigned_abs() * self.config.gain_num as u64 / self.config.gain_den as u64;
        let correction = correction.min(u16::MAX as u64) as u16;
        self.dac = if average < 0 {
            self.dac.saturating_sub(correction)
        } else {
            self.dac.saturating_add(correction)
        };
        self.corrections = self.corrections.wrapping_add(1);
        actions.dac = Some(self.dac);
        debug!("track: average {=i64} correction {=u16} dac {=u16}", average, correction, self.dac);
    }

    fn gps_lost<R: NvRegion>(&mut self, store: &mut CalibrationStore<R>) {
        warn!("GPS watchdog expired in {}", self.state);
        match self.state {
            VcoState::Acquire => self.transition(VcoState::DeadReckon),
            VcoState::Track => {
                if let Err(_err) = store.append(self.dac) {
                    warn!("saving DAC {=u16} failed: {}", self.dac, _err);
                }
                self.enter_hold_keeping_dac();
            }
            _ => self.enter_hold_keeping_dac(),
        }
    }

    fn enter_hold_keeping_dac(&mut self) {
        self.resume_from_saved = false;
        self.prev_mark = None;
        self.transition(VcoState::DeadReckonHold);
    }

    fn transition(&mut self, next: VcoState) {
        if next != self.state {
            info!("vco {} -> {}", self.state, next);
            self.state = next;
        }
    }
}
