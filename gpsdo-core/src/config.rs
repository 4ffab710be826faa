use crate::phase::MAX_MARK;

/// Period of the application tick that drives every [`crate::Countdown`].
pub const TICK_MS: u32 = 10;

/// Converts a duration in milliseconds to whole ticks, saturating at `u16::MAX`.
pub const fn ms_to_ticks(ms: u32) -> u16 {
    let ticks = ms / TICK_MS;
    if ticks > u16::MAX as u32 {
        u16::MAX
    } else {
        ticks as u16
    }
}

// ── Disciplining parameters ──────────────────────────────────────────────────

/// Tuning of the VCO disciplining loop.
///
/// The defaults are the values the board was characterised with: a 16-bit
/// AD5761 in the 0..5 V range driving a 10 MHz VCO whose divided pulse is
/// time-marked by the receiver every 5 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisciplineConfig {
    /// DAC code applied when the calibration store is empty.
    pub dac_default: u16,
    /// Initial bisection step, half of the usable DAC span.
    pub acquire_step: u32,
    /// Number of marks averaged per Track correction.
    pub average_window: u8,
    /// Proportional gain numerator (DAC LSBs per ns, fixed point).
    pub gain_num: u32,
    /// Proportional gain denominator.
    pub gain_den: u32,
    /// Lower bound (exclusive) of the half-cycle deadlock band, ns.
    pub deadlock_low: u32,
    /// Upper bound (exclusive) of the half-cycle deadlock band, ns.
    pub deadlock_high: u32,
    /// GPS watchdog reload value, in ticks.
    pub gps_timeout_ticks: u16,
    /// VCO settle time after a dead-reckoning DAC load, in ticks.
    pub settle_ticks: u16,
}

impl DisciplineConfig {
    pub const fn new() -> Self {
        Self {
            dac_default: 34_150,
            acquire_step: 16_384,
            average_window: 5,
            gain_num: 1264,
            gain_den: 1000,
            deadlock_low: 400_000,
            deadlock_high: 600_000,
            gps_timeout_ticks: ms_to_ticks(12_500),
            settle_ticks: ms_to_ticks(100),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.average_window == 0 {
            return Err(ConfigError::ZeroAverageWindow);
        }
        if self.gain_den == 0 {
            return Err(ConfigError::ZeroGainDenominator);
        }
        if self.acquire_step == 0 || self.acquire_step > u16::MAX as u32 {
            return Err(ConfigError::AcquireStepOutOfRange);
        }
        if self.deadlock_low >= self.deadlock_high || self.deadlock_high > MAX_MARK {
            return Err(ConfigError::InvalidDeadlockBand);
        }
        if self.gps_timeout_ticks == 0 {
            return Err(ConfigError::ZeroGpsTimeout);
        }
        Ok(())
    }

    /// True when `mark` lies strictly inside the half-cycle deadlock band.
    pub fn in_deadlock_band(&self, mark: u32) -> bool {
        mark > self.deadlock_low && mark < self.deadlock_high
    }
}

impl Default for DisciplineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    ZeroAverageWindow,
    ZeroGainDenominator,
    AcquireStepOutOfRange,
    InvalidDeadlockBand,
    ZeroGpsTimeout,
}
