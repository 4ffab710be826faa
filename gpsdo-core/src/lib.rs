//! Hardware-independent core of the GPS-disciplined oscillator firmware.
//!
//! Bytes from the GPS receiver are framed by [`timemark::FrameAssembler`],
//! validated into [`TimeMark`]s by [`TimeMarkDecoder`], and fed once per
//! control cycle to the [`Controller`], which steers the VCO through its DAC
//! and keeps the last good DAC code in a [`CalibrationStore`].
//!
//! Nothing in here touches hardware. The firmware crate supplies the byte
//! stream, the tick, the DAC driver and the [`NvRegion`] backend.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod log;

pub mod config;
pub mod controller;
pub mod phase;
pub mod store;
pub mod timemark;
pub mod timers;

pub use config::{ConfigError, DisciplineConfig};
pub use controller::{Actions, Controller, Cycle, VcoState};
pub use phase::{phase_delta, MAX_MARK, MID_MARK};
pub use store::{CalibrationStore, NvError, NvRegion, StoreError, EMPTY_SLOT};
pub use timemark::{DecodeError, RawFrame, SharedAssembler, TimeMark, TimeMarkDecoder};
pub use timers::{Countdown, Timers};
