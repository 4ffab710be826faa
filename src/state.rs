//! Status snapshot published by the disciplining loop.
//!
//! `Copy` so it can go through a capacity-1 channel without borrowing.

use gpsdo_core::timemark::{AssemblerStats, DecoderStats};
use gpsdo_core::VcoState;

#[derive(Clone, Copy, defmt::Format)]
pub struct DisciplineStatus {
    pub state: VcoState,
    pub dac: u16,
    /// Bisection step, meaningful while acquiring.
    pub step: u32,
    pub accumulated_error: i64,
    /// Receiver accuracy estimate of the last accepted mark, ns.
    pub accuracy_ns: u32,
    pub corrections: u32,
    pub deadlock_resyncs: u32,
    pub watchdog_ticks: u16,
    pub store_erases: u32,
    pub decoder: DecoderStats,
    pub framing: AssemblerStats,
}
