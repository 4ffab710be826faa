use core::sync::atomic::Ordering;

use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Output;
use embassy_stm32::peripherals::{PA8, PA9};

use crate::{DIVIDER_RESYNC, PULSE_SEEN};

/// Time-pulse task.
///
/// Flags every rising edge of the GPS time pulse for the disciplining loop.
/// A resync request holds the divider in reset; the next GPS edge releases
/// it so the divided VCO pulse restarts in step with GPS time.
#[task]
pub async fn pulse_task(mut pulse: ExtiInput<'static, PA8>, mut divider_reset: Output<'static, PA9>) {
    loop {
        match select(pulse.wait_for_rising_edge(), DIVIDER_RESYNC.wait()).await {
            Either::First(()) => {
                PULSE_SEEN.store(true, Ordering::Release);
                if divider_reset.is_set_high() {
                    divider_reset.set_low();
                    defmt::info!("divider resynced to GPS pulse");
                }
            }
            Either::Second(()) => {
                divider_reset.set_high();
            }
        }
    }
}
