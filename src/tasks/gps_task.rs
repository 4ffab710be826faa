use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::peripherals::{DMA1_CH1, DMA1_CH3, USART3};
use embassy_stm32::usart::Uart;
use embassy_time::{Duration, Timer};

use crate::SHARED_ASSEMBLER;

/// GPS task: reads the receiver's UBX stream from USART3 and feeds every
/// byte to the shared time-mark assembler.
#[task]
pub async fn gps_task(mut gps_uart: Uart<'static, USART3, DMA1_CH3, DMA1_CH1>) {
    let mut buf = [0u8; 128];

    loop {
        // TIM-TM2 comes once per divided pulse; the timeout only bounds a stuck read.
        match select(
            gps_uart.read_until_idle(&mut buf),
            Timer::after(Duration::from_millis(1500)),
        )
        .await
        {
            Either::First(Ok(n)) => {
                let frames = SHARED_ASSEMBLER.feed_all(&buf[..n]);
                if frames > 0 {
                    defmt::trace!("gps: {=usize} bytes, frame ready", n);
                }
            }
            Either::First(Err(_)) => {
                defmt::debug!("gps uart error");
            }
            Either::Second(_) => {}
        }
    }
}
