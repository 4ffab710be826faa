#![no_std]
#![no_main]

mod board;
mod drivers;
mod state;
mod tasks;

use core::sync::atomic::AtomicBool;
use embassy_executor::Spawner;
use embassy_stm32::dma::NoDma;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Input, Level, Output, Pin, Pull, Speed};
use embassy_stm32::spi::{Config as SpiConfig, Spi, MODE_1};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use gpsdo_core::{CalibrationStore, Controller, DisciplineConfig, SharedAssembler, Timers};
use {defmt_rtt as _, panic_probe as _};

use crate::board::{Board, DAC_SPI_HZ, GPS_BAUD};
use crate::drivers::ad5761::Ad5761;
use crate::drivers::flash::FlashRegion;
use crate::state::DisciplineStatus;

// ── Shared between tasks ──────────────────────────────────────────────────────
/// Time-mark frames from gps_task to the disciplining loop.
pub static SHARED_ASSEMBLER: SharedAssembler = SharedAssembler::new();
/// GPS watchdog and VCO settle countdowns, ticked by tick_task.
pub static TIMERS: Timers = Timers::new();
/// Set on every GPS time-pulse edge, cleared by the disciplining loop.
pub static PULSE_SEEN: AtomicBool = AtomicBool::new(false);
/// Request to hold the pulse divider in reset until the next GPS edge.
pub static DIVIDER_RESYNC: Signal<CriticalSectionRawMutex, ()> = Signal::new();

//  Cap=1: the status task only ever wants the latest snapshot.
static STATUS_CHAN: Channel<CriticalSectionRawMutex, DisciplineStatus, 1> = Channel::new();

// ── Interrupt bindings ────────────────────────────────────────────────────────
bind_interrupts!(struct Irqs {
    USART3 => embassy_stm32::usart::InterruptHandler<peripherals::USART3>;
});

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    defmt::info!("gpsdo firmware starting");

    // 2. SPI1 @ 1 MHz, mode 1: AD5761 DAC (SCK=PA5, MOSI=PA7, MISO=PA6, CS=PB12)
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = TimeHertz(DAC_SPI_HZ);
    spi_config.mode = MODE_1;
    let spi = Spi::new(
        board.dac.spi,
        board.dac.sck, board.dac.mosi, board.dac.miso,
        NoDma, NoDma,
        spi_config,
    );
    let cs_dac = Output::new(board.dac.cs.degrade(), Level::High, Speed::VeryHigh);
    let mut dac = Ad5761::new(spi, cs_dac);
    Timer::after(Duration::from_millis(10)).await;
    if dac.init().is_err() {
        defmt::error!("AD5761 init failed");
    }

    // 3. Calibration region in flash sector 11
    let store = CalibrationStore::new(FlashRegion::new(Flash::new_blocking(board.flash)));

    // 4. GPS USART3 @ 38400 (TX=PB10, RX=PB11)
    let mut gps_config = UsartConfig::default();
    gps_config.baudrate = GPS_BAUD;
    let gps_uart = Uart::new(
        board.gps.uart, board.gps.rx, board.gps.tx,
        Irqs,
        board.gps.tx_dma, board.gps.rx_dma,
        gps_config,
    ).unwrap();

    // 5. GPS time pulse (PA8, EXTI8) and divider reset (PA9)
    let pulse = ExtiInput::new(Input::new(board.pulse.pulse, Pull::Down), board.pulse.exti);
    let divider_reset = Output::new(board.pulse.divider_reset, Level::Low, Speed::Low);

    // 6. Heartbeat LED (PC13)
    let mut led = Output::new(board.led, Level::High, Speed::Low);

    // 7. Spawn all tasks
    let controller = Controller::new(DisciplineConfig::new()).unwrap();

    spawner.spawn(tasks::tick_task::tick_task()).unwrap();

    spawner.spawn(tasks::gps_task::gps_task(gps_uart)).unwrap();

    spawner.spawn(tasks::pulse_task::pulse_task(pulse, divider_reset)).unwrap();

    spawner.spawn(tasks::discipline_task::discipline_task(
        dac,
        store,
        controller,
        STATUS_CHAN.sender(),
    )).unwrap();

    spawner.spawn(tasks::status_task::status_task(
        STATUS_CHAN.receiver(),
    )).unwrap();

    // 8. Main task: LED heartbeat @ 1 Hz
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(500)).await;
    }
}
