use embassy_stm32::peripherals::{
    DMA1_CH1, DMA1_CH3, EXTI8, FLASH, PA5, PA6, PA7, PA8, PA9, PB10, PB11, PB12, PC13, SPI1,
    USART3,
};
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::Config;

/// GPS receiver link. The receiver only pushes TIM-TM2 reports.
pub const GPS_BAUD: u32 = 38_400;
/// AD5761 SPI clock.
pub const DAC_SPI_HZ: u32 = 1_000_000;

// ── Peripheral groups ────────────────────────────────────────────────────────

pub struct GpsResources {
    pub uart: USART3,
    pub rx: PB11,
    pub tx: PB10,
    pub rx_dma: DMA1_CH1,
    pub tx_dma: DMA1_CH3,
}

pub struct PulseResources {
    /// GPS time pulse, rising edge.
    pub pulse: PA8,
    pub exti: EXTI8,
    /// Divider chain reset, active high.
    pub divider_reset: PA9,
}

pub struct DacResources {
    pub spi: SPI1,
    pub sck: PA5,
    pub mosi: PA7,
    pub miso: PA6,
    pub cs: PB12,
}

pub struct Board {
    pub gps: GpsResources,
    pub pulse: PulseResources,
    pub dac: DacResources,
    pub flash: FLASH,
    pub led: PC13,
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2), // 168 MHz
            divq: None,
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        let p = embassy_stm32::init(config);

        Self {
            gps: GpsResources {
                uart: p.USART3,
                rx: p.PB11,
                tx: p.PB10,
                rx_dma: p.DMA1_CH1,
                tx_dma: p.DMA1_CH3,
            },
            pulse: PulseResources {
                pulse: p.PA8,
                exti: p.EXTI8,
                divider_reset: p.PA9,
            },
            dac: DacResources {
                spi: p.SPI1,
                sck: p.PA5,
                mosi: p.PA7,
                miso: p.PA6,
                cs: p.PB12,
            },
            flash: p.FLASH,
            led: p.PC13,
        }
    }
}
