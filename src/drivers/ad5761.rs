use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Error, Instance, Spi};

// ── Commands (upper nibble of the 24-bit frame is don't-care) ────────────────
const CMD_FULL_RESET: u8 = 0xF;
const CMD_WRITE_UPDATE_DAC: u8 = 0x3;
const CMD_WRITE_CONTROL: u8 = 0x4;
const CMD_READ_CONTROL: u8 = 0xC;
const CMD_NOP: u8 = 0x0;

// ── Control register ─────────────────────────────────────────────────────────
const CV_MIDSCALE: u16 = 0x0200;
const ETS: u16 = 0x0040;
const IRO: u16 = 0x0020;
const PV_MIDSCALE: u16 = 0x0008;
/// 0 V to +5 V output range.
const RA_0_5V: u16 = 0x0003;

/// Clear and power-up to midscale, thermal shutdown, internal reference, 0..5 V.
pub const CONTROL_CONFIG: u16 = CV_MIDSCALE | ETS | IRO | PV_MIDSCALE | RA_0_5V;

/// AD5761 16-bit DAC steering the VCO tuning voltage.
pub struct Ad5761<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> Ad5761<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    fn transfer(&mut self, cmd: u8, data: u16) -> Result<[u8; 3], Error> {
        let [hi, lo] = data.to_be_bytes();
        let mut frame = [cmd & 0x0F, hi, lo];
        self.cs.set_low();
        let res = self.spi.blocking_transfer_in_place(&mut frame);
        self.cs.set_high();
        res.map(|_| frame)
    }

    /// Resets the part and programs the output range.
    pub fn init(&mut self) -> Result<(), Error> {
        self.transfer(CMD_FULL_RESET, 0)?;
        self.transfer(CMD_WRITE_CONTROL, CONTROL_CONFIG)?;
        let control = self.read_control()?;
        if control & 0x07FF != CONTROL_CONFIG {
            defmt::warn!("AD5761 control readback {=u16:#x}", control);
        }
        Ok(())
    }

    /// Writes and latches a new output code.
    pub fn set(&mut self, code: u16) -> Result<(), Error> {
        self.transfer(CMD_WRITE_UPDATE_DAC, code).map(|_| ())
    }

    pub fn read_control(&mut self) -> Result<u16, Error> {
        self.transfer(CMD_READ_CONTROL, 0)?;
        let [_, hi, lo] = self.transfer(CMD_NOP, 0)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }
}
