use embassy_stm32::flash::{Blocking, Error, Flash};
use gpsdo_core::{NvError, NvRegion, EMPTY_SLOT};

/// Sector 11, the last 128 KiB sector of the STM32F405RG.
pub const REGION_OFFSET: u32 = 0x000E_0000;
pub const REGION_SIZE: u32 = 128 * 1024;
/// Programming granule. Each stored byte occupies one word.
const WORD: u32 = 4;
/// Slots scanned by the store. A full scan costs 2 KiB of reads.
pub const REGION_SLOTS: usize = 256;

/// Calibration region in internal flash.
pub struct FlashRegion<'d> {
    flash: Flash<'d, Blocking>,
}

impl<'d> FlashRegion<'d> {
    pub fn new(flash: Flash<'d, Blocking>) -> Self {
        Self { flash }
    }

    fn byte_address(offset: usize) -> u32 {
        REGION_OFFSET + offset as u32 * WORD
    }
}

impl NvRegion for FlashRegion<'_> {
    fn slots(&self) -> usize {
        REGION_SLOTS
    }

    fn read_slot(&mut self, slot: usize) -> u16 {
        if slot >= REGION_SLOTS {
            return EMPTY_SLOT;
        }
        let mut words = [0u8; 2 * WORD as usize];
        match self.flash.blocking_read(Self::byte_address(2 * slot), &mut words) {
            Ok(()) => u16::from_le_bytes([words[0], words[WORD as usize]]),
            Err(_) => EMPTY_SLOT,
        }
    }

    fn program_byte(&mut self, offset: usize, byte: u8) -> Result<(), NvError> {
        if offset >= 2 * REGION_SLOTS {
            return Err(NvError::OutOfRange);
        }
        self.flash
            .blocking_write(Self::byte_address(offset), &[byte, 0xFF, 0xFF, 0xFF])
            .map_err(|e| nv_error(e, NvError::Program))
    }

    fn erase(&mut self) -> Result<(), NvError> {
        self.flash
            .blocking_erase(REGION_OFFSET, REGION_OFFSET + REGION_SIZE)
            .map_err(|e| nv_error(e, NvError::Erase))
    }
}

fn nv_error(err: Error, op: NvError) -> NvError {
    match err {
        Error::Seq | Error::Protected => NvError::Unlock,
        Error::Size | Error::Unaligned => NvError::OutOfRange,
        _ => op,
    }
}
