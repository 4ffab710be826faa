//! Append-only, wear-levelled store for the last good DAC code.
//!
//! The region is a flat array of `u16` slots. An erased slot reads
//! [`EMPTY_SLOT`]; written slots form one contiguous run from slot 0. A new
//! value goes into the first empty slot, found by a linear scan from the
//! start. When every slot is used the whole region is erased and writing
//! restarts at slot 0. Nothing is ever overwritten in place, so a power loss
//! mid-write can at worst leave the newest slot half-programmed.

/// Value of an unwritten slot. Never stored as data.
pub const EMPTY_SLOT: u16 = 0xFFFF;

/// Failure reported by the non-volatile backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvError {
    /// The unlock sequence was not accepted.
    Unlock,
    Program,
    Erase,
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    Erase(NvError),
    Program(NvError),
}

/// Byte-programmable non-volatile region with NOR-flash semantics.
///
/// `program_byte` and `erase` each perform the device unlock sequence
/// themselves. The store calls them with interrupts masked.
pub trait NvRegion {
    /// Number of `u16` slots in the region.
    fn slots(&self) -> usize;

    /// Reads a slot. Unreadable slots report [`EMPTY_SLOT`].
    fn read_slot(&mut self, slot: usize) -> u16;

    /// Programs one byte. `offset` counts bytes from the start of the
    /// region; slot `n` occupies offsets `2n` (low) and `2n + 1` (high).
    fn program_byte(&mut self, offset: usize, byte: u8) -> Result<(), NvError>;

    /// Erases the whole region back to [`EMPTY_SLOT`].
    fn erase(&mut self) -> Result<(), NvError>;
}

pub struct CalibrationStore<R> {
    region: R,
    erases: u32,
}

impl<R: NvRegion> CalibrationStore<R> {
    pub fn new(region: R) -> Self {
        Self { region, erases: 0 }
    }

    /// Index of the newest written slot, or `None` for an empty region.
    pub fn find_last_written(&mut self) -> Option<usize> {
        let slots = self.region.slots();
        let mut next = 0;
        while next < slots && self.region.read_slot(next) != EMPTY_SLOT {
            next += 1;
        }
        next.checked_sub(1)
    }

    /// Newest stored value, or [`EMPTY_SLOT`] when nothing has been written.
    pub fn read_last(&mut self) -> u16 {
        match self.find_last_written() {
            Some(slot) => self.region.read_slot(slot),
            None => EMPTY_SLOT,
        }
    }

    /// Newest stored value, if any.
    pub fn last(&mut self) -> Option<u16> {
        Some(self.read_last()).filter(|&value| value != EMPTY_SLOT)
    }

    /// Appends `value`, erasing the region first when it is full.
    ///
    /// Appending [`EMPTY_SLOT`] succeeds without touching the region. A
    /// failed erase or program is reported but not retried; callers treat
    /// the store as best-effort.
    pub fn append(&mut self, value: u16) -> Result<(), StoreError> {
        if value == EMPTY_SLOT {
            return Ok(());
        }

        let mut slot = self.find_last_written().map_or(0, |last| last + 1);
        if slot >= self.region.slots() {
            info!("calibration region full, erasing");
            let region = &mut self.region;
            critical_section::with(|_cs| region.erase()).map_err(StoreError::Erase)?;
            self.erases = self.erases.wrapping_add(1);
            slot = 0;
        }

        let [low, high] = value.to_le_bytes();
        self.program(2 * slot, low)?;
        self.program(2 * slot + 1, high)?;
        debug!("calibration {=u16} saved to slot {=usize}", value, slot);
        Ok(())
    }

    /// Number of full-region erases since power-up.
    pub fn erases(&self) -> u32 {
        self.erases
    }

    pub fn region(&self) -> &R {
        &self.region
    }

    fn program(&mut self, offset: usize, byte: u8) -> Result<(), StoreError> {
        let region = &mut self.region;
        critical_section::with(|_cs| region.program_byte(offset, byte)).map_err(StoreError::Program)
    }
}

// ── Test double ──────────────────────────────────────────────────────────────

/// RAM region with NOR-flash behaviour: programming only clears bits and
/// erase sets every byte back to 0xFF.
#[cfg(test)]
pub(crate) struct RamRegion<const N: usize> {
    pub bytes: [u8; N],
    pub erase_count: usize,
    pub program_count: usize,
    pub fail_erase: bool,
}

#[cfg(test)]
impl<const N: usize> RamRegion<N> {
    pub fn new() -> Self {
        Self {
            bytes: [0xFF; N],
            erase_count: 0,
            program_count: 0,
            fail_erase: false,
        }
    }
}

#[cfg(test)]
impl<const N: usize> NvRegion for RamRegion<N> {
    fn slots(&self) -> usize {
        N / 2
    }

    fn read_slot(&mut self, slot: usize) -> u16 {
        match self.bytes.get(2 * slot..2 * slot + 2) {
            Some(pair) => u16::from_le_bytes([pair[0], pair[1]]),
            None => EMPTY_SLOT,
        }
    }

    fn program_byte(&mut self, offset: usize, byte: u8) -> Result<(), NvError> {
        let cell = self.bytes.get_mut(offset).ok_or(NvError::OutOfRange)?;
        *cell &= byte;
        self.program_count += 1;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), NvError> {
        if self.fail_erase {
            return Err(NvError::Erase);
        }
        self.bytes = [0xFF; N];
        self.erase_count += 1;
        Ok(())
    }
}
