use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

/// UBX sync chars, TIM class, TM2 id.
pub const PREFIX: [u8; 4] = [0xB5, 0x62, CLASS_TIM, ID_TIM_TM2];
pub const CLASS_TIM: u8 = 0x0D;
pub const ID_TIM_TM2: u8 = 0x03;

/// Bytes captured after the prefix beyond the payload: length field and checksum.
pub const FRAME_OVERHEAD: usize = 4;
/// Capture buffer size. A frame that would not fit aborts back to scanning.
pub const FRAME_CAPACITY: usize = 40;

/// A complete captured frame: length field, payload, two checksum bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8, FRAME_CAPACITY>,
}

impl RawFrame {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Vec::from_slice(bytes).ok().map(|bytes| Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssemblerState {
    /// Looking for the prefix; `matched` bytes of it seen so far.
    Scanning { matched: u8 },
    /// Prefix seen, capturing into the buffer.
    Armed,
    /// A frame is complete and waits to be taken.
    Ready,
}

/// Why the assembler fell back to scanning. Never surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resync {
    PrefixMismatch,
    BufferOverflow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssemblerStats {
    pub frames: u16,
    pub prefix_restarts: u16,
    pub overflows: u16,
}

/// Byte-at-a-time framer for the time-mark message.
///
/// The prefix automaton restarts from position 0 on any mismatch without
/// re-examining the offending byte. Once armed, bytes are captured until
/// `buffer[0] + FRAME_OVERHEAD` bytes are held. While a frame is ready every
/// incoming byte is dropped.
pub struct FrameAssembler {
    state: AssemblerState,
    buffer: Vec<u8, FRAME_CAPACITY>,
    stats: AssemblerStats,
}

impl FrameAssembler {
    pub const fn new() -> Self {
        Self {
            state: AssemblerState::Scanning { matched: 0 },
            buffer: Vec::new(),
            stats: AssemblerStats {
                frames: 0,
                prefix_restarts: 0,
                overflows: 0,
            },
        }
    }

    /// Consumes one byte. Returns a copy of the frame when it completes.
    pub fn feed(&mut self, byte: u8) -> Option<RawFrame> {
        match self.state {
            AssemblerState::Ready => None,
            AssemblerState::Scanning { matched } => {
                if PREFIX[matched as usize] == byte {
                    let matched = matched + 1;
                    if matched as usize == PREFIX.len() {
                        self.buffer.clear();
                        self.state = AssemblerState::Armed;
                    } else {
                        self.state = AssemblerState::Scanning { matched };
                    }
                } else if matched > 0 {
                    self.resync(Resync::PrefixMismatch);
                }
                None
            }
            AssemblerState::Armed => {
                if self.buffer.push(byte).is_err() {
                    self.resync(Resync::BufferOverflow);
                    return None;
                }
                let expected = self.buffer[0] as usize + FRAME_OVERHEAD;
                if self.buffer.len() >= expected {
                    self.state = AssemblerState::Ready;
                    self.stats.frames = self.stats.frames.wrapping_add(1);
                    return Some(RawFrame {
                        bytes: self.buffer.clone(),
                    });
                }
                if self.buffer.len() >= FRAME_CAPACITY {
                    self.resync(Resync::BufferOverflow);
                }
                None
            }
        }
    }

    /// Takes the ready frame, if any, and resumes scanning.
    pub fn take(&mut self) -> Option<RawFrame> {
        if self.state != AssemblerState::Ready {
            return None;
        }
        let frame = RawFrame {
            bytes: self.buffer.clone(),
        };
        self.release();
        Some(frame)
    }

    /// Drops any partial or ready frame and resumes scanning.
    pub fn release(&mut self) {
        self.buffer.clear();
        self.state = AssemblerState::Scanning { matched: 0 };
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    fn resync(&mut self, reason: Resync) {
        match reason {
            Resync::PrefixMismatch => {
                self.stats.prefix_restarts = self.stats.prefix_restarts.wrapping_add(1)
            }
            Resync::BufferOverflow => {
                self.stats.overflows = self.stats.overflows.wrapping_add(1);
                trace!("time-mark capture overflow");
            }
        }
        self.release();
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// [`FrameAssembler`] shared between the byte-receive context and the
/// control loop.
///
/// The receive side only feeds; the control loop only takes. Both go through
/// the same critical section, so the loop never sees a half-captured frame.
pub struct SharedAssembler {
    inner: Mutex<CriticalSectionRawMutex, RefCell<FrameAssembler>>,
}

impl SharedAssembler {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(FrameAssembler::new())),
        }
    }

    /// Feeds one byte; true when it completed a frame.
    pub fn feed(&self, byte: u8) -> bool {
        self.inner.lock(|assembler| assembler.borrow_mut().feed(byte).is_some())
    }

    /// Feeds a burst of bytes; returns how many frames completed.
    pub fn feed_all(&self, bytes: &[u8]) -> usize {
        bytes.iter().filter(|&&byte| self.feed(byte)).count()
    }

    /// Copies out the ready frame and reopens the assembler.
    pub fn take(&self) -> Option<RawFrame> {
        self.inner.lock(|assembler| assembler.borrow_mut().take())
    }

    pub fn stats(&self) -> AssemblerStats {
        self.inner.lock(|assembler| assembler.borrow().stats())
    }
}

impl Default for SharedAssembler {
    fn default() -> Self {
        Self::new()
    }
}
