//! Time-mark decoding for the u-blox TIM-TM2 message.
//!
//! [`FrameAssembler`] pulls frames out of the raw byte stream; the
//! [`TimeMarkDecoder`] checks them and extracts the rising-edge time-mark.

mod frame;


pub use frame::{
    AssemblerState, AssemblerStats, FrameAssembler, RawFrame, Resync, SharedAssembler, CLASS_TIM,
    FRAME_CAPACITY, FRAME_OVERHEAD, ID_TIM_TM2, PREFIX,
};

// ── TIM-TM2 layout (offsets into the captured frame) ─────────────────────────

const LEN_OFFSET: usize = 0;
const CHANNEL_OFFSET: usize = 2;
const FLAGS_OFFSET: usize = 3;
const WEEK_OFFSET: usize = 6;
const TOW_MS_OFFSET: usize = 10;
const TOW_SUB_NS_OFFSET: usize = 14;
const ACCURACY_OFFSET: usize = 26;

/// Payload length of TIM-TM2.
pub const TM2_PAYLOAD_LEN: usize = 28;

pub const FLAG_TIME_VALID: u8 = 0x40;
pub const FLAG_RISING_EDGE: u8 = 0x80;

/// Advance of the coarse time-of-week between two accepted marks, ms.
/// Matches the period of the divided VCO pulse.
pub const EPOCH_MARGIN_MS: u32 = 5_000;

const NO_WEEK: u16 = 0xFFFF;
const NO_TOW: u32 = 0xFFFF_FFFF;

/// A validated rising-edge time-mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeMark {
    /// Sub-millisecond part of the edge time, ns (`0..MAX_MARK`).
    pub value: u32,
    /// Receiver's accuracy estimate, ns.
    pub accuracy: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Length field too small to hold a TIM-TM2 payload.
    Malformed,
    ChecksumFailure,
    /// Checksum good, but not a time-valid rising edge on channel 0.
    NotUsable { time_valid: bool },
    /// Same pulse reported again, or the epoch jumped.
    DuplicateOrStaleEpoch,
}

impl DecodeError {
    /// True when the receiver is up and reporting valid time even though
    /// this frame did not yield a usable mark.
    pub fn channel_active(&self) -> bool {
        match self {
            DecodeError::NotUsable { time_valid } => *time_valid,
            DecodeError::DuplicateOrStaleEpoch => true,
            DecodeError::Malformed | DecodeError::ChecksumFailure => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecoderStats {
    pub accepted: u16,
    pub checksum_failures: u16,
    pub malformed: u16,
    pub unusable: u16,
    pub stale: u16,
}

/// Checks captured frames and filters duplicate reports of the same pulse.
///
/// The filter expects each accepted frame to carry the previous frame's
/// week and a time-of-week exactly [`EPOCH_MARGIN_MS`] later. It survives
/// across frames and is reset only by [`TimeMarkDecoder::rearm`].
pub struct TimeMarkDecoder {
    expected_week: u16,
    expected_tow_ms: u32,
    stats: DecoderStats,
}

impl TimeMarkDecoder {
    pub const fn new() -> Self {
        Self {
            expected_week: NO_WEEK,
            expected_tow_ms: NO_TOW,
            stats: DecoderStats {
                accepted: 0,
                checksum_failures: 0,
                malformed: 0,
                unusable: 0,
                stale: 0,
            },
        }
    }

    /// Forgets the epoch expectation. The next usable frame only primes it.
    pub fn rearm(&mut self) {
        self.expected_week = NO_WEEK;
        self.expected_tow_ms = NO_TOW;
    }

    pub fn validate(&mut self, frame: &RawFrame) -> Result<TimeMark, DecodeError> {
        let result = self.check(frame.as_bytes());
        match result {
            Ok(_) => self.stats.accepted = self.stats.accepted.wrapping_add(1),
            Err(DecodeError::Malformed) => self.stats.malformed = self.stats.malformed.wrapping_add(1),
            Err(DecodeError::ChecksumFailure) => {
                self.stats.checksum_failures = self.stats.checksum_failures.wrapping_add(1);
                debug!("time-mark checksum failure");
            }
            Err(DecodeError::NotUsable { .. }) => self.stats.unusable = self.stats.unusable.wrapping_add(1),
            Err(DecodeError::DuplicateOrStaleEpoch) => self.stats.stale = self.stats.stale.wrapping_add(1),
        }
        result
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn expected_epoch(&self) -> (u16, u32) {
        (self.expected_week, self.expected_tow_ms)
    }

    fn check(&mut self, bytes: &[u8]) -> Result<TimeMark, DecodeError> {
        let payload_len = *bytes.get(LEN_OFFSET).ok_or(DecodeError::Malformed)? as usize;
        if payload_len < TM2_PAYLOAD_LEN || bytes.len() < payload_len + FRAME_OVERHEAD {
            return Err(DecodeError::Malformed);
        }

        let checked = &bytes[..payload_len + 2];
        let (ck_a, ck_b) = checksum(checked);
        if bytes[payload_len + 2] != ck_a || bytes[payload_len + 3] != ck_b {
            return Err(DecodeError::ChecksumFailure);
        }

        let flags = bytes[FLAGS_OFFSET] & (FLAG_TIME_VALID | FLAG_RISING_EDGE);
        if flags != FLAG_TIME_VALID | FLAG_RISING_EDGE || bytes[CHANNEL_OFFSET] != 0 {
            return Err(DecodeError::NotUsable {
                time_valid: flags & FLAG_TIME_VALID != 0,
            });
        }

        let week = read_u16(bytes, WEEK_OFFSET);
        let tow_ms = read_u32(bytes, TOW_MS_OFFSET);
        let fresh = week == self.expected_week && tow_ms == self.expected_tow_ms;
        self.expected_week = week;
        self.expected_tow_ms = tow_ms.wrapping_add(EPOCH_MARGIN_MS);
        if !fresh {
            return Err(DecodeError::DuplicateOrStaleEpoch);
        }

        Ok(TimeMark {
            value: read_u32(bytes, TOW_SUB_NS_OFFSET),
            accuracy: read_u32(bytes, ACCURACY_OFFSET),
        })
    }
}

impl Default for TimeMarkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// UBX Fletcher checksum over class, id, then `bytes`.
pub fn checksum(bytes: &[u8]) -> (u8, u8) {
    [CLASS_TIM, ID_TIM_TM2]
        .iter()
        .chain(bytes)
        .fold((0u8, 0u8), |(a, b), &byte| {
            let a = a.wrapping_add(byte);
            (a, b.wrapping_add(a))
        })
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
