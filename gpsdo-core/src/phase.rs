//! Phase arithmetic on time-mark values.
//!
//! A time-mark is the sub-millisecond part of the divided VCO edge, so it
//! lives on a circle of `MAX_MARK` nanoseconds. Successive marks are compared
//! by splitting the circle into two halves at `MID_MARK`.

/// One full cycle of the time-mark value, in ns.
pub const MAX_MARK: u32 = 1_000_000;
/// Boundary between the lower and upper half of the cycle.
pub const MID_MARK: u32 = MAX_MARK / 2;

/// Signed phase movement from `previous` to `current`.
///
/// Positive means the mark arrived later than last time (VCO slow), negative
/// means earlier (VCO fast). The result lies in `(-MAX_MARK/2, MAX_MARK/2]`.
pub fn phase_delta(previous: u32, current: u32) -> i32 {
    let previous = previous % MAX_MARK;
    let current = current % MAX_MARK;

    let prev_upper = previous >= MID_MARK;
    let curr_upper = current >= MID_MARK;

    let plain = current as i32 - previous as i32;
    if prev_upper == curr_upper {
        return plain;
    }

    // Halves differ: assume the pair crossed the 0/MAX_MARK boundary.
    let wrapped = if !curr_upper {
        (current + (MAX_MARK - previous)) as i32
    } else {
        -((previous + (MAX_MARK - current)) as i32)
    };

    // Pair straddles MID_MARK instead; the short way round is the plain difference.
    if wrapped > -(MID_MARK as i32) && wrapped <= MID_MARK as i32 {
        wrapped
    } else {
        plain
    }
}
