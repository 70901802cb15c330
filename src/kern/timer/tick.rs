//! Tick <-> millisecond conversions.
//!
//! Pure functions parameterized by the hardware frequency; `kern::timer::mod`
//! wires these to the HAL's `get_timer_frequency()` and to the precomputed
//! `max_millisecond_conversion` bound.

use super::SleeptimerStatus;

/// `ceil(ms * freq / 1000)`, matching the original's `+1` ceiling trick.
pub fn ms_to_tick(time_ms: u16, freq: u32) -> u32 {
    (((time_ms as u64) * (freq as u64)) / 1000) as u32 + 1
}

/// Largest millisecond value that `ms_to_tick`-style math can convert
/// without overflowing a `u32` tick. Precomputed once at init.
pub fn max_millisecond_conversion(freq: u32) -> u32 {
    ((u32::MAX as u64) * 1000 / (freq as u64)) as u32
}

/// Fallible 32-bit millisecond-to-tick conversion, guarded by the
/// precomputed `max_millisecond_conversion` bound.
pub fn ms32_to_tick(time_ms: u32, freq: u32, max_ms: u32) -> Result<u32, SleeptimerStatus> {
    if time_ms > max_ms {
        return Err(SleeptimerStatus::InvalidParameter);
    }
    Ok((((time_ms as u64) * (freq as u64)) / 1000) as u32 + 1)
}

fn is_power_of_two(n: u32) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// `tick * 1000 / freq`, using a shift instead of a division when `freq`
/// is a power of two (the common case for a prescaled crystal oscillator).
pub fn tick_to_ms(tick: u32, freq: u32) -> u32 {
    if is_power_of_two(freq) {
        (((tick as u64) * 1000) >> freq.trailing_zeros()) as u32
    } else {
        (((tick as u64) * 1000) / (freq as u64)) as u32
    }
}

/// 64-bit counterpart of `tick_to_ms`. Fails if `tick` would overflow the
/// `* 1000` intermediate.
pub fn tick64_to_ms(tick: u64, freq: u32) -> Result<u64, SleeptimerStatus> {
    if tick > u64::MAX / 1000 {
        return Err(SleeptimerStatus::InvalidParameter);
    }
    if is_power_of_two(freq) {
        Ok((tick * 1000) >> freq.trailing_zeros())
    } else {
        Ok((tick * 1000) / (freq as u64))
    }
}
