//! Wall-clock subsystem: Unix-epoch seconds, Gregorian calendar conversion,
//! and NTP/Zigbee epoch bridging, layered on top of the tick scheduler.
//!
//! Compiled only when the `wallclock` feature is enabled (on by default),
//! mirroring `SL_SLEEPTIMER_WALLCLOCK_CONFIG` in the driver this module is
//! modeled on.

use super::SleeptimerStatus;

/// Unix-epoch seconds. Valid range is `[0, 0x7FFF_FFFF]` (signed 31-bit),
/// i.e. 1970-01-01 00:00:00 through 2038-01-19 03:14:07.
pub type Timestamp = u32;

/// Signed seconds offset from UTC.
pub type TimeZoneOffset = i32;

pub const SEC_PER_DAY: u32 = 60 * 60 * 24;
const DAY_PER_YEAR: u32 = 365;
const SEC_PER_YEAR: u32 = SEC_PER_DAY * DAY_PER_YEAR;
const UNIX_TIMESTAMP_MAX: u32 = 0x7FFF_FFFF;
/// Years since 1900 at which the Unix 32-bit signed range rolls over (2038).
const UNIX_YEAR_MAX: u16 = 2038 - 1900;

const NTP_UNIX_EPOCH_DIFF_YEARS: u32 = 1970 - 1900;
const ZIGBEE_UNIX_EPOCH_DIFF_YEARS: u32 = 2000 - 1970;
/// 70 years and 17 leap days.
pub const NTP_EPOCH_OFFSET_SEC: u32 = (NTP_UNIX_EPOCH_DIFF_YEARS * 365 + 17) * SEC_PER_DAY;
/// 30 years and 7 leap days.
pub const ZIGBEE_EPOCH_OFFSET_SEC: u32 = (ZIGBEE_UNIX_EPOCH_DIFF_YEARS * 365 + 7) * SEC_PER_DAY;

fn leap_days_up_to_year(year: u32) -> u32 {
    (year.saturating_sub(3)) / 4 + 1
}

const DAYS_IN_MONTH: [[u8; 12]; 2] = [
    [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
    [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TimeFormat {
    Unix,
    Ntp,
    ZigbeeCluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Month {
    January = 0,
    February = 1,
    March = 2,
    April = 3,
    May = 4,
    June = 5,
    July = 6,
    August = 7,
    September = 8,
    October = 9,
    November = 10,
    December = 11,
}

impl Month {
    fn from_index(i: u8) -> Option<Self> {
        Some(match i {
            0 => Month::January,
            1 => Month::February,
            2 => Month::March,
            3 => Month::April,
            4 => Month::May,
            5 => Month::June,
            6 => Month::July,
            7 => Month::August,
            8 => Month::September,
            9 => Month::October,
            10 => Month::November,
            11 => Month::December,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WeekDay {
    Sunday = 0,
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
}

impl WeekDay {
    fn from_index(i: u32) -> Self {
        match i % 7 {
            0 => WeekDay::Sunday,
            1 => WeekDay::Monday,
            2 => WeekDay::Tuesday,
            3 => WeekDay::Wednesday,
            4 => WeekDay::Thursday,
            5 => WeekDay::Friday,
            _ => WeekDay::Saturday,
        }
    }
}

/// A calendar date/time, in the same "years since 1900" convention as
/// POSIX `struct tm`.
#[derive(Debug, Clone, Copy)]
pub struct Date {
    pub year: u16,
    pub month: Month,
    pub month_day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub day_of_week: WeekDay,
    pub day_of_year: u16,
    pub time_zone: TimeZoneOffset,
}

/// Standard Gregorian leap-year rule, applied to the absolute calendar year
/// (not the 1900-offset storage form — see SPEC_FULL.md §9 for why this
/// deliberately differs from the literal original).
fn is_leap_year_absolute(year: u32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn compute_day_of_week(days_since_epoch: u32) -> WeekDay {
    WeekDay::from_index(days_since_epoch + 4)
}

fn compute_day_of_year(month: Month, day: u8, leap: bool) -> u16 {
    let mut total = 0u16;
    for i in 0..(month as u8) {
        total += DAYS_IN_MONTH[leap as usize][i as usize] as u16;
    }
    total + day as u16
}

fn tz_in_range(time: Timestamp, tz: TimeZoneOffset) -> bool {
    let shifted = time as i64 + tz as i64;
    (0..=i64::from(u32::MAX)).contains(&shifted)
}

pub(super) fn is_valid_time(time: Timestamp, format: TimeFormat, tz: TimeZoneOffset) -> bool {
    if !tz_in_range(time, tz) {
        return false;
    }
    match format {
        TimeFormat::Unix => time <= UNIX_TIMESTAMP_MAX,
        TimeFormat::Ntp => time >= NTP_EPOCH_OFFSET_SEC,
        TimeFormat::ZigbeeCluster => time <= UNIX_TIMESTAMP_MAX - ZIGBEE_EPOCH_OFFSET_SEC,
    }
}

pub fn is_valid_date(date: &Date) -> bool {
    let absolute_year = 1900u32 + date.year as u32;
    let leap = is_leap_year_absolute(absolute_year);

    if date.year > UNIX_YEAR_MAX
        || date.month_day == 0
        || date.month_day > DAYS_IN_MONTH[leap as usize][date.month as usize]
        || date.hour > 23
        || date.min > 59
        || date.sec > 59
    {
        return false;
    }

    // Unix is valid only until 2038-01-19 03:14:07.
    if date.year == UNIX_YEAR_MAX {
        if date.month != Month::January {
            return false;
        }
        if date.month_day > 19 || date.hour > 3 || date.min > 14 || date.sec > 7 {
            return false;
        }
    }

    true
}

/// Builds a date from its fields, filling in `day_of_year`/`day_of_week`.
/// A `year` of 1900 or greater is treated as an absolute Gregorian year
/// (not an offset) and rebased.
pub fn build_datetime(
    year: u16,
    month: Month,
    month_day: u8,
    hour: u8,
    min: u8,
    sec: u8,
    time_zone: TimeZoneOffset,
) -> Result<Date, SleeptimerStatus> {
    let year = if year >= 1900 { year - 1900 } else { year };
    let mut date = Date {
        year,
        month,
        month_day,
        hour,
        min,
        sec,
        day_of_week: WeekDay::Sunday,
        day_of_year: 0,
        time_zone,
    };

    if !is_valid_date(&date) {
        return Err(SleeptimerStatus::InvalidParameter);
    }

    let absolute_year = 1900u32 + date.year as u32;
    let leap = is_leap_year_absolute(absolute_year);
    date.day_of_year = compute_day_of_year(date.month, date.month_day, leap);

    let full_year = absolute_year - 1970;
    let days_since_epoch =
        full_year * DAY_PER_YEAR + leap_days_up_to_year(full_year) + date.day_of_year as u32 - 1;
    date.day_of_week = compute_day_of_week(days_since_epoch);

    Ok(date)
}

/// Converts a Unix timestamp to a calendar date.
pub fn convert_time_to_date(mut time: Timestamp, time_zone: TimeZoneOffset) -> Result<Date, SleeptimerStatus> {
    if !is_valid_time(time, TimeFormat::Unix, time_zone) {
        return Err(SleeptimerStatus::InvalidParameter);
    }

    let sec = (time % 60) as u8;
    time /= 60;
    let min = (time % 60) as u8;
    time /= 60;
    let hour = (time % 24) as u8;
    time /= 24; // time is now days since 1970-01-01.

    let day_of_week = compute_day_of_week(time);

    let mut full_year = time / DAY_PER_YEAR;
    let mut leap_days = 0u32;
    if full_year > 2 {
        leap_days = leap_days_up_to_year(full_year);
        full_year = (time - leap_days) / DAY_PER_YEAR;
        leap_days = leap_days_up_to_year(full_year);
    }
    let year = (NTP_UNIX_EPOCH_DIFF_YEARS + full_year) as u16;
    let leap = is_leap_year_absolute(1900 + year as u32);

    let mut days_into_year = (time - leap_days) - DAY_PER_YEAR * full_year;
    let day_of_year = (days_into_year + 1) as u16;

    let mut month_idx = 0u8;
    while days_into_year >= DAYS_IN_MONTH[leap as usize][month_idx as usize] as u32 {
        days_into_year -= DAYS_IN_MONTH[leap as usize][month_idx as usize] as u32;
        month_idx += 1;
    }

    Ok(Date {
        year,
        month: Month::from_index(month_idx).unwrap_or(Month::December),
        month_day: (days_into_year + 1) as u8,
        hour,
        min,
        sec,
        day_of_week,
        day_of_year,
        time_zone,
    })
}

/// Converts a calendar date to Unix seconds.
///
/// Adds `time_zone` directly to the computed seconds, which yields *local*
/// Unix seconds rather than UTC — preserved for compatibility, see
/// SPEC_FULL.md §9.
pub fn convert_date_to_time(date: &Date) -> Result<Timestamp, SleeptimerStatus> {
    if !is_valid_date(date) {
        return Err(SleeptimerStatus::InvalidParameter);
    }

    let full_year = date.year as u32; // years since 1970, because year is since-1900 and epoch is 1970.
    let full_year = full_year.wrapping_sub(NTP_UNIX_EPOCH_DIFF_YEARS);
    let leap = is_leap_year_absolute(1900 + date.year as u32);

    let mut time: i64 = full_year as i64 * SEC_PER_YEAR as i64;
    if full_year > 2 {
        time += leap_days_up_to_year(full_year) as i64 * SEC_PER_DAY as i64;
    }

    let mut month_days = 0u32;
    for i in 0..(date.month as u8) {
        month_days += DAYS_IN_MONTH[leap as usize][i as usize] as u32;
    }
    month_days += date.month_day as u32 - 1;

    time += month_days as i64 * SEC_PER_DAY as i64;
    time += (3600 * date.hour as i64) + (60 * date.min as i64) + date.sec as i64;
    time += date.time_zone as i64;

    if !(0..=i64::from(u32::MAX)).contains(&time) {
        return Err(SleeptimerStatus::InvalidParameter);
    }

    Ok(time as u32)
}

/// Formats a date against a small `strftime`-subset (`%Y %m %d %H %M %S %a
/// %j`); unrecognized specifiers are copied through verbatim. Kept inside
/// the no_std/no-libc boundary rather than reaching for a real `strftime`.
/// Returns the number of bytes written.
pub fn convert_date_to_str(out: &mut [u8], format: &[u8], date: &Date) -> usize {
    if !is_valid_date(date) {
        return 0;
    }

    fn write_u32(out: &mut [u8], pos: &mut usize, value: u32, width: usize) {
        let mut digits = [0u8; 10];
        let mut n = value;
        let mut len = 0;
        loop {
            digits[len] = b'0' + (n % 10) as u8;
            n /= 10;
            len += 1;
            if n == 0 {
                break;
            }
        }
        while len < width {
            digits[len] = b'0';
            len += 1;
        }
        for i in (0..len).rev() {
            if *pos >= out.len() {
                return;
            }
            out[*pos] = digits[i];
            *pos += 1;
        }
    }

    fn write_str(out: &mut [u8], pos: &mut usize, s: &[u8]) {
        for &b in s {
            if *pos >= out.len() {
                return;
            }
            out[*pos] = b;
            *pos += 1;
        }
    }

    const WEEKDAY_ABBREV: [&[u8]; 7] = [
        b"Sun", b"Mon", b"Tue", b"Wed", b"Thu", b"Fri", b"Sat",
    ];

    let mut pos = 0;
    let mut i = 0;
    while i < format.len() {
        if format[i] == b'%' && i + 1 < format.len() {
            match format[i + 1] {
                b'Y' => write_u32(out, &mut pos, 1900 + date.year as u32, 4),
                b'm' => write_u32(out, &mut pos, date.month as u32 + 1, 2),
                b'd' => write_u32(out, &mut pos, date.month_day as u32, 2),
                b'H' => write_u32(out, &mut pos, date.hour as u32, 2),
                b'M' => write_u32(out, &mut pos, date.min as u32, 2),
                b'S' => write_u32(out, &mut pos, date.sec as u32, 2),
                b'j' => write_u32(out, &mut pos, date.day_of_year as u32, 3),
                b'a' => write_str(out, &mut pos, WEEKDAY_ABBREV[date.day_of_week as usize]),
                other => {
                    if pos < out.len() {
                        out[pos] = b'%';
                        pos += 1;
                    }
                    if pos < out.len() {
                        out[pos] = other;
                        pos += 1;
                    }
                }
            }
            i += 2;
        } else {
            if pos < out.len() {
                out[pos] = format[i];
                pos += 1;
            }
            i += 1;
        }
    }

    pos
}

pub fn convert_unix_time_to_ntp(time: Timestamp) -> Result<u32, SleeptimerStatus> {
    let ntp = time + NTP_EPOCH_OFFSET_SEC;
    if is_valid_time(ntp, TimeFormat::Ntp, 0) {
        Ok(ntp)
    } else {
        Err(SleeptimerStatus::InvalidParameter)
    }
}

pub fn convert_ntp_time_to_unix(ntp_time: u32) -> Result<Timestamp, SleeptimerStatus> {
    let time = ntp_time.wrapping_sub(NTP_EPOCH_OFFSET_SEC);
    if is_valid_time(time, TimeFormat::Unix, 0) {
        Ok(time)
    } else {
        Err(SleeptimerStatus::InvalidParameter)
    }
}

pub fn convert_unix_time_to_zigbee(time: Timestamp) -> Result<u32, SleeptimerStatus> {
    let zigbee = time.wrapping_sub(ZIGBEE_EPOCH_OFFSET_SEC);
    if is_valid_time(zigbee, TimeFormat::ZigbeeCluster, 0) {
        Ok(zigbee)
    } else {
        Err(SleeptimerStatus::InvalidParameter)
    }
}

pub fn convert_zigbee_time_to_unix(zigbee_time: u32) -> Result<Timestamp, SleeptimerStatus> {
    let time = zigbee_time + ZIGBEE_EPOCH_OFFSET_SEC;
    if is_valid_time(time, TimeFormat::Unix, 0) {
        Ok(time)
    } else {
        Err(SleeptimerStatus::InvalidParameter)
    }
}

/// Process-wide wall-clock state. Owned and critical-section-guarded by
/// `kern::timer::mod`; the methods here are pure given their inputs so the
/// scheduler's locking discipline stays in one place.
pub struct WallClockState {
    pub(super) second_count: Timestamp,
    pub(super) overflow_tick_rest: u32,
    pub(super) calculated_sec_count: u32,
    pub(super) calculated_tick_rest: u32,
    pub(super) tz_offset: TimeZoneOffset,
}

impl WallClockState {
    pub const fn new() -> Self {
        Self {
            second_count: 0,
            overflow_tick_rest: 0,
            calculated_sec_count: 0,
            calculated_tick_rest: 0,
            tz_offset: 0,
        }
    }

    pub fn init(&mut self, freq: u32) {
        let span = u32::MAX as u64 + 1;
        self.calculated_tick_rest = (span % freq as u64) as u32;
        self.calculated_sec_count = (span / freq as u64) as u32;
        self.second_count = 0;
        self.overflow_tick_rest = 0;
    }

    pub fn on_overflow(&mut self, freq: u32) {
        self.overflow_tick_rest += self.calculated_tick_rest;
        if self.overflow_tick_rest >= freq {
            self.second_count = self.second_count.wrapping_add(1);
            self.overflow_tick_rest -= freq;
        }
        self.second_count = self.second_count.wrapping_add(self.calculated_sec_count);
    }

    pub fn get_time(&self, counter: u32, freq: u32) -> Timestamp {
        let mut time = self.second_count.wrapping_add(counter / freq);
        if (counter % freq) + self.overflow_tick_rest >= freq {
            time = time.wrapping_add(1);
        }
        time
    }

    pub fn set_time(&mut self, time: Timestamp, counter: u32, freq: u32) -> Result<(), SleeptimerStatus> {
        if !is_valid_time(time, TimeFormat::Unix, 0) {
            return Err(SleeptimerStatus::InvalidParameter);
        }
        let counter_sec = counter / freq;
        if time < counter_sec {
            return Err(SleeptimerStatus::InvalidParameter);
        }
        self.second_count = time - counter_sec;
        self.overflow_tick_rest = 0;
        Ok(())
    }
}

impl Default for WallClockState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_datetime_leap_day() {
        let date = build_datetime(2024, Month::February, 29, 12, 0, 0, 0).unwrap();
        assert_eq!(date.day_of_week, WeekDay::Thursday);
    }

    #[test]
    fn test_date_roundtrip() {
        let date = build_datetime(2024, Month::February, 29, 12, 0, 0, 0).unwrap();
        let unix = convert_date_to_time(&date).unwrap();
        let back = convert_time_to_date(unix, 0).unwrap();
        assert_eq!(back.year, date.year);
        assert_eq!(back.month, date.month);
        assert_eq!(back.month_day, date.month_day);
        assert_eq!(back.hour, date.hour);
        assert_eq!(back.day_of_week, WeekDay::Thursday);
    }

    #[test]
    fn test_unix_epoch_is_thursday() {
        let date = convert_time_to_date(0, 0).unwrap();
        assert_eq!(date.year, 70);
        assert_eq!(date.month, Month::January);
        assert_eq!(date.month_day, 1);
        assert_eq!(date.day_of_week, WeekDay::Thursday);
    }

    #[test]
    fn test_2038_boundary() {
        assert!(is_valid_time(UNIX_TIMESTAMP_MAX, TimeFormat::Unix, 0));
        assert!(!is_valid_time(UNIX_TIMESTAMP_MAX + 1, TimeFormat::Unix, 0));
    }

    #[test]
    fn test_ntp_zigbee_roundtrip() {
        let t: Timestamp = 1_700_000_000;
        let ntp = convert_unix_time_to_ntp(t).unwrap();
        assert_eq!(convert_ntp_time_to_unix(ntp).unwrap(), t);

        let zigbee = convert_unix_time_to_zigbee(t).unwrap();
        assert_eq!(convert_zigbee_time_to_unix(zigbee).unwrap(), t);
    }

    #[test]
    fn test_wallclock_get_time_no_overflow() {
        let mut wc = WallClockState::new();
        wc.init(32_768);
        wc.set_time(1_700_000_000, 0, 32_768).unwrap();
        assert_eq!(wc.get_time(3 * 32_768, 32_768), 1_700_000_003);
    }

    #[test]
    fn test_wallclock_overflow_accounting() {
        let mut wc = WallClockState::new();
        wc.init(32_768);
        assert_eq!(wc.calculated_sec_count, 131_072);
        assert_eq!(wc.calculated_tick_rest, 0);
        wc.on_overflow(32_768);
        assert_eq!(wc.second_count, 131_072);
    }
}
