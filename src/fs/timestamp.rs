//! FAT 风格的 16 位打包时间与日期。
//!
//! 时间：`hour(5) | minute(6) | second/2(5)`，日期：`year(7) | month(4) | day(5)`，
//! 高位在前。年份以 [`YEAR_EPOCH`] 为起点，月份从 [`MONTH_BASE`] 开始计。
//! 编码用的移位与解码保持一致（分钟 `<<5`、年份 `<<9`），打包后的值能原样解回。

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

pub const YEAR_EPOCH: i32 = 1980;
pub const MONTH_BASE: u32 = 1;

const HOUR_SHIFT: u16 = 11;
const MINUTE_SHIFT: u16 = 5;
const YEAR_SHIFT: u16 = 9;
const MONTH_SHIFT: u16 = 5;

pub fn pack_time(at: &NaiveDateTime) -> u16 {
    ((at.hour() as u16) << HOUR_SHIFT)
        | ((at.minute() as u16) << MINUTE_SHIFT)
        | (at.second() / 2) as u16
}

pub fn pack_date(at: &NaiveDateTime) -> u16 {
    // 7 位年份只能表示 YEAR_EPOCH..=YEAR_EPOCH+127
    let year = (at.year() - YEAR_EPOCH).clamp(0, 0x7F) as u16;
    let month = (at.month() - 1 + MONTH_BASE) as u16;
    (year << YEAR_SHIFT) | (month << MONTH_SHIFT) | at.day() as u16
}

/// 拆出 (时, 分, 秒)
pub fn unpack_time(time: u16) -> (u32, u32, u32) {
    let hour = (time >> HOUR_SHIFT) & 0x1F;
    let minute = (time >> MINUTE_SHIFT) & 0x3F;
    let second = (time & 0x1F) * 2;
    (hour as u32, minute as u32, second as u32)
}

/// 拆出 (年, 月, 日)
pub fn unpack_date(date: u16) -> (i32, u32, u32) {
    let year = ((date >> YEAR_SHIFT) & 0x7F) as i32 + YEAR_EPOCH;
    let month = ((date >> MONTH_SHIFT) & 0x0F) as u32 + 1 - MONTH_BASE;
    let day = (date & 0x1F) as u32;
    (year, month, day)
}

/// 还原成时间点；全 0 或字段越界时返回 None
pub fn unpack(time: u16, date: u16) -> Option<NaiveDateTime> {
    let (year, month, day) = unpack_date(date);
    let (hour, minute, second) = unpack_time(time);
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

pub fn format_time(time: u16) -> String {
    let (hour, minute, second) = unpack_time(time);
    format!("{:02}:{:02}:{:02}", hour, minute, second)
}

pub fn format_date(date: u16) -> String {
    let (year, month, day) = unpack_date(date);
    format!("{}-{:02}-{:02}", year, month, day)
}
