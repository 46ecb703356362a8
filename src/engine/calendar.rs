// ==========================================
// 通关阶段时效监控系统 - 工作日历
// ==========================================
// 职责: 判断工作日、计算两个日期之间的工作日数
// 口径: 统计半开区间 (a, b] 内的工作日，起始日不计，结束日计入
// 约束: 纯函数，节假日集合在构造时加载，调用时无 I/O
// ==========================================

use crate::engine::holidays::HolidayProvider;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound::{Excluded, Included};
use thiserror::Error;

/// 日历错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("日期格式错误: '{value}'")]
    InvalidDate { value: String },

    #[error("不支持的节假日地区: {0}")]
    UnsupportedLocale(String),

    #[error("节假日数据读取失败: {0}")]
    HolidaySource(String),
}

pub type CalendarResult<T> = Result<T, CalendarError>;

// ==========================================
// PhaseTimestamp - 阶段时间戳
// ==========================================
/// 日期 + 可选时刻
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimestamp {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl PhaseTimestamp {
    /// 是否严格早于 other
    ///
    /// 双方都带时刻时按日期时间比较，否则只比较日期
    pub fn precedes(&self, other: &PhaseTimestamp) -> bool {
        match (self.time, other.time) {
            (Some(t1), Some(t2)) => self.date.and_time(t1) < other.date.and_time(t2),
            _ => self.date < other.date,
        }
    }
}

impl fmt::Display for PhaseTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(t) => write!(f, "{} {}", self.date, t.format("%H:%M")),
            None => write!(f, "{}", self.date),
        }
    }
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// 解析阶段时间戳
///
/// 支持: `YYYY-MM-DD`、`YYYY-MM-DD HH:MM[:SS]`、`YYYY-MM-DDTHH:MM[:SS][.fff]`、RFC 3339
pub fn parse_phase_timestamp(raw: &str) -> CalendarResult<PhaseTimestamp> {
    let value = raw.trim();
    let invalid = || CalendarError::InvalidDate {
        value: raw.to_string(),
    };
    if value.is_empty() {
        return Err(invalid());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        let local = dt.naive_local();
        return Ok(PhaseTimestamp {
            date: local.date(),
            time: Some(local.time()),
        });
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(PhaseTimestamp {
                date: dt.date(),
                time: Some(dt.time()),
            });
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| PhaseTimestamp { date, time: None })
        .map_err(|_| invalid())
}

/// 解析为日期（丢弃时刻）
pub fn parse_phase_date(raw: &str) -> CalendarResult<NaiveDate> {
    parse_phase_timestamp(raw).map(|ts| ts.date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

// ==========================================
// BusinessDayCalendar - 工作日历
// ==========================================
#[derive(Debug, Clone)]
pub struct BusinessDayCalendar {
    locale: String,
    holidays: BTreeSet<NaiveDate>,
}

impl BusinessDayCalendar {
    pub fn new(locale: impl Into<String>, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            locale: locale.into(),
            holidays: holidays.into_iter().collect(),
        }
    }

    /// 从节假日提供者加载
    pub fn from_provider(provider: &dyn HolidayProvider, locale: &str) -> CalendarResult<Self> {
        let holidays = provider.holidays(locale)?;
        tracing::info!(locale, count = holidays.len(), "工作日历已加载");
        Ok(Self::new(locale, holidays))
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// 周六、周日、节假日为非工作日
    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !self.is_holiday(date)
    }

    /// 有符号工作日差: b 晚于 a 为正
    ///
    /// 统计 (a, b] 内的工作日; b < a 时为 -(b, a] 的工作日数
    pub fn business_day_diff(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        match a.cmp(&b) {
            Ordering::Equal => 0,
            Ordering::Less => self.count_business_days_after(a, b),
            Ordering::Greater => -self.count_business_days_after(b, a),
        }
    }

    /// 字符串输入版本，格式错误返回 InvalidDate，不会静默返回 0
    pub fn business_day_diff_str(&self, a: &str, b: &str) -> CalendarResult<i64> {
        let a = parse_phase_date(a)?;
        let b = parse_phase_date(b)?;
        Ok(self.business_day_diff(a, b))
    }

    /// date 之后第 n 个工作日（n = 0 返回 date 本身）
    pub fn add_business_days(&self, date: NaiveDate, n: u32) -> NaiveDate {
        let mut day = date;
        let mut remaining = n;
        while remaining > 0 {
            day += Duration::days(1);
            if self.is_business_day(day) {
                remaining -= 1;
            }
        }
        day
    }

    // (start, end] 内工作日数，要求 start <= end
    fn count_business_days_after(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        let total = (end - start).num_days();
        let full_weeks = total / 7;
        let mut count = full_weeks * 5;

        let mut day = start + Duration::days(full_weeks * 7);
        for _ in 0..(total % 7) {
            day += Duration::days(1);
            if !is_weekend(day) {
                count += 1;
            }
        }

        let holidays_on_weekdays = self
            .holidays
            .range((Excluded(start), Included(end)))
            .filter(|d| !is_weekend(**d))
            .count() as i64;

        count - holidays_on_weekdays
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn calendar() -> BusinessDayCalendar {
        // 2025-09-16 周二 独立日
        BusinessDayCalendar::new("es-MX", vec![d(2025, 9, 16), d(2025, 9, 13)])
    }

    #[test]
    fn test_weekend_and_holiday_are_not_business_days() {
        let cal = calendar();
        assert!(!cal.is_business_day(d(2025, 7, 5))); // 周六
        assert!(!cal.is_business_day(d(2025, 7, 6))); // 周日
        assert!(!cal.is_business_day(d(2025, 9, 16))); // 节假日
        assert!(cal.is_business_day(d(2025, 7, 7))); // 周一
        assert!(cal.is_business_day(d(2025, 9, 15)));
    }

    #[test]
    fn test_diff_same_day_is_zero() {
        let cal = calendar();
        for day in 1..=31 {
            let date = d(2025, 7, day);
            assert_eq!(cal.business_day_diff(date, date), 0);
        }
    }

    #[test]
    fn test_diff_non_negative_and_antisymmetric() {
        let cal = calendar();
        let start = d(2025, 8, 25);
        for offset in 0..60 {
            let end = start + Duration::days(offset);
            let forward = cal.business_day_diff(start, end);
            assert!(forward >= 0);
            assert_eq!(cal.business_day_diff(end, start), -forward);
        }
    }

    #[test]
    fn test_diff_matches_day_by_day_count() {
        let cal = calendar();
        let start = d(2025, 9, 1);
        for offset in 0..45 {
            let end = start + Duration::days(offset);
            let mut expected = 0;
            let mut day = start;
            while day < end {
                day += Duration::days(1);
                if cal.is_business_day(day) {
                    expected += 1;
                }
            }
            assert_eq!(cal.business_day_diff(start, end), expected, "end={}", end);
        }
    }

    #[test]
    fn test_diff_known_spans() {
        let cal = BusinessDayCalendar::new("es-MX", Vec::new());
        // 周三 → 周四
        assert_eq!(cal.business_day_diff(d(2025, 7, 2), d(2025, 7, 3)), 1);
        // 周五 → 两周后周五
        assert_eq!(cal.business_day_diff(d(2025, 6, 20), d(2025, 7, 4)), 10);
        // 周五 → 周一 (跨周末)
        assert_eq!(cal.business_day_diff(d(2025, 7, 4), d(2025, 7, 7)), 1);
        // 周五 → 周日
        assert_eq!(cal.business_day_diff(d(2025, 7, 4), d(2025, 7, 6)), 0);
    }

    #[test]
    fn test_diff_skips_holiday() {
        let cal = calendar();
        // 周一 → 周三，跨周二节假日
        assert_eq!(cal.business_day_diff(d(2025, 9, 15), d(2025, 9, 17)), 1);
        // 周末上的节假日不重复扣减
        assert_eq!(cal.business_day_diff(d(2025, 9, 12), d(2025, 9, 15)), 1);
    }

    #[test]
    fn test_diff_str_rejects_bad_input() {
        let cal = calendar();
        assert_eq!(cal.business_day_diff_str("2025-07-02", "2025-07-03 10:15").unwrap(), 1);
        assert_eq!(
            cal.business_day_diff_str("2025-13-02", "2025-07-03"),
            Err(CalendarError::InvalidDate {
                value: "2025-13-02".to_string()
            })
        );
        assert!(cal.business_day_diff_str("", "2025-07-03").is_err());
    }

    #[test]
    fn test_add_business_days() {
        let cal = calendar();
        assert_eq!(cal.add_business_days(d(2025, 7, 4), 0), d(2025, 7, 4));
        assert_eq!(cal.add_business_days(d(2025, 7, 4), 1), d(2025, 7, 7));
        assert_eq!(cal.add_business_days(d(2025, 9, 15), 1), d(2025, 9, 17));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let ts = parse_phase_timestamp("2025-07-03T08:30:00.123").unwrap();
        assert_eq!(ts.date, d(2025, 7, 3));
        assert!(ts.time.is_some());
        let ts = parse_phase_timestamp("2025-07-03T08:30:00-06:00").unwrap();
        assert_eq!(ts.time, NaiveTime::from_hms_opt(8, 30, 0));
        let ts = parse_phase_timestamp(" 2025-07-03 ").unwrap();
        assert_eq!(ts.time, None);
        assert!(parse_phase_timestamp("03/07/2025").is_err());
    }

    #[test]
    fn test_precedes_uses_time_only_when_both_present() {
        let morning = parse_phase_timestamp("2025-07-03 08:00").unwrap();
        let evening = parse_phase_timestamp("2025-07-03 18:00").unwrap();
        let date_only = parse_phase_timestamp("2025-07-03").unwrap();
        assert!(morning.precedes(&evening));
        assert!(!evening.precedes(&morning));
        assert!(!date_only.precedes(&morning));
        assert!(!evening.precedes(&date_only));
    }
}
