// ==========================================
// 通关阶段时效监控系统 - 节假日提供者
// ==========================================
// 职责: 按地区提供节假日集合，供工作日历加载
// 说明: 节假日维护不在本核心范围内，这里只消费
// ==========================================

use crate::engine::calendar::{CalendarError, CalendarResult};
use chrono::{NaiveDate, Weekday};
use std::collections::BTreeSet;
use std::sync::Arc;

/// 节假日提供者
pub trait HolidayProvider: Send + Sync {
    /// 返回指定地区的全部节假日
    fn holidays(&self, locale: &str) -> CalendarResult<BTreeSet<NaiveDate>>;
}

/// 是否为墨西哥地区代码（es-MX / MX，大小写不敏感）
pub fn is_mexico_locale(locale: &str) -> bool {
    let normalized = locale.trim().to_ascii_uppercase().replace('_', "-");
    normalized == "MX" || normalized.ends_with("-MX")
}

// ==========================================
// FederalHolidayProvider - 墨西哥法定休息日
// ==========================================
/// 按联邦劳动法第 74 条规则推算:
/// 1/1、二月第一个周一、三月第三个周一、5/1、9/16、十一月第三个周一、12/25，
/// 以及政权交接年的交接日（2024 起为 10/1，此前为 12/1）
#[derive(Debug, Clone)]
pub struct FederalHolidayProvider {
    year_from: i32,
    year_to: i32,
}

impl FederalHolidayProvider {
    pub fn new(year_from: i32, year_to: i32) -> Self {
        let (year_from, year_to) = if year_from <= year_to {
            (year_from, year_to)
        } else {
            (year_to, year_from)
        };
        Self { year_from, year_to }
    }

    /// 单个年份的法定休息日
    pub fn holidays_for_year(year: i32) -> Vec<NaiveDate> {
        let fixed = [(1, 1), (5, 1), (9, 16), (12, 25)];
        let mut days: Vec<NaiveDate> = fixed
            .iter()
            .filter_map(|(m, d)| NaiveDate::from_ymd_opt(year, *m, *d))
            .collect();

        let movable = [(2, 1), (3, 3), (11, 3)];
        days.extend(
            movable
                .iter()
                .filter_map(|(m, n)| NaiveDate::from_weekday_of_month_opt(year, *m, Weekday::Mon, *n)),
        );

        if year >= 2024 && (year - 2024) % 6 == 0 {
            days.extend(NaiveDate::from_ymd_opt(year, 10, 1));
        } else if year < 2024 && (2024 - year) % 6 == 0 {
            days.extend(NaiveDate::from_ymd_opt(year, 12, 1));
        }

        days.sort();
        days
    }
}

impl HolidayProvider for FederalHolidayProvider {
    fn holidays(&self, locale: &str) -> CalendarResult<BTreeSet<NaiveDate>> {
        if !is_mexico_locale(locale) {
            return Err(CalendarError::UnsupportedLocale(locale.to_string()));
        }
        Ok((self.year_from..=self.year_to)
            .flat_map(Self::holidays_for_year)
            .collect())
    }
}

// ==========================================
// CompositeHolidayProvider - 多来源合并
// ==========================================
/// 合并多个来源；不支持该地区的来源被跳过，全部不支持时报错
pub struct CompositeHolidayProvider {
    providers: Vec<Arc<dyn HolidayProvider>>,
}

impl CompositeHolidayProvider {
    pub fn new(providers: Vec<Arc<dyn HolidayProvider>>) -> Self {
        Self { providers }
    }
}

impl HolidayProvider for CompositeHolidayProvider {
    fn holidays(&self, locale: &str) -> CalendarResult<BTreeSet<NaiveDate>> {
        let mut merged = BTreeSet::new();
        let mut supported = false;

        for provider in &self.providers {
            match provider.holidays(locale) {
                Ok(days) => {
                    supported = true;
                    merged.extend(days);
                }
                Err(CalendarError::UnsupportedLocale(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        if !supported {
            return Err(CalendarError::UnsupportedLocale(locale.to_string()));
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_mexico_2025_holidays() {
        let days = FederalHolidayProvider::holidays_for_year(2025);
        assert_eq!(
            days,
            vec![
                d(2025, 1, 1),
                d(2025, 2, 3),
                d(2025, 3, 17),
                d(2025, 5, 1),
                d(2025, 9, 16),
                d(2025, 11, 17),
                d(2025, 12, 25),
            ]
        );
    }

    #[test]
    fn test_transition_years() {
        assert!(FederalHolidayProvider::holidays_for_year(2024).contains(&d(2024, 10, 1)));
        assert!(FederalHolidayProvider::holidays_for_year(2030).contains(&d(2030, 10, 1)));
        assert!(FederalHolidayProvider::holidays_for_year(2018).contains(&d(2018, 12, 1)));
        assert!(!FederalHolidayProvider::holidays_for_year(2025).contains(&d(2025, 10, 1)));
    }

    #[test]
    fn test_locale_support() {
        let provider = FederalHolidayProvider::new(2025, 2024);
        assert_eq!(provider.holidays("es-MX").unwrap().len(), 15);
        assert!(provider.holidays("es_mx").is_ok());
        assert_eq!(
            provider.holidays("en-US"),
            Err(CalendarError::UnsupportedLocale("en-US".to_string()))
        );
    }

    struct Fixed(Vec<NaiveDate>);

    impl HolidayProvider for Fixed {
        fn holidays(&self, _locale: &str) -> CalendarResult<BTreeSet<NaiveDate>> {
            Ok(self.0.iter().copied().collect())
        }
    }

    #[test]
    fn test_composite_merges_and_skips_unsupported() {
        let composite = CompositeHolidayProvider::new(vec![
            Arc::new(FederalHolidayProvider::new(2025, 2025)),
            Arc::new(Fixed(vec![d(2025, 12, 12), d(2025, 1, 1)])),
        ]);
        let days = composite.holidays("es-MX").unwrap();
        assert_eq!(days.len(), 8);
        assert!(days.contains(&d(2025, 12, 12)));

        // 仅 Fixed 支持 en-US
        let days = composite.holidays("en-US").unwrap();
        assert_eq!(days.len(), 2);
    }
}
