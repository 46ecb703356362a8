// ==========================================
// 通关阶段时效监控系统 - 引擎层
// ==========================================
// 职责: 工作日历、阶段目录、差异判定
// 红线: Engine 不拼 SQL, 所有判定必须输出原因
// ==========================================

pub mod calendar;
pub mod catalog;
pub mod discrepancy;
pub mod events;
pub mod holidays;

// 重导出核心引擎
pub use calendar::{
    parse_phase_date, parse_phase_timestamp, BusinessDayCalendar, CalendarError, CalendarResult,
    PhaseTimestamp,
};
pub use catalog::{PhaseCatalog, SlaRule};
pub use discrepancy::DiscrepancyEvaluator;
pub use events::{
    DiscrepancyEvent, DiscrepancyEventType, DiscrepancyPublisher, NoOpPublisher,
    OptionalPublisher,
};
pub use holidays::{
    is_mexico_locale, CompositeHolidayProvider, FederalHolidayProvider, HolidayProvider,
};
