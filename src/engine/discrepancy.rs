// ==========================================
// 通关阶段时效监控系统 - 差异判定引擎
// ==========================================
// 输入: 单号当前阶段事件 + 时效规则 + 工作日历
// 输出: DiscrepancyResult (每条规则 / 每个畸形字段一条)
// ==========================================
// 判定顺序（命中即返回）:
// 1) 目标阶段带例外代码 → 无错误（业务豁免，无条件）
// 2) 目标早于来源 → SEQUENCE_VIOLATION（与阈值无关）
// 3) 工作日差 > 上限 → SLA_VIOLATION
// 4) 其他 → 无错误
// 畸形字段（时间戳、未知例外代码）按字段上报，受影响规则跳过
// 红线: 纯函数，不抛错；单条畸形记录不阻断整批
// ==========================================

use crate::domain::discrepancy::{DiscrepancyEntry, DiscrepancyKey, DiscrepancyResult};
use crate::domain::reference::PhaseEvent;
use crate::domain::types::{DiscrepancyKind, PhaseCode};
use crate::engine::calendar::{parse_phase_timestamp, BusinessDayCalendar, PhaseTimestamp};
use crate::engine::catalog::{PhaseCatalog, SlaRule};
use crate::i18n::t_with_args;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// DiscrepancyEvaluator - 差异判定引擎
// ==========================================
pub struct DiscrepancyEvaluator {
    calendar: Arc<BusinessDayCalendar>,
    catalog: Arc<PhaseCatalog>,
}

impl DiscrepancyEvaluator {
    pub fn new(calendar: Arc<BusinessDayCalendar>, catalog: Arc<PhaseCatalog>) -> Self {
        Self { calendar, catalog }
    }

    pub fn calendar(&self) -> &BusinessDayCalendar {
        &self.calendar
    }

    pub fn catalog(&self) -> &PhaseCatalog {
        &self.catalog
    }

    /// 判定单个报关单号
    ///
    /// 同一阶段出现多条事件时以最后一条为准
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub fn evaluate(&self, reference: &str, events: &[PhaseEvent]) -> DiscrepancyResult {
        let mut result = DiscrepancyResult::new(reference);

        let by_phase: BTreeMap<PhaseCode, &PhaseEvent> =
            events.iter().map(|e| (e.phase, e)).collect();

        // 时间戳解析，畸形值按字段上报
        let mut parsed: BTreeMap<PhaseCode, PhaseTimestamp> = BTreeMap::new();
        for (phase, event) in &by_phase {
            match parse_phase_timestamp(&event.timestamp) {
                Ok(ts) => {
                    parsed.insert(*phase, ts);
                }
                Err(_) => {
                    tracing::warn!(reference, phase = %phase, value = %event.timestamp, "阶段时间戳格式错误");
                    let message = t_with_args(
                        "discrepancy.format_error",
                        &[
                            ("phase", &self.catalog.display_name(*phase)),
                            ("value", &event.timestamp),
                        ],
                    );
                    result.entries.push(DiscrepancyEntry::error(
                        DiscrepancyKey::Field { phase: *phase },
                        DiscrepancyKind::FormatError,
                        message,
                    ));
                }
            }
        }

        // 未知例外代码: 无法判断是否豁免
        for (phase, event) in &by_phase {
            let Some(code) = event.unknown_exception_code.as_deref() else {
                continue;
            };
            tracing::warn!(reference, phase = %phase, code, "未知例外代码");
            let message = t_with_args(
                "discrepancy.unknown_exception",
                &[("phase", &self.catalog.display_name(*phase)), ("code", code)],
            );
            result.entries.push(DiscrepancyEntry::error(
                DiscrepancyKey::Field { phase: *phase },
                DiscrepancyKind::FormatError,
                message,
            ));
        }

        for rule in self.catalog.rules() {
            let (Some(source), Some(target)) = (by_phase.get(&rule.source), by_phase.get(&rule.target))
            else {
                // 端点未齐: 待定，不产生条目
                continue;
            };
            if target.unknown_exception_code.is_some() {
                continue;
            }

            if let Some(entry) = self.evaluate_rule(rule, source, target, &parsed) {
                result.entries.push(entry);
            }
        }

        if result.has_errors() {
            tracing::debug!(reference, errors = result.error_count(), "单号存在时效差异");
        }
        result
    }

    /// 批量判定，各单号相互独立
    pub fn evaluate_batch<'a, I>(&self, batch: I) -> Vec<DiscrepancyResult>
    where
        I: IntoIterator<Item = (&'a str, &'a [PhaseEvent])>,
    {
        batch
            .into_iter()
            .map(|(reference, events)| self.evaluate(reference, events))
            .collect()
    }

    // 单条规则判定；任一端点时间戳畸形且无例外时返回 None（已按字段上报）
    fn evaluate_rule(
        &self,
        rule: &SlaRule,
        source: &PhaseEvent,
        target: &PhaseEvent,
        parsed: &BTreeMap<PhaseCode, PhaseTimestamp>,
    ) -> Option<DiscrepancyEntry> {
        let key = DiscrepancyKey::Transition {
            source: rule.source,
            target: rule.target,
        };

        // 规则1: 例外代码豁免
        if let Some(code) = target.exception_code {
            let mut entry = DiscrepancyEntry::ok(key);
            entry.exception_code = Some(code);
            entry.max_business_days = Some(rule.max_business_days);
            entry.business_days = match (parsed.get(&rule.source), parsed.get(&rule.target)) {
                (Some(s), Some(t)) => Some(self.calendar.business_day_diff(s.date, t.date)),
                _ => None,
            };
            return Some(entry);
        }

        let source_ts = parsed.get(&rule.source)?;
        let target_ts = parsed.get(&rule.target)?;
        let days = self.calendar.business_day_diff(source_ts.date, target_ts.date);

        let source_name = self.catalog.display_name(rule.source);
        let target_name = self.catalog.display_name(rule.target);

        let mut entry = if target_ts.precedes(source_ts) {
            // 规则2: 顺序倒置
            let message = t_with_args(
                "discrepancy.sequence_violation",
                &[
                    ("source", &source_name),
                    ("target", &target_name),
                    ("source_ts", &source_ts.to_string()),
                    ("target_ts", &target_ts.to_string()),
                ],
            );
            DiscrepancyEntry::error(key, DiscrepancyKind::SequenceViolation, message)
        } else if days > i64::from(rule.max_business_days) {
            // 规则3: 超出时限
            let excess = days - i64::from(rule.max_business_days);
            let deadline = self
                .calendar
                .add_business_days(source_ts.date, rule.max_business_days);
            let message = t_with_args(
                "discrepancy.sla_exceeded",
                &[
                    ("source", &source_name),
                    ("target", &target_name),
                    ("days", &days.to_string()),
                    ("max", &rule.max_business_days.to_string()),
                    ("excess", &excess.to_string()),
                    ("deadline", &deadline.to_string()),
                ],
            );
            DiscrepancyEntry::error(key, DiscrepancyKind::SlaViolation, message)
        } else {
            DiscrepancyEntry::ok(key)
        };

        entry.business_days = Some(days);
        entry.max_business_days = Some(rule.max_business_days);
        Some(entry)
    }
}
