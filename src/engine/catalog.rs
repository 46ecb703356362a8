// ==========================================
// 通关阶段时效监控系统 - 阶段目录
// ==========================================
// 职责: 阶段代码 → 显示名称；阶段对 → 时效规则
// 红线: 固定业务常量，进程启动时构造，无修改接口
// ==========================================

use crate::domain::types::PhaseCode;
use serde::Serialize;

/// 时效规则: source → target 最多间隔 max_business_days 个工作日
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlaRule {
    pub source: PhaseCode,
    pub target: PhaseCode,
    pub max_business_days: u32,
}

impl SlaRule {
    pub const fn new(source: PhaseCode, target: PhaseCode, max_business_days: u32) -> Self {
        Self {
            source,
            target,
            max_business_days,
        }
    }
}

const PHASE_LABELS: [(PhaseCode, &str); 7] = [
    (PhaseCode::DocumentReception, "Recepción de documentos"),
    (PhaseCode::BrokerDelivery, "Entrega a agente aduanal"),
    (PhaseCode::DutyPayment, "Pago de pedimento"),
    (PhaseCode::CustomsRelease, "Desaduanamiento"),
    (PhaseCode::TransportHandoff, "Entrega a transporte"),
    (PhaseCode::CdpDelivery, "Entrega en CDP"),
    (PhaseCode::WarehouseDelivery, "Entrega en almacén"),
];

const STANDARD_RULES: [SlaRule; 6] = [
    SlaRule::new(PhaseCode::DocumentReception, PhaseCode::BrokerDelivery, 1),
    SlaRule::new(PhaseCode::BrokerDelivery, PhaseCode::DutyPayment, 2),
    SlaRule::new(PhaseCode::DutyPayment, PhaseCode::CustomsRelease, 1),
    SlaRule::new(PhaseCode::CustomsRelease, PhaseCode::TransportHandoff, 1),
    SlaRule::new(PhaseCode::TransportHandoff, PhaseCode::CdpDelivery, 1),
    SlaRule::new(PhaseCode::CdpDelivery, PhaseCode::WarehouseDelivery, 2),
];

// ==========================================
// PhaseCatalog - 阶段目录
// ==========================================
#[derive(Debug, Clone)]
pub struct PhaseCatalog {
    labels: Vec<(PhaseCode, &'static str)>,
    rules: Vec<SlaRule>,
}

impl PhaseCatalog {
    /// 标准目录
    pub fn standard() -> Self {
        Self {
            labels: PHASE_LABELS.to_vec(),
            rules: STANDARD_RULES.to_vec(),
        }
    }

    pub fn label(&self, phase: PhaseCode) -> Option<&'static str> {
        self.labels
            .iter()
            .find(|(code, _)| *code == phase)
            .map(|(_, label)| *label)
    }

    /// "130 Entrega a transporte" 形式的显示名
    pub fn display_name(&self, phase: PhaseCode) -> String {
        match self.label(phase) {
            Some(label) => format!("{} {}", phase, label),
            None => phase.to_string(),
        }
    }

    pub fn sla_for(&self, source: PhaseCode, target: PhaseCode) -> Option<&SlaRule> {
        self.rules
            .iter()
            .find(|r| r.source == source && r.target == target)
    }

    pub fn rules(&self) -> &[SlaRule] {
        &self.rules
    }

    pub fn phases(&self) -> impl Iterator<Item = PhaseCode> + '_ {
        self.labels.iter().map(|(code, _)| *code)
    }
}

impl Default for PhaseCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_phase_has_label() {
        let catalog = PhaseCatalog::standard();
        for phase in PhaseCode::ALL {
            assert!(catalog.label(phase).is_some(), "missing label for {}", phase);
        }
        assert_eq!(
            catalog.display_name(PhaseCode::CdpDelivery),
            "140 Entrega en CDP"
        );
    }

    #[test]
    fn test_sla_lookup() {
        let catalog = PhaseCatalog::standard();
        let rule = catalog
            .sla_for(PhaseCode::TransportHandoff, PhaseCode::CdpDelivery)
            .unwrap();
        assert_eq!(rule.max_business_days, 1);
        assert!(catalog
            .sla_for(PhaseCode::CdpDelivery, PhaseCode::TransportHandoff)
            .is_none());
    }

    #[test]
    fn test_rules_follow_lifecycle_order() {
        let catalog = PhaseCatalog::standard();
        assert!(catalog.rules().iter().all(|r| r.source < r.target));
    }
}
