// ==========================================
// 阶段时效场景集成测试
// ==========================================
// 测试目标: 通过 AppState 装配的完整链路验证典型单号的判定、写入与回滚
// ==========================================

mod test_helpers;

use customs_sla_tracker::api::ApiError;
use customs_sla_tracker::app::AppState;
use customs_sla_tracker::domain::{DiscrepancyKind, ExceptionCode, PhaseCode, PhaseWriteRequest};
use customs_sla_tracker::services::OutboxStatus;
use test_helpers::{create_test_db, insert_phase, insert_reference, open_test_connection, seed_scenarios};

async fn seeded_state() -> (tempfile::NamedTempFile, AppState) {
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    seed_scenarios(&conn).expect("Failed to seed scenarios");

    let state = AppState::new(db_path).await.expect("Failed to init AppState");
    (temp_file, state)
}

#[tokio::test]
async fn test_pae251806_within_sla() {
    let (_temp_file, state) = seeded_state().await;

    let result = state
        .phase_api
        .refresh_from_remote("PAE251806")
        .await
        .expect("refresh should succeed");

    assert!(!result.has_errors(), "PAE251806 should have no discrepancies: {:?}", result);
    let entry = result
        .transition(PhaseCode::TransportHandoff, PhaseCode::CdpDelivery)
        .expect("130 → 140 should be evaluated");
    assert_eq!(entry.business_days, Some(1));
    assert_eq!(entry.max_business_days, Some(1));
}

#[tokio::test]
async fn test_pae251807_exceeds_sla_citing_ten_days() {
    let (_temp_file, state) = seeded_state().await;

    let result = state
        .phase_api
        .refresh_from_remote("PAE251807")
        .await
        .expect("refresh should succeed");

    assert!(result.has_errors());
    let entry = result
        .transition(PhaseCode::TransportHandoff, PhaseCode::CdpDelivery)
        .expect("130 → 140 should be evaluated");
    assert_eq!(entry.kind, Some(DiscrepancyKind::SlaViolation));
    assert_eq!(entry.business_days, Some(10));
    assert!(entry.message.as_deref().unwrap_or_default().contains("10"));
}

#[tokio::test]
async fn test_pai242944_exception_code_suppresses() {
    let (_temp_file, state) = seeded_state().await;
    state
        .phase_api
        .refresh_from_remote("PAI242944")
        .await
        .expect("refresh should succeed");

    // 10 个工作日后送达，但带有 PW_AP 例外
    let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", "mruiz")
        .with_exception(ExceptionCode::PwAp);
    let events = state
        .phase_api
        .upsert_phase(request)
        .await
        .expect("upsert should succeed");
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.is_confirmed()));

    let result = state.phase_api.evaluate("PAI242944").expect("evaluate should succeed");
    assert!(!result.has_errors());
    let entry = result
        .transition(PhaseCode::TransportHandoff, PhaseCode::CdpDelivery)
        .expect("130 → 140 should be evaluated");
    assert_eq!(entry.exception_code, Some(ExceptionCode::PwAp));

    // 无差异，不进入出站队列
    assert_eq!(state.outbox.count_by_status(OutboxStatus::Pending).unwrap(), 0);
}

#[tokio::test]
async fn test_flagged_upsert_is_published_to_outbox() {
    let (_temp_file, state) = seeded_state().await;
    state
        .phase_api
        .refresh_from_remote("PAI242944")
        .await
        .expect("refresh should succeed");

    let request = PhaseWriteRequest::new("PAI242944", PhaseCode::CdpDelivery, "2025-07-04", "mruiz");
    state
        .phase_api
        .upsert_phase(request)
        .await
        .expect("upsert should succeed");

    let pending = state.outbox.fetch_pending(10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reference, "PAI242944");
    assert_eq!(pending[0].event_type, "PhaseConfirmed");
}

#[tokio::test]
async fn test_failed_upsert_restores_snapshot() {
    let (_temp_file, state) = seeded_state().await;
    state
        .phase_api
        .refresh_from_remote("PAE251806")
        .await
        .expect("refresh should succeed");
    let before = state.phase_api.phases("PAE251806").unwrap();

    // 记录系统未登记该单号，写入被拒绝
    let request = PhaseWriteRequest::new("PAE999999", PhaseCode::CdpDelivery, "2025-07-04", "mruiz");
    let err = state.phase_api.upsert_phase(request).await.unwrap_err();
    assert!(matches!(err, ApiError::RemoteWriteFailure { .. }));
    assert!(state.phase_api.phases("PAE999999").unwrap().is_empty());

    // 其他单号不受影响
    assert_eq!(state.phase_api.phases("PAE251806").unwrap(), before);
}

#[tokio::test]
async fn test_malformed_write_rejected_before_remote() {
    let (_temp_file, state) = seeded_state().await;

    let request = PhaseWriteRequest::new("PAE251806", PhaseCode::CdpDelivery, "03/07/2025", "mruiz");
    let err = state.phase_api.upsert_phase(request).await.unwrap_err();
    assert!(matches!(err, ApiError::FormatError(_)));
    assert!(state.phase_api.phases("PAE251806").unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_many_isolates_failures() {
    let (_temp_file, state) = seeded_state().await;

    let references = vec![
        "PAE251806".to_string(),
        " ".to_string(),
        "PAE251807".to_string(),
    ];
    let results = state.phase_api.refresh_many(&references).await;

    assert_eq!(results.len(), 3);
    assert!(!results[0].1.as_ref().unwrap().has_errors());
    assert!(matches!(results[1].1, Err(ApiError::InvalidInput(_))));
    assert!(results[2].1.as_ref().unwrap().has_errors());
}

#[tokio::test]
async fn test_evaluate_all_covers_cached_references() {
    let (_temp_file, state) = seeded_state().await;
    assert!(state.phase_api.evaluate_all().unwrap().is_empty());

    state.phase_api.refresh_from_remote("PAE251807").await.unwrap();
    state.phase_api.refresh_from_remote("PAE251806").await.unwrap();

    let results = state.phase_api.evaluate_all().unwrap();
    let references: Vec<&str> = results.iter().map(|r| r.reference.as_str()).collect();
    assert_eq!(references, vec!["PAE251806", "PAE251807"]);
    assert!(!results[0].has_errors());
    assert_eq!(results[1].error_count(), 1);
}

#[tokio::test]
async fn test_unknown_stored_exception_code_reported_as_format_error() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    insert_reference(&conn, "PAE251808", "240", "3945").unwrap();
    insert_phase(&conn, "PAE251808", "130", "2025-06-20", None).unwrap();
    insert_phase(&conn, "PAE251808", "140", "2025-07-04", Some("PW_XX")).unwrap();

    let state = AppState::new(db_path).await.expect("Failed to init AppState");
    let result = state
        .phase_api
        .refresh_from_remote("PAE251808")
        .await
        .expect("refresh should succeed");

    let field = result
        .field(PhaseCode::CdpDelivery)
        .expect("unknown code should be reported on the phase");
    assert_eq!(field.kind, Some(DiscrepancyKind::FormatError));
    assert!(field.message.as_deref().unwrap_or_default().contains("PW_XX"));
    assert!(result
        .transition(PhaseCode::TransportHandoff, PhaseCode::CdpDelivery)
        .is_none());
    assert_eq!(result.error_count(), 1);
}
