// ==========================================
// 通关阶段时效监控系统 - 命令行入口
// ==========================================
// 用法:
//   customs-sla [db_path] evaluate <reference>
//   customs-sla [db_path] stream <from> <to> [customs_office]
//   customs-sla [db_path] import-holidays <csv_path> [locale]
// 未给出 db_path 时使用 CUSTOMS_SLA_DB_PATH 或用户数据目录
// ==========================================

use anyhow::{anyhow, bail, Context};
use customs_sla_tracker::app::{get_default_db_path, AppState};
use customs_sla_tracker::api::TrackingApi;
use customs_sla_tracker::logging;
use serde_json::json;

const COMMANDS: [&str; 3] = ["evaluate", "stream", "import-holidays"];

fn usage() -> anyhow::Error {
    anyhow!(
        "用法:\n  customs-sla [db_path] evaluate <reference>\n  customs-sla [db_path] stream <from> <to> [customs_office]\n  customs-sla [db_path] import-holidays <csv_path> [locale]"
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.first() {
        Some(first) if !COMMANDS.contains(&first.as_str()) => args.remove(0),
        _ => get_default_db_path(),
    };
    if args.is_empty() {
        return Err(usage());
    }
    let command = args.remove(0);

    tracing::info!(
        version = customs_sla_tracker::VERSION,
        db_path = %db_path,
        command = %command,
        "{}",
        customs_sla_tracker::APP_NAME
    );

    let state = AppState::new(db_path)
        .await
        .map_err(|e| anyhow!(e))
        .context("无法初始化AppState")?;

    match command.as_str() {
        "evaluate" => {
            let reference = args.first().ok_or_else(usage)?;
            let result = state
                .phase_api
                .refresh_from_remote(reference)
                .await
                .map_err(|e| anyhow!(e.localized_message()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "stream" => {
            let (from, to) = match (args.first(), args.get(1)) {
                (Some(from), Some(to)) => (from, to),
                _ => return Err(usage()),
            };
            let mut range = TrackingApi::parse_range(from, to).map_err(|e| anyhow!(e.localized_message()))?;
            if let Some(office) = args.get(2) {
                range = range.with_customs_office(office.clone());
            }

            let mut aggregator = state
                .tracking_api
                .stream_tracking(range)
                .await
                .map_err(|e| anyhow!(e.localized_message()))?;

            let outcome = aggregator.run_to_end().await;
            let snapshot = aggregator.snapshot();
            let published = match &outcome {
                Ok(_) => state
                    .tracking_api
                    .publish_flagged(&aggregator)
                    .map_err(|e| anyhow!(e.localized_message()))?,
                Err(_) => 0,
            };

            let summary = json!({
                "session_id": snapshot.session_id,
                "state": snapshot.state,
                "records": snapshot.records.len(),
                "dropped": snapshot.dropped,
                "incomplete": snapshot.incomplete,
                "flagged_references": snapshot.flagged_references,
                "published": published,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);

            if let Err(e) = outcome {
                let err = customs_sla_tracker::ApiError::from(e);
                bail!(err.localized_message());
            }
        }
        "import-holidays" => {
            let csv_path = args.first().ok_or_else(usage)?;
            let locale = args.get(1).map(String::as_str).unwrap_or("es-MX");
            let imported = state
                .holiday_repo
                .import_csv_file(csv_path, locale)
                .with_context(|| format!("节假日导入失败: {}", csv_path))?;
            println!("imported={}", imported);
        }
        other => bail!("未知命令: {}\n{}", other, usage()),
    }

    Ok(())
}
