use pactum_backends::build_services;
use pactum_core::config::{AppConfig, LoadOptions};
use pactum_db::{connect_with_settings, connection::ping, migrations};
use serde::Serialize;

use crate::commands::{block_on, CommandResult, Failure};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.extend(check_session_store(&config));
            checks.push(check_backend_wiring(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("database_connectivity"));
            checks.push(DoctorCheck::skipped("session_store_schema"));
            checks.push(DoctorCheck::skipped("backend_wiring"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_session_store(config: &AppConfig) -> [DoctorCheck; 2] {
    let inspection =
        block_on("doctor", async { Ok::<_, Failure>(inspect_session_store(config).await) });

    let schema_skipped = || DoctorCheck {
        name: "session_store_schema",
        status: CheckStatus::Skipped,
        details: "skipped because the database is unreachable".to_string(),
    };

    match inspection {
        Ok(Ok(pending)) => {
            let connectivity = DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            );
            let schema = match pending {
                Ok(pending) if pending.is_empty() => {
                    DoctorCheck::pass("session_store_schema", "all migrations applied")
                }
                Ok(pending) => DoctorCheck::fail(
                    "session_store_schema",
                    format!("{} pending migration(s); run `pactum migrate`", pending.len()),
                ),
                Err(error) => DoctorCheck::fail("session_store_schema", error),
            };
            [connectivity, schema]
        }
        Ok(Err(error)) => [DoctorCheck::fail("database_connectivity", error), schema_skipped()],
        Err(_) => [
            DoctorCheck::fail("database_connectivity", "failed to initialize async runtime"),
            schema_skipped(),
        ],
    }
}

/// Outer error: the store is unreachable. Inner: migration state unreadable.
async fn inspect_session_store(config: &AppConfig) -> Result<Result<Vec<i64>, String>, String> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| format!("failed to connect: {error}"))?;
    ping(&pool).await.map_err(|error| format!("query failed: {error}"))?;

    let pending = migrations::pending_versions(&pool).await.map_err(|error| error.to_string());
    pool.close().await;
    Ok(pending)
}

fn check_backend_wiring(config: &AppConfig) -> DoctorCheck {
    match build_services(config) {
        Ok(_) => DoctorCheck::pass(
            "backend_wiring",
            format!(
                "{:?} model `{}`, search index `{}`, container `{}`",
                config.llm.provider, config.llm.model, config.search.index, config.storage.container
            ),
        ),
        Err(error) => DoctorCheck::fail("backend_wiring", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
