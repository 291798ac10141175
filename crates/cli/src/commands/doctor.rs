use std::time::Duration;

use payrelay_core::config::{AppConfig, LoadOptions, PaymentConfig};
use payrelay_core::LookupStore;
use payrelay_mcp::{HttpTransport, McpClient, McpToolClient};
use serde::Serialize;

use super::block_on;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let payment = check_payment_server(&config.payment);
            build_report(Ok(&config), payment)
        }
        Err(error) => build_report(Err(error.to_string()), None),
    };

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

/// `payment` is the result of the reachability probe, `None` when it was not run.
pub fn build_report(config: Result<&AppConfig, String>, payment: Option<DoctorCheck>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation".to_string(),
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(check_lookup_files(&LookupStore::new(config.lookup.data_dir.clone())));
            checks.push(payment.unwrap_or_else(|| skipped("payment_server", "probe not run")));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation".to_string(),
                status: CheckStatus::Fail,
                details: error,
            });
            checks.push(skipped("lookup_files", "skipped because configuration did not load"));
            checks.push(skipped("payment_server", "skipped because configuration did not load"));
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

fn skipped(name: &str, details: &str) -> DoctorCheck {
    DoctorCheck { name: name.to_string(), status: CheckStatus::Skipped, details: details.to_string() }
}

fn check_lookup_files(store: &LookupStore) -> Vec<DoctorCheck> {
    store
        .check_files()
        .into_iter()
        .map(|check| match check.result {
            Ok(()) => DoctorCheck {
                name: format!("lookup_file:{}", check.file),
                status: CheckStatus::Pass,
                details: format!("`{}` is readable", check.path.display()),
            },
            Err(error) => DoctorCheck {
                name: format!("lookup_file:{}", check.file),
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        })
        .collect()
}

/// Runs the MCP handshake against the payment server and counts its tools.
pub fn check_payment_server(payment: &PaymentConfig) -> Option<DoctorCheck> {
    let name = "payment_server".to_string();
    let transport = match HttpTransport::new(
        &payment.url,
        payment.api_key.clone(),
        Duration::from_secs(payment.timeout_secs),
    ) {
        Ok(transport) => transport,
        Err(error) => {
            return Some(DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() })
        }
    };

    let result = block_on(async {
        let mut client = McpClient::connect(&payment.server_name, transport).await?;
        let tool_count = client.tools().len();
        client.shutdown().await;
        Ok::<usize, payrelay_mcp::McpError>(tool_count)
    });

    Some(match result {
        Ok(Ok(tool_count)) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("`{}` connected with {tool_count} tools", payment.server_name),
        },
        Ok(Err(error)) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("`{}` unreachable: {error}", payment.server_name),
        },
        Err(error) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("failed to initialize async runtime: {error}"),
        },
    })
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
