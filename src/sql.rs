//! SQL statements on a warehouse, with bounded polling

use provision::{PollConfig, PollOutcome, PollStatus, ProvisionError, poll_until};
use serde_json::{Value, json};
use wsclient::WorkspaceClient;

fn state(body: &Value) -> &str {
    body.pointer("/status/state")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
}

fn failure(statement: &str, body: Value) -> ProvisionError {
    let reason = body
        .pointer("/status/error/message")
        .and_then(Value::as_str)
        .unwrap_or("no error message")
        .to_string();
    ProvisionError::new(format!("statement failed: {reason}"))
        .with_definition(Value::String(statement.to_string()))
        .with_response(body)
}

/// Run `statement` and wait for it to finish. Returns the final statement
/// payload (status, manifest, first result chunk).
pub fn execute(
    client: &WorkspaceClient,
    warehouse_id: &str,
    statement: &str,
    poll: &PollConfig,
) -> Result<Value, ProvisionError> {
    log::debug!("SQL on {warehouse_id}: {statement}");
    let submitted = client.post(
        "2.0/sql/statements",
        &json!({
            "warehouse_id": warehouse_id,
            "statement": statement,
            "wait_timeout": "30s",
            "on_wait_timeout": "CONTINUE",
        }),
    )?;
    if submitted.is_error() {
        return Err(ProvisionError::new(format!(
            "could not submit statement: {}",
            submitted.message()
        ))
        .with_definition(Value::String(statement.to_string()))
        .with_response(submitted.body));
    }

    let mut body = submitted.body;
    let id = body
        .get("statement_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if matches!(state(&body), "PENDING" | "RUNNING") {
        let path = format!("2.0/sql/statements/{id}");
        let outcome = poll_until(poll, |_| {
            body = client.get(&path, &[])?.into_result()?;
            Ok::<_, ProvisionError>(match state(&body) {
                "PENDING" | "RUNNING" => PollStatus::Pending,
                _ => PollStatus::Done,
            })
        })?;
        if !outcome.is_completed() {
            let _ = client.post(&format!("{path}/cancel"), &json!({}));
            let waited = match outcome {
                PollOutcome::TimedOut { elapsed } => format!("{}s", elapsed.as_secs()),
                PollOutcome::StillRunning { attempts } | PollOutcome::Completed { attempts } => {
                    format!("{attempts} checks")
                }
            };
            return Err(ProvisionError::new(format!(
                "statement {id} still running after {waited}, cancelled"
            ))
            .with_definition(Value::String(statement.to_string())));
        }
    }

    match state(&body) {
        "SUCCEEDED" => Ok(body),
        _ => Err(failure(statement, body)),
    }
}
