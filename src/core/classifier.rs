//! Turns a raw [`ProcessOutcome`] into a [`ClassifiedResult`].
//!
//! | exit / timeout | payload parses | error field | outcome     |
//! |----------------|----------------|-------------|-------------|
//! | timed out      | -              | -           | Timeout     |
//! | non-zero       | yes            | set         | UserError   |
//! | non-zero       | yes            | null        | SystemError |
//! | non-zero       | no             | -           | SystemError |
//! | zero           | yes            | set         | UserError   |
//! | zero           | yes            | null        | Success     |
//! | zero           | no             | -           | SystemError |

use crate::core::domain::{ClassifiedResult, Outcome, ProcessOutcome, ResultBody};
use crate::core::protocol::{EXIT_SUCCESS, ExecutorPayload};
use crate::core::traits::sandbox::SandboxError;

pub const SUCCESS_MESSAGE: &str = "Script executed successfully.";
pub const USER_ERROR_PREFIX: &str = "Script execution failed: ";
pub const TIMEOUT_MESSAGE: &str = "Script execution timed out.";
pub const SANDBOX_FAILURE_MESSAGE: &str = "Execution failed inside sandbox.";
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse executor output.";

pub fn classify(outcome: &ProcessOutcome) -> ClassifiedResult {
    if !outcome.stderr.is_empty() {
        tracing::debug!(
            "Runtime stderr:\n{}",
            String::from_utf8_lossy(&outcome.stderr).trim_end()
        );
    }

    if outcome.timed_out {
        tracing::warn!(
            "Runtime timed out, discarding {} bytes of partial output",
            outcome.stdout.len()
        );
        return ClassifiedResult::new(
            Outcome::Timeout,
            TIMEOUT_MESSAGE,
            ResultBody {
                error: Some(TIMEOUT_MESSAGE.to_string()),
                ..Default::default()
            },
        );
    }

    let payload = parse_payload(&outcome.stdout);
    match (outcome.exit_status, payload) {
        (_, Ok(payload)) if payload.error.is_some() => user_error(payload),
        (Some(EXIT_SUCCESS), Ok(payload)) => success(payload),
        (Some(EXIT_SUCCESS), Err(e)) => system_error(
            PARSE_FAILURE_MESSAGE,
            format!(
                "runtime exited with code 0 but its output is not a payload: {e}. stdout: {}",
                describe_bytes(&outcome.stdout)
            ),
        ),
        (status, Ok(_)) => system_error(
            SANDBOX_FAILURE_MESSAGE,
            format!(
                "runtime {} without reporting an error. stderr: {}",
                describe_status(status),
                describe_bytes(&outcome.stderr)
            ),
        ),
        (status, Err(_)) => system_error(
            SANDBOX_FAILURE_MESSAGE,
            format!(
                "runtime {}. stdout: {} stderr: {}",
                describe_status(status),
                describe_bytes(&outcome.stdout),
                describe_bytes(&outcome.stderr)
            ),
        ),
    }
}

/// Maps a failure to start the runtime at all.
pub fn classify_failure(error: &SandboxError) -> ClassifiedResult {
    system_error(SANDBOX_FAILURE_MESSAGE, error.to_string())
}

fn parse_payload(stdout: &[u8]) -> Result<ExecutorPayload, serde_json::Error> {
    let text = String::from_utf8_lossy(stdout);
    let value: serde_json::Value = serde_json::from_str(text.trim())?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("payload is not a JSON object"));
    }
    serde_json::from_value(value)
}

fn success(payload: ExecutorPayload) -> ClassifiedResult {
    ClassifiedResult::new(
        Outcome::Success,
        SUCCESS_MESSAGE,
        ResultBody {
            result: Some(payload.result.unwrap_or(serde_json::Value::Null)),
            stdout: Some(payload.stdout),
            error: None,
            visualizations: Some(payload.visualizations),
            performance: Some(payload.performance),
        },
    )
}

fn user_error(payload: ExecutorPayload) -> ClassifiedResult {
    if payload.result.as_ref().is_some_and(|r| !r.is_null()) {
        tracing::warn!("Payload carries both an error and a result, dropping the result");
    }

    let message = format!(
        "{USER_ERROR_PREFIX}{}",
        payload.error.unwrap_or_default()
    );
    ClassifiedResult::new(
        Outcome::UserError,
        message.clone(),
        ResultBody {
            stdout: Some(payload.stdout),
            error: Some(message),
            ..Default::default()
        },
    )
}

fn system_error(message: &str, details: String) -> ClassifiedResult {
    tracing::error!("{} {}", message, details);
    ClassifiedResult::new(
        Outcome::SystemError,
        message,
        ResultBody {
            error: Some(message.to_string()),
            ..Default::default()
        },
    )
    .with_details(details)
}

fn describe_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn describe_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        "[empty]".to_string()
    } else {
        String::from_utf8_lossy(bytes).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn outcome(status: Option<i32>, stdout: &str) -> ProcessOutcome {
        ProcessOutcome {
            exit_status: status,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            timed_out: false,
        }
    }

    const SUCCESS_PAYLOAD: &str = r#"{"result": {"x": [1, 2]}, "stdout": "hello\n", "error": null,
        "visualizations": [{"type": "plot", "format": "png", "data": "data:image/png;base64,AA==", "figure_number": 1}],
        "performance": {"execution_time": 0.5, "cpu_time": 0.25, "memory_start": 10.0, "memory_peak": 12.0,
                        "libraries_used": ["import math"], "code_lines": 4, "output_size": 6}}"#;

    const ERROR_PAYLOAD: &str =
        r#"{"result": null, "stdout": "partial\n", "error": "ZeroDivisionError: division by zero"}"#;

    #[test]
    fn test_success() {
        let result = classify(&outcome(Some(0), SUCCESS_PAYLOAD));

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.status, 200);
        assert_eq!(result.body.result, Some(json!({"x": [1, 2]})));
        assert_eq!(result.body.stdout.as_deref(), Some("hello\n"));
        assert_eq!(result.body.error, None);
        assert_eq!(result.body.visualizations.as_ref().unwrap().len(), 1);
        assert_eq!(result.body.performance.as_ref().unwrap().code_lines, 4);
    }

    #[test]
    fn test_success_without_result() {
        let result = classify(&outcome(
            Some(0),
            r#"{"result": null, "stdout": "", "error": null}"#,
        ));

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.body.result, Some(serde_json::Value::Null));
        let rendered = serde_json::to_value(&result).unwrap();
        assert_eq!(rendered["body"]["result"], serde_json::Value::Null);
    }

    #[test]
    fn test_user_error_on_handled_failure() {
        let result = classify(&outcome(Some(1), ERROR_PAYLOAD));

        assert_eq!(result.outcome, Outcome::UserError);
        assert_eq!(result.status, 400);
        assert_eq!(
            result.body.error.as_deref(),
            Some("Script execution failed: ZeroDivisionError: division by zero")
        );
        assert_eq!(result.body.stdout.as_deref(), Some("partial\n"));
        assert_eq!(result.body.result, None);
    }

    #[test]
    fn test_user_error_even_on_zero_exit() {
        let result = classify(&outcome(Some(0), ERROR_PAYLOAD));

        assert_eq!(result.outcome, Outcome::UserError);
        assert_eq!(result.status, 400);
    }

    #[test]
    fn test_error_with_result_drops_result() {
        let result = classify(&outcome(
            Some(1),
            r#"{"result": 5, "stdout": "", "error": "ValueError: nope"}"#,
        ));

        assert_eq!(result.outcome, Outcome::UserError);
        assert_eq!(result.body.result, None);
    }

    #[test]
    fn test_timeout_discards_partial_output() {
        let mut raw = outcome(None, SUCCESS_PAYLOAD);
        raw.timed_out = true;

        let result = classify(&raw);

        assert_eq!(result.outcome, Outcome::Timeout);
        assert_eq!(result.status, 408);
        assert_eq!(result.body.error.as_deref(), Some(TIMEOUT_MESSAGE));
        assert_eq!(result.body.stdout, None);
        assert_eq!(result.body.result, None);
    }

    #[test]
    fn test_zero_exit_with_garbage_is_system_error() {
        for stdout in ["not json at all", "", "[1, 2, 3]", "{\"result\": 1", "42"] {
            let result = classify(&outcome(Some(0), stdout));

            assert_eq!(result.outcome, Outcome::SystemError, "stdout: {stdout:?}");
            assert_eq!(result.status, 500);
            assert_eq!(result.body.error.as_deref(), Some(PARSE_FAILURE_MESSAGE));
            assert!(result.details.is_some());
        }
    }

    #[test]
    fn test_non_utf8_output_is_system_error() {
        let raw = ProcessOutcome {
            exit_status: Some(0),
            stdout: vec![0xff, 0xfe, 0x00],
            ..Default::default()
        };

        assert_eq!(classify(&raw).outcome, Outcome::SystemError);
    }

    #[test]
    fn test_crash_without_payload() {
        let mut raw = outcome(Some(139), "");
        raw.stderr = b"Segmentation fault".to_vec();

        let result = classify(&raw);

        assert_eq!(result.outcome, Outcome::SystemError);
        assert_eq!(result.body.error.as_deref(), Some(SANDBOX_FAILURE_MESSAGE));
        let details = result.details.clone().unwrap();
        assert!(details.contains("exited with code 139"));
        assert!(details.contains("Segmentation fault"));
    }

    #[test]
    fn test_killed_by_signal() {
        let result = classify(&outcome(None, ""));

        assert_eq!(result.outcome, Outcome::SystemError);
        assert!(result.details.unwrap().contains("signal"));
    }

    #[test]
    fn test_non_zero_exit_without_error_is_protocol_violation() {
        let result = classify(&outcome(
            Some(1),
            r#"{"result": 1, "stdout": "", "error": null}"#,
        ));

        assert_eq!(result.outcome, Outcome::SystemError);
    }

    #[test]
    fn test_details_never_serialized() {
        let result = classify(&outcome(Some(3), "secret internals"));

        let rendered = serde_json::to_string(&result).unwrap();

        assert!(!rendered.contains("secret internals"));
        assert!(rendered.contains(SANDBOX_FAILURE_MESSAGE));
    }

    #[test]
    fn test_spawn_failure() {
        let result = classify_failure(&SandboxError::Spawn {
            program: "/usr/local/bin/nsjail".to_string(),
            msg: "No such file or directory".to_string(),
        });

        assert_eq!(result.outcome, Outcome::SystemError);
        assert_eq!(result.status, 500);
        assert!(result.details.unwrap().contains("nsjail"));
    }
}
