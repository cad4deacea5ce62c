use reqwest::header::HeaderMap;
use serde_json::Value;

/// Default wait before the next poll when the remote renderer doesn't
/// supply a usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_S: i64 = 5;

/// Terminal/in-progress status of a remotely submitted render, decoded
/// from the raw HTTP response rather than a body-level status field —
/// the remote API communicates "still processing" via status 423, not
/// JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteJobStatus {
    Completed { artifact: Value },
    Processing { retry_after_s: i64, progress: Option<u32> },
    Failed { message: String },
}

/// Dispatches on the poll response's HTTP status, per the remote API's
/// documented contract: 200 carries the finished artifact document, 423
/// means still-processing with an advisory `Retry-After` wait, anything
/// else is a terminal failure described by the body.
pub fn parse_status(status: u16, headers: &HeaderMap, body: &str) -> RemoteJobStatus {
    match status {
        200 => RemoteJobStatus::Completed {
            artifact: serde_json::from_str(body).unwrap_or(Value::Null),
        },
        423 => RemoteJobStatus::Processing {
            retry_after_s: retry_after_from_headers(headers),
            progress: extract_progress(body),
        },
        _ => RemoteJobStatus::Failed {
            message: failure_message(body),
        },
    }
}

fn retry_after_from_headers(headers: &HeaderMap) -> i64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_RETRY_AFTER_S)
}

/// Pulls a `NN%`/`NN percent` progress hint out of `body.message` or
/// `body.detail`, if either is present. Best-effort: a body that isn't
/// JSON, or carries no such hint, simply yields no progress.
fn extract_progress(body: &str) -> Option<u32> {
    let value: Value = serde_json::from_str(body).ok()?;
    let text = value
        .get("message")
        .or_else(|| value.get("detail"))
        .and_then(Value::as_str)?;
    progress_from_text(text)
}

fn progress_from_text(text: &str) -> Option<u32> {
    let lower = text.to_lowercase();
    let bytes = lower.as_bytes();
    for marker in ["%", "percent"] {
        let Some(marker_idx) = lower.find(marker) else {
            continue;
        };
        let mut start = marker_idx;
        while start > 0 && bytes[start - 1].is_ascii_digit() {
            start -= 1;
        }
        if start < marker_idx {
            if let Ok(n) = lower[start..marker_idx].trim().parse::<u32>() {
                return Some(n);
            }
        }
    }
    None
}

/// Extracts a human-readable failure message from a non-2xx, non-423
/// body: a string `detail`, a list of `{loc, msg, type}` validation
/// errors joined together, or a fallback when the body doesn't parse.
fn failure_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return "Unknown error".to_string();
    };

    match value.get("detail") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => {
            let messages: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str).map(String::from))
                .collect();
            if messages.is_empty() {
                "Unknown error".to_string()
            } else {
                messages.join("; ")
            }
        }
        _ => "Unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers_with_retry_after(seconds: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, seconds.parse().unwrap());
        headers
    }

    #[test]
    fn status_200_is_completed_with_artifact() {
        let body = json!({"rotations": [{"direction": "n", "url": "https://x/n.png"}]}).to_string();
        let status = parse_status(200, &HeaderMap::new(), &body);
        match status {
            RemoteJobStatus::Completed { artifact } => {
                assert_eq!(artifact["rotations"][0]["direction"], "n");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn status_423_is_processing_with_retry_after_header() {
        let headers = headers_with_retry_after("7");
        let status = parse_status(423, &headers, "{}");
        assert_eq!(
            status,
            RemoteJobStatus::Processing {
                retry_after_s: 7,
                progress: None
            }
        );
    }

    #[test]
    fn status_423_defaults_retry_after_when_header_missing_or_invalid() {
        let status = parse_status(423, &HeaderMap::new(), "{}");
        assert_eq!(
            status,
            RemoteJobStatus::Processing {
                retry_after_s: DEFAULT_RETRY_AFTER_S,
                progress: None
            }
        );

        let headers = headers_with_retry_after("-3");
        let status = parse_status(423, &headers, "{}");
        assert_eq!(
            status,
            RemoteJobStatus::Processing {
                retry_after_s: DEFAULT_RETRY_AFTER_S,
                progress: None
            }
        );
    }

    #[test]
    fn status_423_extracts_progress_from_message() {
        let body = json!({"message": "rendering, 42% complete"}).to_string();
        let status = parse_status(423, &HeaderMap::new(), &body);
        assert_eq!(
            status,
            RemoteJobStatus::Processing {
                retry_after_s: DEFAULT_RETRY_AFTER_S,
                progress: Some(42)
            }
        );
    }

    #[test]
    fn other_status_is_failed_with_detail_string() {
        let body = json!({"detail": "invalid seed"}).to_string();
        let status = parse_status(400, &HeaderMap::new(), &body);
        assert_eq!(
            status,
            RemoteJobStatus::Failed {
                message: "invalid seed".into()
            }
        );
    }

    #[test]
    fn other_status_joins_list_form_detail() {
        let body = json!({"detail": [{"loc": ["body", "size"], "msg": "field required", "type": "missing"}]})
            .to_string();
        let status = parse_status(422, &HeaderMap::new(), &body);
        assert_eq!(
            status,
            RemoteJobStatus::Failed {
                message: "field required".into()
            }
        );
    }

    #[test]
    fn other_status_falls_back_to_unknown_error() {
        let status = parse_status(500, &HeaderMap::new(), "not json");
        assert_eq!(
            status,
            RemoteJobStatus::Failed {
                message: "Unknown error".into()
            }
        );
    }
}
