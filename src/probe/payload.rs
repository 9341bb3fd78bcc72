//! Status API payload decoding.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::db::ServiceStatus;

/// Body returned by the status endpoint.
///
/// Only `platform.response[<service key>]` is consumed. `message` and `code`
/// are left undeclared so an unexpected type in either cannot fail the parse.
#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    platform: Option<PlatformStatus>,
    /// Some deployments return the service map without the `platform` envelope.
    #[serde(default)]
    response: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct PlatformStatus {
    #[serde(default)]
    response: HashMap<String, Value>,
}

/// Classify a response body for the given service key.
///
/// Never fails: malformed JSON, a missing key or an unexpected value all map
/// to `Unknown`.
pub fn classify(body: &[u8], service_key: &str) -> ServiceStatus {
    let payload: StatusPayload = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!("Status payload is not valid JSON: {}", e);
            return ServiceStatus::Unknown;
        }
    };

    let services = match (payload.platform, payload.response) {
        (Some(platform), _) => platform.response,
        (None, Some(response)) => response,
        (None, None) => return ServiceStatus::Unknown,
    };

    match services.get(service_key) {
        Some(Value::String(s)) if s.eq_ignore_ascii_case("up") => ServiceStatus::Up,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("down") => ServiceStatus::Down,
        Some(other) => {
            tracing::debug!("Unrecognized status for {}: {}", service_key, other);
            ServiceStatus::Unknown
        }
        None => ServiceStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_up() {
        let body = br#"{"platform":{"message":"ok","code":200,"response":{"myservice":"UP"}}}"#;
        assert_eq!(classify(body, "myservice"), ServiceStatus::Up);
    }

    #[test]
    fn test_classify_down_case_insensitive() {
        let body = br#"{"platform":{"response":{"myservice":"Down"}}}"#;
        assert_eq!(classify(body, "myservice"), ServiceStatus::Down);

        let bare = br#"{"response":{"myservice":"down"}}"#;
        assert_eq!(classify(bare, "myservice"), ServiceStatus::Down);
    }

    #[test]
    fn test_classify_missing_key() {
        let body = br#"{"platform":{"response":{"otherservice":"UP"}}}"#;
        assert_eq!(classify(body, "myservice"), ServiceStatus::Unknown);
    }

    #[test]
    fn test_classify_unexpected_values() {
        let maintenance = br#"{"platform":{"response":{"myservice":"MAINTENANCE"}}}"#;
        assert_eq!(classify(maintenance, "myservice"), ServiceStatus::Unknown);

        let numeric = br#"{"platform":{"response":{"myservice":1}}}"#;
        assert_eq!(classify(numeric, "myservice"), ServiceStatus::Unknown);

        let odd_code = br#"{"platform":{"code":"n/a","response":{"myservice":"up"}}}"#;
        assert_eq!(classify(odd_code, "myservice"), ServiceStatus::Up);
    }

    #[test]
    fn test_classify_garbage() {
        assert_eq!(classify(b"<html>502 Bad Gateway</html>", "myservice"), ServiceStatus::Unknown);
        assert_eq!(classify(b"", "myservice"), ServiceStatus::Unknown);
        assert_eq!(classify(b"{}", "myservice"), ServiceStatus::Unknown);
        assert_eq!(classify(b"[1,2,3]", "myservice"), ServiceStatus::Unknown);
    }
}
