//! Wire types and error definitions for the remote config source.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key/value configuration of one namespace.
///
/// Ordered so that rendering the same snapshot twice is byte-identical.
pub type ConfigSnapshot = BTreeMap<String, String>;

/// Result of a reachable request: either new data, or the server declined
/// to return any (304, or any other non-200 status).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    Updated(T),
    NotModified { status: u16 },
}

/// Configuration returned by the uncached endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedConfig {
    pub release_key: String,
    pub configurations: ConfigSnapshot,
}

/// Errors that can occur while talking to the config server.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, reset, DNS failure and the like.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered 200 with a body we could not parse.
    #[error("malformed response: {0}")]
    Decode(String),

    /// A 200 notification response without an entry for the namespace.
    #[error("notification response has no entry for namespace '{0}'")]
    EmptyNotification(String),
}

impl FetchError {
    /// Transport-level failures that are expected to clear on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Timeout)
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Timeout => "timeout",
            FetchError::Decode(_) => "decode",
            FetchError::EmptyNotification(_) => "empty_notification",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// One element of the `notifications` query parameter.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest<'a> {
    pub namespace_name: &'a str,
    pub notification_id: i64,
}

/// One element of the `/notifications/v2` response array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    pub namespace_name: String,
    pub notification_id: i64,
    #[serde(default)]
    pub messages: Option<NotificationMessages>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationMessages {
    #[serde(default)]
    pub details: HashMap<String, i64>,
}

/// Body of `/configs/{appId}/{cluster}/{namespace}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncachedResponse {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default, alias = "Namespace")]
    pub namespace_name: String,
    #[serde(default)]
    pub configurations: ConfigSnapshot,
    #[serde(default)]
    pub release_key: String,
}

impl From<UncachedResponse> for ReleasedConfig {
    fn from(body: UncachedResponse) -> Self {
        Self {
            release_key: body.release_key,
            configurations: body.configurations,
        }
    }
}

/// Highest notification id among the entries that belong to `namespace`.
///
/// The server may append the `.properties` suffix or change case, so both
/// are ignored when matching. Entries for other namespaces never count.
pub fn fold_notifications(entries: &[NotificationEntry], namespace: &str) -> Option<i64> {
    let wanted = normalize_namespace(namespace);
    entries
        .iter()
        .filter(|e| normalize_namespace(&e.namespace_name) == wanted)
        .map(|e| e.notification_id)
        .max()
}

fn normalize_namespace(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    match lower.strip_suffix(".properties") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, id: i64) -> NotificationEntry {
        NotificationEntry {
            namespace_name: name.to_string(),
            notification_id: id,
            messages: None,
        }
    }

    #[test]
    fn test_fold_takes_maximum_of_matching_entries() {
        let entries = vec![
            entry("application", 5),
            entry("db", 40),
            entry("application.properties", 9),
        ];
        assert_eq!(fold_notifications(&entries, "application"), Some(9));
        assert_eq!(fold_notifications(&entries, "DB"), Some(40));
        assert_eq!(fold_notifications(&entries, "cache"), None);
        assert_eq!(fold_notifications(&[], "application"), None);
    }

    #[test]
    fn test_decode_notification_body() {
        let body = r#"[{"namespaceName":"application","notificationId":101,
            "messages":{"details":{"shop+default+application":101}}}]"#;
        let entries: Vec<NotificationEntry> = serde_json::from_str(body).unwrap();
        assert_eq!(entries[0].notification_id, 101);
        let details = &entries[0].messages.as_ref().unwrap().details;
        assert_eq!(details["shop+default+application"], 101);
    }

    #[test]
    fn test_decode_uncached_body() {
        let body = r#"{"appId":"shop","cluster":"default","namespaceName":"application",
            "configurations":{"b":"2","a":"1"},"releaseKey":"20240101-abc"}"#;
        let released: ReleasedConfig =
            serde_json::from_str::<UncachedResponse>(body).unwrap().into();
        assert_eq!(released.release_key, "20240101-abc");
        assert_eq!(released.configurations.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_error_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Transport("refused".into()).is_transient());
        assert!(!FetchError::Decode("eof".into()).is_transient());
        assert_eq!(FetchError::EmptyNotification("db".into()).label(), "empty_notification");
    }
}
