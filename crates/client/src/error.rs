use {ims_common::StorageError, serde::Deserialize};

/// Structured error body some endpoints return alongside a non-2xx status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Problem {
    /// Best human-readable line from the payload.
    pub fn message(&self) -> Option<String> {
        match (&self.title, &self.detail, &self.error) {
            (Some(title), Some(detail), _) => Some(format!("{title}: {detail}")),
            (None, Some(detail), _) => Some(detail.clone()),
            (_, _, Some(error)) => Some(error.clone()),
            (Some(title), None, None) => Some(title.clone()),
            (None, None, None) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No response was obtained.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("not logged in or session expired")]
    Unauthenticated,
    /// The viewer lacks permission for this resource.
    #[error("permission denied: {message}")]
    Forbidden { message: String },
    #[error("server returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        problem: Option<Problem>,
    },
    #[error("unreadable response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response from {url} lacks a valid {header} header")]
    MissingHeader { url: String, header: &'static str },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Forbidden { .. } => Some(403),
            Self::Unauthenticated => Some(401),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Build the error for a non-success response body.
pub(crate) fn from_status(status: u16, body: &str) -> ClientError {
    let problem = serde_json::from_str::<Problem>(body).ok();
    let message = problem
        .as_ref()
        .and_then(Problem::message)
        .unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() {
                format!("HTTP {status}")
            } else {
                text.to_string()
            }
        });
    match status {
        401 => ClientError::Unauthenticated,
        403 => ClientError::Forbidden { message },
        _ => ClientError::Status {
            status,
            message,
            problem,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_payload_is_preferred() {
        let err = from_status(400, r#"{"title":"Bad request","detail":"no summary"}"#);
        assert_eq!(err.to_string(), "server returned 400: Bad request: no summary");
        assert!(matches!(err, ClientError::Status { problem: Some(_), .. }));
    }

    #[test]
    fn plain_text_body_is_used() {
        let err = from_status(500, "boom\n");
        assert_eq!(err.to_string(), "server returned 500: boom");
    }

    #[test]
    fn empty_body_names_status() {
        let err = from_status(502, "");
        assert_eq!(err.to_string(), "server returned 502: HTTP 502");
    }

    #[test]
    fn auth_statuses_are_distinct() {
        assert!(matches!(from_status(401, ""), ClientError::Unauthenticated));
        let err = from_status(403, r#"{"error":"no write access"}"#);
        assert!(matches!(&err, ClientError::Forbidden { message } if message == "no write access"));
        assert_eq!(err.status(), Some(403));
    }
}
