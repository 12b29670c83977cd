use async_trait::async_trait;
use capmap_search::{EvaluationOracle, EvaluationRequest, OracleError, Outcome};
use capmap_tree::Difficulty;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    phase: &'a str,
    node: u32,
    concepts: Vec<&'a str>,
    difficulty: Difficulty,
    instance: u32,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    outcome: Outcome,
}

/// Evaluation service reached over HTTP
///
/// `POST {endpoint}/evaluate` with a JSON body
/// `{"phase", "node", "concepts", "difficulty", "instance"}`; the reply is
/// `{"outcome": "pass" | "fail" | "error" | "fixed_by_external_fixer"}`.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    url: String,
}

impl HttpOracle {
    /// Oracle posting to `{endpoint}/evaluate`
    ///
    /// # Errors
    /// `Transport` if the HTTP client cannot be built
    pub fn new(endpoint: &str) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            url: format!("{}/evaluate", endpoint.trim_end_matches('/')),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EvaluationOracle for HttpOracle {
    async fn evaluate(
        &self,
        request: &EvaluationRequest,
        timeout: Duration,
    ) -> Result<Outcome, OracleError> {
        let body = WireRequest {
            phase: &request.phase,
            node: request.node.0,
            concepts: request
                .configuration
                .concepts()
                .iter()
                .map(String::as_str)
                .collect(),
            difficulty: request.configuration.difficulty(),
            instance: request.instance,
        };

        let response = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(&e, timeout))?;

        if let Some(error) = status_error(&self.url, response.status(), timeout) {
            return Err(error);
        }

        let reply: WireReply = response.json().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(timeout)
            } else {
                OracleError::Protocol(e.to_string())
            }
        })?;
        Ok(reply.outcome)
    }
}

/// Failure carried by a non-success status
///
/// 408 is a `Timeout`, 429 and 5xx are `Transport`, anything else is `Protocol`.
fn status_error(url: &str, status: StatusCode, timeout: Duration) -> Option<OracleError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::REQUEST_TIMEOUT => OracleError::Timeout(timeout),
        StatusCode::TOO_MANY_REQUESTS => OracleError::Transport(format!("{url} returned {status}")),
        s if s.is_server_error() => OracleError::Transport(format!("{url} returned {status}")),
        _ => OracleError::Protocol(format!("{url} returned {status}")),
    })
}

fn classify(error: &reqwest::Error, timeout: Duration) -> OracleError {
    if error.is_timeout() {
        OracleError::Timeout(timeout)
    } else {
        OracleError::Transport(error.to_string())
    }
}
