//! Outbound transport to the chat gateway, with the source framework's
//! exact retry/diagnostic semantics.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub status_path: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self { client, config }
    }

    /// POST `payload` to `<base>/<action>`. HTTP 4xx returns immediately
    /// without retry. HTTP 200 with `status` in {"ok", "async"} succeeds.
    /// HTTP 200 with any other `status` is a terminal semantic failure —
    /// it exits the retry loop immediately rather than retrying, exactly
    /// like any other non-retryable outcome, and proceeds straight to the
    /// diagnostic status call. Any other failure (non-200, transport error)
    /// retries up to `max_retries`.
    pub async fn send(&self, action: &str, payload: Value) -> bool {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), action);

        for attempt in 1..=self.config.max_retries {
            let response = self.client.post(&url).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_client_error() {
                        warn!(action, status = %status, "gateway rejected request, not retrying");
                        return false;
                    }

                    if status.is_success() {
                        match resp.json::<Value>().await {
                            Ok(body) => {
                                let gateway_status = body.get("status").and_then(Value::as_str);
                                match gateway_status {
                                    Some("ok") | Some("async") => return true,
                                    _ => {
                                        warn!(action, ?gateway_status, "gateway reported semantic failure, not retrying");
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(action, error = %e, attempt, "failed to parse gateway response, retrying");
                            }
                        }
                    } else {
                        warn!(action, status = %status, attempt, "gateway transport failure, retrying");
                    }
                }
                Err(e) => {
                    warn!(action, error = %e, attempt, "gateway request error, retrying");
                }
            }
        }

        self.diagnose().await;
        false
    }

    async fn diagnose(&self) {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.status_path
        );
        match self.client.get(&url).send().await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(body) => info!(status_snapshot = %body, "gateway diagnostic status"),
                Err(e) => warn!(error = %e, "failed to parse diagnostic status response"),
            },
            Err(e) => warn!(error = %e, "failed to reach gateway for diagnostic status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> GatewayConfig {
        GatewayConfig {
            base_url,
            status_path: "get_status".to_string(),
            timeout_seconds: 5,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn ok_status_succeeds_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send_msg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(config(server.uri()));
        let ok = client.send("send_msg", serde_json::json!({})).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn client_error_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send_msg"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(config(server.uri()));
        let ok = client.send("send_msg", serde_json::json!({})).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn semantic_failure_breaks_retry_loop_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send_msg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "failed"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/get_status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = GatewayClient::new(config(server.uri()));
        let ok = client.send("send_msg", serde_json::json!({})).await;
        assert!(!ok);
    }
}
