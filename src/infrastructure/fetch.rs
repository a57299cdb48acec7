// Retrying, cancellable JSON fetch against the monitoring backend
use crate::domain::source::RetryPolicy;
use crate::error::FetchError;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct FetchClient {
    client: reqwest::Client,
    base_url: String,
}

impl FetchClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// GET `endpoint` as JSON, retrying transport and non-2xx failures per
    /// `policy`. Once the budget is spent the last cause is wrapped in
    /// `SourceUnavailable`. Cancelling `cancel` abandons the call at the next
    /// suspension point and yields `Cancelled`.
    pub async fn get_json(
        &self,
        endpoint: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Value, FetchError> {
        let url = self.build_url(endpoint);
        let attempts = policy.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                outcome = self.attempt(&url, endpoint) => outcome,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("{} succeeded on attempt {}", endpoint, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Attempt {}/{} for {} failed: {}", attempt, attempts, endpoint, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(policy.delay_after(attempt)) => {}
                }
            }
        }

        let last = last_error.unwrap_or_else(|| FetchError::Transport {
            endpoint: endpoint.to_string(),
            reason: "no attempt was made".to_string(),
        });
        Err(FetchError::SourceUnavailable {
            endpoint: endpoint.to_string(),
            attempts,
            last: Box::new(last),
        })
    }

    async fn attempt(&self, url: &str, endpoint: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Transport {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::MalformedPayload {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn flaky_router(failures: u32, hits: Arc<AtomicU32>) -> Router {
        Router::new().route(
            "/api/system",
            get(move || {
                let hits = hits.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        Err(StatusCode::BAD_GATEWAY)
                    } else {
                        Ok(Json(serde_json::json!({"cpu_usage": 12.5})))
                    }
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = serve(flaky_router(2, hits.clone())).await;
        let client = FetchClient::new(base, Duration::from_secs(2)).unwrap();

        let value = client
            .get_json("/api/system", &RetryPolicy::fixed(3, 1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(value["cpu_usage"], 12.5);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_source_unavailable() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = serve(flaky_router(10, hits.clone())).await;
        let client = FetchClient::new(base, Duration::from_secs(2)).unwrap();

        let err = client
            .get_json("/api/system", &RetryPolicy::fixed(2, 1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert_eq!(err.root_kind(), ErrorKind::Http);
        assert_eq!(err.attempts(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api/vms",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "<html>not json</html>" }
            }),
        );
        let base = serve(router).await;
        let client = FetchClient::new(base, Duration::from_secs(2)).unwrap();

        let err = client
            .get_json("/api/vms", &RetryPolicy::fixed(3, 1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedPayload);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_call_is_abandoned() {
        let router = Router::new().route(
            "/api/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "{}"
            }),
        );
        let base = serve(router).await;
        let client = FetchClient::new(base, Duration::from_secs(60)).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client
            .get_json("/api/slow", &RetryPolicy::single_attempt(), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = FetchClient::new(format!("http://{}/", addr), Duration::from_secs(2)).unwrap();

        let err = client
            .get_json("api/system", &RetryPolicy::fixed(2, 1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.root_kind(), ErrorKind::Transport);
    }
}
