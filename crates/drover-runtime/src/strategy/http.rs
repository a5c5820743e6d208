use crate::{error::StrategyError, strategy::TaskStrategy};
use async_trait::async_trait;
use drover_core::retry::RetryPolicy;
use model::task::MigrationTask;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::debug;

const MAX_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes tasks against a remote endpoint. The task's `http_params` are
/// appended to the endpoint as path segments and `http_body` travels as the
/// JSON body. Any status outside {200, 201, 202, 204} is a failure.
#[derive(Debug)]
pub struct HttpStrategy {
    client: Client,
    endpoint: String,
    method: Method,
    rollback: Option<(String, Method)>,
}

impl HttpStrategy {
    pub fn new(
        endpoint: String,
        method: &str,
        rollback_endpoint: Option<String>,
        rollback_method: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, StrategyError> {
        let method = parse_method(method)?;
        let rollback = match rollback_endpoint {
            Some(url) => Some((url, parse_method(rollback_method.unwrap_or("POST"))?)),
            None => None,
        };
        let client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(HttpStrategy {
            client,
            endpoint,
            method,
            rollback,
        })
    }

    fn build_url(endpoint: &str, path_params: &[String]) -> String {
        if path_params.is_empty() {
            return endpoint.to_string();
        }

        let mut url = String::from(endpoint);
        for param in path_params {
            url.push('/');
            url.push_str(param);
        }
        url
    }

    fn is_success(status: StatusCode) -> bool {
        matches!(status.as_u16(), 200 | 201 | 202 | 204)
    }
}

fn parse_method(method: &str) -> Result<Method, StrategyError> {
    Method::from_bytes(method.as_bytes())
        .map_err(|_| StrategyError::InvalidMethod(method.to_string()))
}

#[async_trait]
impl TaskStrategy for HttpStrategy {
    async fn execute(&self, task: &MigrationTask) -> Result<(), StrategyError> {
        let url = Self::build_url(&self.endpoint, &task.http_params);
        let body = task.http_body.clone().unwrap_or(serde_json::Value::Null);
        debug!(task = %task.name, url = %url, "dispatching task");

        let response = self
            .client
            .request(self.method.clone(), &url)
            .json(&body)
            .send()
            .await?;

        if !Self::is_success(response.status()) {
            return Err(StrategyError::HttpStatus {
                task: task.name.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    /// One fire-and-forget request to the rollback endpoint, if configured.
    async fn rollback(&self, task: &MigrationTask) -> Result<(), StrategyError> {
        let Some((url, method)) = &self.rollback else {
            return Ok(());
        };

        let response = self.client.request(method.clone(), url).send().await?;
        if !Self::is_success(response.status()) {
            return Err(StrategyError::HttpStatus {
                task: task.name.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::constant(MAX_ATTEMPTS, RETRY_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_appends_path_params_as_segments() {
        let url = HttpStrategy::build_url(
            "http://localhost:8080/accounts",
            &["42".to_string(), "archive".to_string()],
        );
        assert_eq!(url, "http://localhost:8080/accounts/42/archive");
    }

    #[test]
    fn url_without_params_is_the_endpoint() {
        let url = HttpStrategy::build_url("http://localhost:8080/accounts", &[]);
        assert_eq!(url, "http://localhost:8080/accounts");
    }

    #[test]
    fn accepted_statuses_match_the_success_set() {
        for code in [200u16, 201, 202, 204] {
            assert!(HttpStrategy::is_success(StatusCode::from_u16(code).unwrap()));
        }
        for code in [203u16, 301, 400, 404, 500] {
            assert!(!HttpStrategy::is_success(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn invalid_method_is_rejected_at_build_time() {
        let err = HttpStrategy::new(
            "http://localhost:8080/accounts".into(),
            "FETCH IT",
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StrategyError::InvalidMethod(_)));
    }

    #[test]
    fn missing_rollback_endpoint_means_no_rollback_request() {
        let strategy = HttpStrategy::new(
            "http://localhost:8080/accounts".into(),
            "POST",
            None,
            None,
            None,
        )
        .unwrap();
        assert!(strategy.rollback.is_none());
    }
}
