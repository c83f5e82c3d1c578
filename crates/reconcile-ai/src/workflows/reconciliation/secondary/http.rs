use std::time::Duration;

use reqwest::StatusCode;

use super::{SecondaryInference, SecondaryRequest, SecondaryResolution, SecondaryUnavailable};

const USER_AGENT: &str = concat!("reconcile-ai/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP client for an external scorer.
///
/// POSTs the sanitized [`SecondaryRequest`] and expects a [`SecondaryResolution`] body.
pub struct HttpSecondary {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpSecondary {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SecondaryUnavailable> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| SecondaryUnavailable::Transport(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SecondaryInference for HttpSecondary {
    async fn resolve(
        &self,
        request: SecondaryRequest,
    ) -> Result<SecondaryResolution, SecondaryUnavailable> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                SecondaryUnavailable::Timeout(self.timeout.as_millis() as u64)
            } else {
                SecondaryUnavailable::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(SecondaryUnavailable::RateLimited),
            StatusCode::PAYMENT_REQUIRED | StatusCode::FORBIDDEN => {
                return Err(SecondaryUnavailable::QuotaExhausted)
            }
            _ if !status.is_success() => {
                return Err(SecondaryUnavailable::Transport(format!(
                    "unexpected status {}",
                    status.as_u16()
                )))
            }
            _ => {}
        }

        let resolution: SecondaryResolution = response
            .json()
            .await
            .map_err(|err| SecondaryUnavailable::Malformed(err.to_string()))?;

        if resolution.confidence > 100 {
            return Err(SecondaryUnavailable::Malformed(format!(
                "confidence {} out of range",
                resolution.confidence
            )));
        }

        Ok(resolution)
    }
}
