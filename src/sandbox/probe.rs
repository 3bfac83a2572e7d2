use std::time::Duration;

use async_trait::async_trait;

use super::EndpointProbe;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes an endpoint with a GET. 2xx and 3xx count as ready; any other
/// status or a transport error means not yet.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a status counts as the server being up.
pub fn status_is_ready(status: u16) -> bool {
    (200..400).contains(&status)
}

#[async_trait]
impl EndpointProbe for HttpProbe {
    async fn is_ready(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::debug!(url, status, "Probe response");
                status_is_ready(status)
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "Probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_ready() {
        assert!(status_is_ready(200));
        assert!(status_is_ready(304));
        assert!(!status_is_ready(502));
        assert!(!status_is_ready(404));
        assert!(!status_is_ready(101));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_not_ready() {
        let probe = HttpProbe::new();
        // Port 9 (discard) on loopback is closed in test environments
        assert!(!probe.is_ready("http://127.0.0.1:9/").await);
    }
}
