//! HEAD-probe URL validation. A URL passes when the probe lands on a 200 and
//! the final URL does not look like an error page. Probes are concurrency-
//! capped across a batch and paced per host.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};
use url::Url;

/// Path substrings marking a soft 404: a 200 whose final URL is an error page.
const SOFT_404_MARKERS: &[&str] = &["/404", "/not-found", "/error", "notfound", "page-not-found"];

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub timeout: Duration,
    /// Maximum in-flight probes across a batch.
    pub max_concurrency: usize,
    /// Minimum spacing between probes to the same host.
    pub per_host_delay: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_concurrency: 5,
            per_host_delay: Duration::from_millis(500),
        }
    }
}

/// Result of probing one URL.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub url: String,
    pub ok: bool,
    pub status: Option<u16>,
    pub final_url: String,
}

pub struct UrlValidator {
    config: ValidatorConfig,
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
    last_probe_per_host: Mutex<HashMap<String, Instant>>,
}

impl UrlValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .unwrap_or_default();
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            last_probe_per_host: Mutex::new(HashMap::new()),
            config,
            http,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ValidatorConfig::default())
    }

    /// HEAD-probe a single URL. Timeouts, connection errors, and non-200
    /// statuses are all failures.
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        let _permit = self.semaphore.acquire().await;
        self.pace_host(url).await;

        match self.http.head(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let final_url = response.url().to_string();
                let ok = status == 200 && !is_soft_404(&final_url);
                if !ok {
                    debug!(url, status, final_url = %final_url, "URL probe failed");
                }
                ProbeOutcome {
                    url: url.to_string(),
                    ok,
                    status: Some(status),
                    final_url,
                }
            }
            Err(e) => {
                debug!(url, error = %e, "URL probe error");
                ProbeOutcome {
                    url: url.to_string(),
                    ok: false,
                    status: None,
                    final_url: url.to_string(),
                }
            }
        }
    }

    /// Probe a batch; order of outcomes matches the input order.
    pub async fn probe_all(&self, urls: &[String]) -> Vec<ProbeOutcome> {
        join_all(urls.iter().map(|u| self.probe(u))).await
    }

    async fn pace_host(&self, url: &str) {
        let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
        else {
            warn!(url, "Unparseable URL in probe");
            return;
        };

        let wait = {
            let mut per_host = self.last_probe_per_host.lock().await;
            let now = Instant::now();
            let wait = per_host
                .get(&host)
                .and_then(|last| self.config.per_host_delay.checked_sub(last.elapsed()));
            per_host.insert(host, now + wait.unwrap_or_default());
            wait
        };

        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Whether a final URL's path indicates an error page despite a 200.
pub fn is_soft_404(final_url: &str) -> bool {
    let path = Url::parse(final_url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| final_url.to_lowercase());
    SOFT_404_MARKERS.iter().any(|marker| path.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_404_detected_by_path_markers() {
        assert!(is_soft_404("https://example.com/404"));
        assert!(is_soft_404("https://example.com/not-found"));
        assert!(is_soft_404("https://example.com/page-not-found?from=x"));
        assert!(is_soft_404("https://example.com/errors/notfound"));
    }

    #[test]
    fn ordinary_paths_are_not_soft_404() {
        assert!(!is_soft_404("https://example.com/blog/zero-trust"));
        assert!(!is_soft_404("https://example.com/"));
    }

    #[tokio::test]
    async fn probe_of_unreachable_host_fails() {
        let validator = UrlValidator::new(ValidatorConfig {
            timeout: Duration::from_millis(200),
            ..ValidatorConfig::default()
        });
        let outcome = validator.probe("https://nonexistent.invalid/x").await;
        assert!(!outcome.ok);
        assert!(outcome.status.is_none());
    }
}
