use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use devflow_core::config::{ModelConfig, RetryConfig};
use devflow_core::error::{DevflowError, Result};
use devflow_core::traits::TextGenerator;

/// A generator that retries failed requests and falls back to alternative models.
pub struct RetryingClient {
    primary: Box<dyn TextGenerator>,
    fallbacks: Vec<(ModelConfig, Box<dyn TextGenerator>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn TextGenerator>,
        fallbacks: Vec<(ModelConfig, Box<dyn TextGenerator>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &DevflowError) -> bool {
    match e {
        DevflowError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl TextGenerator for RetryingClient {
    fn generate(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.generate(prompt.clone()).await {
                    Ok(reply) => return Ok(reply),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary model exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client.generate(prompt.clone()).await {
                    Ok(reply) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(reply);
                    }
                    Err(e) => {
                        warn!(
                            model = %fb_config.model_id,
                            error = %e,
                            "Fallback model also failed"
                        );
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| DevflowError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Flaky {
        failures: usize,
        error: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl TextGenerator for Flaky {
        fn generate(&self, _prompt: String) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures {
                    Err(DevflowError::LlmRequest(self.error.to_string()))
                } else {
                    Ok("ok".to_string())
                }
            })
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&DevflowError::LlmRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_retryable(&DevflowError::LlmRequest("connection reset".into())));
        assert!(!is_retryable(&DevflowError::LlmRequest("HTTP 401".into())));
        assert!(!is_retryable(&DevflowError::LlmParse("bad json".into())));
    }

    #[test]
    fn test_backoff_is_capped_with_jitter() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30000,
        };
        let first = calculate_backoff(0, &config).as_millis();
        assert!((800..=1200).contains(&first), "got {first}");
        let late = calculate_backoff(40, &config).as_millis();
        assert!(late <= 36000, "got {late}");
        assert!(late >= 24000, "got {late}");
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky { failures: 2, error: "HTTP 503", calls: calls.clone() }),
            vec![],
            fast_retry(3),
        );
        assert_eq!(client.generate("p".into()).await.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky { failures: 5, error: "HTTP 401", calls: calls.clone() }),
            vec![],
            fast_retry(3),
        );
        assert!(client.generate("p".into()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falls_back_after_exhaustion() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky { failures: 100, error: "HTTP 500", calls: primary_calls.clone() }),
            vec![(
                ModelConfig::default(),
                Box::new(Flaky { failures: 0, error: "", calls: fallback_calls.clone() })
                    as Box<dyn TextGenerator>,
            )],
            fast_retry(1),
        );
        assert_eq!(client.generate("p".into()).await.unwrap(), "ok");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }
}
