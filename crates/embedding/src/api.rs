//! Blocking HTTP adapter to the external embedding service.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::normalize::l2_normalize_in_place;
use crate::retry::execute_with_retry;
use crate::{check_dimension, EmbeddingGateway};

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP implementation of [`EmbeddingGateway`].
///
/// One client per gateway instance; the connection pool, timeout, and
/// retry budget all come from the injected [`EmbeddingConfig`]. Vectors
/// are optionally L2-normalized before being handed back so the caller's
/// normalization policy is applied in exactly one place.
pub struct HttpEmbeddingGateway {
    cfg: EmbeddingConfig,
    normalize: bool,
    client: reqwest::blocking::Client,
}

impl HttpEmbeddingGateway {
    /// Build a gateway. Fails fast on invalid configuration.
    pub fn new(cfg: EmbeddingConfig, normalize: bool) -> Result<Self, EmbeddingError> {
        cfg.validate()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(cfg.timeout())
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            cfg,
            normalize,
            client,
        })
    }

    fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let payload = json!({
            "model": self.cfg.model_name,
            "inputs": texts,
        });

        let mut request = self.client.post(&self.cfg.api_url).json(&payload);
        if let Some(auth) = &self.cfg.api_auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| format!("invalid response body: {e}"))?;
        Ok(parsed.embeddings)
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let outcome = execute_with_retry(&self.cfg.retry, |attempt| {
            if attempt > 0 {
                debug!(attempt, count = texts.len(), "embedding_retry");
            }
            self.request_embeddings(texts)
        });

        let attempts = outcome.attempts;
        let vectors = outcome.into_result().map_err(|e| {
            warn!(attempts, error = %e, "embedding_unavailable");
            EmbeddingError::Unavailable(e)
        })?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Response(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let mut out = Vec::with_capacity(vectors.len());
        for mut vector in vectors {
            check_dimension(self.cfg.dimension, &vector)?;
            if self.normalize {
                l2_normalize_in_place(&mut vector);
            }
            out.push(vector);
        }
        Ok(out)
    }
}

impl EmbeddingGateway for HttpEmbeddingGateway {
    fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_many(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Response("empty embeddings array".into()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_many(texts)
    }

    fn health(&self) -> Result<(), EmbeddingError> {
        match &self.cfg.health_url {
            Some(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(EmbeddingError::Unavailable(format!(
                        "health endpoint answered {}",
                        response.status()
                    )))
                }
            }
            // Without a dedicated endpoint, embed a probe. This also
            // proves the dimension contract before any real traffic.
            None => self.embed("health probe").map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_validates_config() {
        let cfg = EmbeddingConfig::default().with_dimension(0);
        assert!(HttpEmbeddingGateway::new(cfg, true).is_err());
    }

    #[test]
    fn unreachable_service_reports_unavailable() {
        // Nothing listens on a reserved port; retries exhaust quickly.
        let cfg = EmbeddingConfig::default()
            .with_api_url("http://127.0.0.1:1/v1/embed")
            .with_retry(
                crate::RetryConfig::default()
                    .with_max_retries(1)
                    .with_base_delay(std::time::Duration::from_millis(1)),
            );
        let gateway = HttpEmbeddingGateway::new(cfg, true).unwrap();
        let err = gateway.embed("hello").unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_)));
    }

    #[test]
    fn empty_batch_short_circuits() {
        let gateway = HttpEmbeddingGateway::new(EmbeddingConfig::default(), true).unwrap();
        assert!(gateway.embed_batch(&[]).unwrap().is_empty());
    }
}
