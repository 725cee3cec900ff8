//! Test-only mock provider with deterministic, text-derived embeddings.

use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub dimension: usize,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    pub fail_embed: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            dimension: 8,
            supports_embeddings: true,
            fail_chat: false,
            fail_embed: false,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_embed() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

/// Deterministic bag-of-words embedding: each token hashes to a pseudo-random
/// direction, the text embeds to the normalized sum. Texts sharing tokens end
/// up closer than disjoint ones, so nearest-neighbor assertions in tests are
/// meaningful rather than arbitrary.
#[must_use]
pub fn embed_text(text: &str, dimension: usize) -> Vec<f32> {
    let mut acc = vec![0.0_f32; dimension];
    let lowered = text.to_lowercase();
    for token in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        for (slot, value) in acc.iter_mut().zip(token_vector(token, dimension)) {
            *slot += value;
        }
    }
    let norm = acc.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut acc {
            *v /= norm;
        }
    }
    acc
}

fn token_vector(token: &str, dimension: usize) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(token.as_bytes());
    let mut reader = hasher.finalize_xof();
    let mut bytes = vec![0_u8; dimension * 4];
    reader.fill(&mut bytes);
    bytes
        .chunks_exact(4)
        .map(|c| {
            let raw = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            #[expect(clippy::cast_possible_truncation)]
            let unit = (f64::from(raw) / f64::from(u32::MAX)).mul_add(2.0, -1.0) as f32;
            unit
        })
        .collect()
}

impl LlmProvider for MockProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        if self.fail_chat {
            return Err(LlmError::Other("mock completion error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        if !self.supports_embeddings {
            return Err(LlmError::EmbedUnsupported { provider: "mock" });
        }
        Ok(embed_text(text, self.dimension))
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
