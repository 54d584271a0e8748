// Chunker + Variability Scorer
// Sentence-aligned chunking and the embedding "spread" metric

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use super::embedding::EmbeddingHandle;
use super::error::DetectionError;
use crate::services::text_processor::Sentence;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    /// Sentence indices covered by this chunk
    pub sentences: Range<usize>,
    pub text: String,
}

/// Distribute sentences over `target` chunks without splitting any sentence.
///
/// A chunk closes once the running sentence count reaches
/// `(chunk_index + 1) * total / target`, so remainders are spread out rather
/// than piled into the last chunk. Fewer sentences than `target` yields one
/// chunk per sentence.
pub fn chunk_sentences(sentences: &[Sentence], target: usize) -> Vec<Chunk> {
    let total = sentences.len();
    if total == 0 {
        return vec![];
    }
    let target = target.max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    for consumed in 1..=total {
        // consumed >= (k + 1) * total / target, kept in integers
        let boundary_reached = consumed * target >= (chunks.len() + 1) * total;
        if boundary_reached || consumed == total {
            let range = start..consumed;
            let text = sentences[range.clone()]
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            chunks.push(Chunk {
                index: chunks.len(),
                sentences: range,
                text,
            });
            start = consumed;
        }
    }
    chunks
}

/// Population standard deviation of the components of the element-wise mean
/// vector. `None` for no vectors or vectors of differing width.
pub fn mean_vector_spread(vectors: &[Vec<f32>]) -> Option<f64> {
    let dims = vectors.first()?.len();
    if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
        return None;
    }

    let n = vectors.len() as f64;
    let mut mean = vec![0.0f64; dims];
    for v in vectors {
        for (m, x) in mean.iter_mut().zip(v) {
            *m += *x as f64;
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }

    let mu = mean.iter().sum::<f64>() / dims as f64;
    let variance = mean.iter().map(|m| (m - mu).powi(2)).sum::<f64>() / dims as f64;
    Some(variance.sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariabilityReport {
    pub spread: f64,
    pub chunk_count: usize,
}

/// Chunk, embed and measure a document's spread.
pub async fn measure_variability(
    embedding: &EmbeddingHandle,
    sentences: &[Sentence],
    target_chunks: usize,
) -> Result<VariabilityReport, DetectionError> {
    let chunks = chunk_sentences(sentences, target_chunks);
    let texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
    let vectors = embedding.embed(&texts).await?;

    let spread = mean_vector_spread(&vectors)
        .ok_or_else(|| DetectionError::Embedding("no usable chunk vectors".to_string()))?;
    debug!(
        "[VARIABILITY] {} chunks, spread={:.6}",
        texts.len(),
        spread
    );

    Ok(VariabilityReport {
        spread,
        chunk_count: texts.len(),
    })
}
