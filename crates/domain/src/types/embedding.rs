//! Embedding results

use serde::{Deserialize, Serialize};

use super::usage::UsageRecord;

/// Ordered embedding vectors for a batch of texts
///
/// `embeddings[i]` belongs to the i-th input text, and every vector has the
/// configured dimensionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f32>>,
    pub usage: UsageRecord,
}

impl EmbeddingResult {
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Dimensionality of the vectors, `None` when empty
    pub fn dimensions(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn empty_result_has_no_dimensions() {
        let result =
            EmbeddingResult { embeddings: Vec::new(), usage: UsageRecord::empty(Uuid::nil()) };

        assert!(result.is_empty());
        assert_eq!(result.dimensions(), None);
    }

    #[test]
    fn dimensions_come_from_vectors() {
        let result = EmbeddingResult {
            embeddings: vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]],
            usage: UsageRecord::empty(Uuid::nil()),
        };

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimensions(), Some(3));
    }
}
