//! Hashed bag-of-words embeddings
//!
//! A dependency-free stand-in for a hosted embedding model. Each lowercase
//! word is hashed (FNV-1a) into one of `dimensions` buckets with a sign taken
//! from a second hash bit; the vector is L2-normalized, so the dot product of
//! two embeddings is their cosine similarity.

/// Default vector width
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Name reported for this embedder in dataset info
pub const MODEL_NAME: &str = "hashed-bow-v1";

#[derive(Clone, Debug)]
pub struct HashedEmbedder {
    dimensions: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Unit-length embedding; all zeros for text without words
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];

        for word in tokens(text) {
            let hash = fnv1a(word.as_bytes());
            let bucket = usize::try_from(hash % self.dimensions as u64).unwrap_or(0);
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// Cosine similarity of two unit vectors
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_scores_one() {
        let e = HashedEmbedder::default();
        let a = e.embed("Refund policy for annual plans");
        let b = e.embed("refund POLICY for annual plans!");
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_beats_unrelated() {
        let e = HashedEmbedder::default();
        let query = e.embed("refund policy");
        let related = e.embed("Our refund policy allows returns within 30 days");
        let unrelated = e.embed("Kubernetes pods restart after an OOM kill");
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let e = HashedEmbedder::new(8);
        assert_eq!(e.embed("  --  "), vec![0.0; 8]);
    }
}
