/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace, 256 for the thumbnail signature).
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Build an embedding scaled to unit length.
    ///
    /// Returns `None` for a zero vector, which carries no direction to compare.
    pub fn normalized(raw: Vec<f32>, model_version: &str) -> Option<Self> {
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if !norm.is_finite() || norm <= f32::EPSILON {
            return None;
        }
        Some(Self {
            values: raw.into_iter().map(|x| x / norm).collect(),
            model_version: Some(model_version.to_string()),
        })
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance in [0, 2]. Lower = more similar.
    ///
    /// This is the scale tolerances are expressed in: a tolerance of 0.60
    /// accepts faces with similarity of at least 0.40.
    pub fn distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// Encoding of the user's reference face, fixed for the lifetime of a scan.
///
/// The inner embedding is only reachable by shared reference, so a scan
/// can compare against it but never alter it.
#[derive(Debug, Clone)]
pub struct ReferenceEncoding(Embedding);

impl ReferenceEncoding {
    pub fn new(embedding: Embedding) -> Self {
        Self(embedding)
    }

    pub fn embedding(&self) -> &Embedding {
        &self.0
    }

    pub fn model_version(&self) -> Option<&str> {
        self.0.model_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding { values: values.to_vec(), model_version: None }
    }

    #[test]
    fn test_similarity_identical() {
        let a = emb(&[0.3, 0.4, 0.5]);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_orthogonal_is_distance_one() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 2.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
        assert!((a.distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_opposite_is_two() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-3.0, 0.0]);
        assert!((a.distance(&b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_similarity() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_distance_sixty_degrees() {
        // cos(a, b) = 0.5 -> distance 0.5
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.5, 0.75f32.sqrt()]);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_unit_length() {
        let e = Embedding::normalized(vec![3.0, 4.0], "test").unwrap();
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert!((e.values[1] - 0.8).abs() < 1e-6);
        assert_eq!(e.model_version.as_deref(), Some("test"));
    }

    #[test]
    fn test_normalized_rejects_zero_vector() {
        assert!(Embedding::normalized(vec![0.0; 8], "test").is_none());
    }

    #[test]
    fn test_reference_encoding_exposes_model_version() {
        let reference = ReferenceEncoding::new(Embedding::normalized(vec![1.0], "w600k_r50").unwrap());
        assert_eq!(reference.model_version(), Some("w600k_r50"));
        assert_eq!(reference.embedding().values, vec![1.0]);
    }
}
