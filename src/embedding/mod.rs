/// Local embedding generation
///
/// - `FastEmbedProvider` wraps a fastembed model behind the `Embedder` trait
/// - `cosine_similarity` is the one similarity measure used across the crate
mod provider;

pub use provider::{EmbeddingError, FastEmbedProvider};

/// Default model; multilingual so Croatian queries embed sensibly
pub const DEFAULT_MODEL: &str = "multilingual-e5-small";

/// Cosine similarity, or `None` when the vectors differ in length or one
/// has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return None;
    }

    let sim = dot / (mag_a * mag_b);
    sim.is_finite().then_some(sim)
}
