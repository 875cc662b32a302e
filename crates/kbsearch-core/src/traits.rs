/// A synchronous, in-process text embedder (local model, hash embedder).
///
/// Implementations return one L2-normalized vector of length [`Embedder::dim`]
/// per input text, in input order.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model behind this embedder.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
