use kbsearch_core::traits::Embedder;
use kbsearch_embed::HashEmbedder;

#[test]
fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(384);
    let texts = vec!["hello world".to_string(), "hello world".to_string(), "reboot gateway".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(embs.len(), 3, "one vector per input");
    assert_eq!(v1.len(), 384, "embedding dim is 384");

    // Norm approximately 1.0
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    // Deterministic for same input
    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
    assert_ne!(v1, &embs[2]);
}

#[test]
fn hash_embedder_never_returns_zero_vector() {
    let embedder = HashEmbedder::new(16);
    for text in ["", "   ", "x"] {
        let v = embedder.embed_text(text);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-3, "{text:?} has norm {norm}");
    }
    assert_eq!(embedder.model_id(), "hash:xxh64:d16");
}

#[test]
fn zero_dimension_hash_embedder_does_not_panic() {
    let embedder = HashEmbedder::new(0);
    assert!(embedder.embed_text("battery alarm").is_empty());
    assert_eq!(embedder.embed_batch(&["x".to_string()]).unwrap(), vec![Vec::<f32>::new()]);
}
