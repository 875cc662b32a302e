mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kbsearch_core::config::SearchSettings;
use kbsearch_core::corpus::FsCorpus;
use kbsearch_core::types::SearchMode;
use kbsearch_core::Error;
use kbsearch_hybrid::{RebuildOutcome, SearchContext, SearchRequest};

use common::{service, ScriptedProvider};

const DIM: usize = 32;

fn settings() -> SearchSettings {
    SearchSettings { embedding_dimension: DIM, similarity_threshold: 0.0, ..SearchSettings::default() }
}

fn write_corpus(root: &Path) {
    fs::write(root.join("setup.md"), "## Install\nInstall the agent on the gateway.\n\n## Verify\nCheck the heartbeat dashboard.\n").unwrap();
    fs::write(root.join("alerts.md"), "## Battery\nLow battery alerts fire below ten percent.\n").unwrap();
}

fn context(root: &Path, index_dir: &Path, provider: Arc<ScriptedProvider>) -> Arc<SearchContext> {
    let settings = settings();
    let corpus = Arc::new(FsCorpus::new(root, &settings.corpus_extensions));
    SearchContext::with_parts(settings, index_dir.to_path_buf(), corpus, service(provider, Duration::from_secs(5))).unwrap()
}

#[tokio::test]
async fn ingest_search_and_incremental_update() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let ctx = context(corpus.path(), data.path(), Arc::new(ScriptedProvider::new("hash-remote", DIM)));

    let report = ctx.index_corpus().await.unwrap();
    assert_eq!(report.changed_files, 2);
    assert_eq!(report.chunks_added, 3);
    assert_eq!(report.degraded_chunks, 0);

    let resp = ctx.search(&SearchRequest::new("battery", SearchMode::Keyword, 5)).await;
    assert_eq!(resp.total, 1);
    assert_eq!(resp.results[0].metadata.section_title, "Battery");
    let cached = ctx.search(&SearchRequest::new("battery", SearchMode::Keyword, 5)).await;
    assert!(cached.from_cache);

    fs::write(corpus.path().join("alerts.md"), "## Battery\nLow battery alerts fire below five percent.\n").unwrap();
    let report = ctx.index_corpus().await.unwrap();
    assert_eq!(report.changed_files, 1);
    assert_eq!(report.unchanged_files, 1);
    assert_eq!(report.chunks_tombstoned, 1);
    assert_eq!(report.chunks_added, 1);

    let resp = ctx.search(&SearchRequest::new("battery", SearchMode::Keyword, 5)).await;
    assert!(!resp.from_cache, "indexing clears the response cache");
    assert_eq!(resp.total, 1, "the stale chunk is skipped by keyword scans");
    assert!(resp.results[0].content.contains("five"));

    fs::remove_file(corpus.path().join("setup.md")).unwrap();
    let report = ctx.index_corpus().await.unwrap();
    assert_eq!(report.removed_files, 1);
    assert_eq!(report.chunks_tombstoned, 2);

    let status = ctx.status();
    assert_eq!(status.vectors.total, 4);
    assert_eq!(status.vectors.live, 1);
    assert_eq!(status.vectors.removed, 3);
    assert_eq!(status.indexed_files, 1);
    assert!(status.config_issues.is_empty());
    assert!(!status.rebuild_running);
}

fn padded(head: &[f32]) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[..head.len()].copy_from_slice(head);
    v
}

#[tokio::test]
async fn edited_chunk_fuses_only_its_live_record() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let provider = ScriptedProvider::new("scripted-remote", DIM)
        .with("battery", padded(&[1.0, 0.0]))
        .with("## Battery\nLow battery alerts fire below ten percent.", padded(&[1.0, 0.0]))
        .with("## Battery\nLow battery alerts fire below five percent.", padded(&[0.8, 0.6]));
    let ctx = context(corpus.path(), data.path(), Arc::new(provider));
    ctx.index_corpus().await.unwrap();

    fs::write(corpus.path().join("alerts.md"), "## Battery\nLow battery alerts fire below five percent.\n").unwrap();
    assert_eq!(ctx.index_corpus().await.unwrap().chunks_tombstoned, 1);

    let resp = ctx.search(&SearchRequest::new("battery", SearchMode::Hybrid, 5)).await;
    let battery: Vec<_> = resp.results.iter().filter(|r| r.metadata.section_title == "Battery").collect();
    assert_eq!(battery.len(), 1);
    let live = battery[0];
    assert!(live.content.contains("five"), "stale content leaked: {}", live.content);
    let sem = live.provenance.semantic_score.unwrap();
    assert!((sem - 0.8).abs() < 1e-5, "semantic score of the live vector, got {sem}");
    assert!(live.provenance.keyword_score.unwrap() > 0.0);
    assert_eq!(live.provenance.matched_terms, vec!["battery".to_string()]);
}

#[tokio::test]
async fn rebuild_compacts_tombstones() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let ctx = context(corpus.path(), data.path(), Arc::new(ScriptedProvider::new("hash-remote", DIM)));
    ctx.index_corpus().await.unwrap();
    fs::remove_file(corpus.path().join("alerts.md")).unwrap();
    ctx.index_corpus().await.unwrap();
    assert_eq!(ctx.status().vectors.removed, 1);

    let outcome = ctx.rebuild_index(false).await.unwrap().unwrap();
    assert_eq!(outcome, RebuildOutcome::Rebuilt { vectors: 2, degraded: 0 });
    let status = ctx.status();
    assert_eq!(status.vectors.total, 2);
    assert_eq!(status.vectors.removed, 0);

    let files: Vec<String> = ctx.engine().search_by_file("setup.md").into_iter().map(|r| r.metadata.section_title).collect();
    assert_eq!(files, vec!["Install".to_string(), "Verify".to_string()]);
}

#[tokio::test]
async fn newer_rebuild_supersedes_an_older_one() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let ctx = context(corpus.path(), data.path(), Arc::new(ScriptedProvider::new("hash-remote", DIM)));
    ctx.index_corpus().await.unwrap();

    let stale = ctx.rebuild_index(true);
    let fresh = ctx.rebuild_index(true);
    let fresh = fresh.await.unwrap().unwrap();
    let stale = stale.await.unwrap().unwrap();

    assert_eq!(stale, RebuildOutcome::Cancelled);
    assert_eq!(fresh, RebuildOutcome::Rebuilt { vectors: 3, degraded: 0 });
    assert_eq!(ctx.status().vectors.total, 3);
}

#[tokio::test]
async fn placeholders_are_backfilled_by_rebuild() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());

    let down = context(corpus.path(), data.path(), Arc::new(ScriptedProvider::new("hash-remote", DIM).failing()));
    let report = down.index_corpus().await.unwrap();
    assert_eq!(report.degraded_chunks, 3);
    assert_eq!(down.status().vectors.degraded, 3);
    assert_eq!(down.embeddings().cache_len(), 0);
    down.shutdown().await.unwrap();

    let up = context(corpus.path(), data.path(), Arc::new(ScriptedProvider::new("hash-remote", DIM)));
    assert_eq!(up.status().vectors.degraded, 3, "placeholder tags survive a restart");
    let outcome = up.rebuild_index(false).await.unwrap().unwrap();
    assert_eq!(outcome, RebuildOutcome::Rebuilt { vectors: 3, degraded: 0 });
}

#[tokio::test]
async fn persisted_state_is_reused_after_restart() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let first = context(corpus.path(), data.path(), Arc::new(ScriptedProvider::new("hash-remote", DIM)));
    first.index_corpus().await.unwrap();
    first.shutdown().await.unwrap();

    let provider = Arc::new(ScriptedProvider::new("hash-remote", DIM));
    let second = context(corpus.path(), data.path(), provider.clone());
    assert_eq!(second.status().vectors.live, 3);
    assert_eq!(second.status().indexed_files, 2);
    let report = second.index_corpus().await.unwrap();
    assert_eq!(report.changed_files, 0);
    assert_eq!(report.chunks_added, 0);

    let resp = second.search(&SearchRequest::new("heartbeat dashboard", SearchMode::Hybrid, 3)).await;
    assert!(resp.error.is_none());
    assert!(resp.results.iter().any(|r| r.metadata.section_title == "Verify"));
}

#[tokio::test]
async fn corrupt_index_starts_empty() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    fs::write(data.path().join("vectors.bin"), b"not an index").unwrap();
    fs::write(data.path().join("metadata.json"), b"{}").unwrap();

    let ctx = context(corpus.path(), data.path(), Arc::new(ScriptedProvider::new("hash-remote", DIM)));
    assert_eq!(ctx.status().vectors.total, 0);
    assert_eq!(ctx.index_corpus().await.unwrap().chunks_added, 3);
}

#[test]
fn init_rejects_missing_corpus_and_bad_settings() {
    let base = tempfile::tempdir().unwrap();
    let missing = SearchSettings { corpus_root: "nope".to_string(), ..settings() };
    assert!(matches!(SearchContext::init(missing, base.path()), Err(Error::Configuration(_))));

    fs::create_dir_all(base.path().join("kb")).unwrap();
    let bad = SearchSettings { corpus_root: "kb".to_string(), chunk_overlap: 5000, ..settings() };
    assert!(matches!(SearchContext::init(bad, base.path()), Err(Error::Configuration(_))));
}

#[test]
fn explicit_parts_are_validated_too() {
    let corpus = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let parts = |settings: SearchSettings, dim: usize| {
        let corpus = Arc::new(FsCorpus::new(corpus.path(), &settings.corpus_extensions));
        let embeddings = service(Arc::new(ScriptedProvider::new("scripted", dim)), Duration::from_secs(5));
        SearchContext::with_parts(settings, data.path().to_path_buf(), corpus, embeddings)
    };

    let zero = SearchSettings { embedding_dimension: 0, ..settings() };
    assert!(matches!(parts(zero, 0), Err(Error::Configuration(_))));
    assert!(matches!(parts(settings(), DIM / 2), Err(Error::Configuration(_))), "service and index dims must agree");
    assert!(parts(settings(), DIM).is_ok());
}
