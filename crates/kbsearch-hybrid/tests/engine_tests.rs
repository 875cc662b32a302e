mod common;

use std::sync::Arc;
use std::time::Duration;

use kbsearch_core::config::SearchSettings;
use kbsearch_core::filter::{FilterOp, FilterValue, MetadataField, MetadataFilter};
use kbsearch_core::types::SearchMode;
use kbsearch_hybrid::{FusionSettings, HybridSearchEngine, SearchRequest, SearchService};

use common::{add_chunk, ip_index, service, shared, ScriptedProvider};

fn fusion(boost: bool, relevance: f32) -> FusionSettings {
    FusionSettings { hybrid_weight: 0.7, keyword_boost_enabled: boost, keyword_boost: 1.5, relevance_threshold: relevance }
}

/// alpha: semantic 1.0 + keyword; beta: semantic 0.6 only; gamma: keyword only.
fn battery_engine(fusion: FusionSettings) -> (HybridSearchEngine, Arc<ScriptedProvider>) {
    let mut index = ip_index(2, 0.3);
    add_chunk(&mut index, "kb/alarms.md", "Alarms", 0, "battery alarm threshold", vec![1.0, 0.0]);
    add_chunk(&mut index, "kb/gateway.md", "Gateway", 0, "gateway reboot procedure", vec![0.6, 0.8]);
    add_chunk(&mut index, "kb/wiring.md", "Wiring", 0, "battery wiring diagram", vec![0.0, 1.0]);
    let provider = Arc::new(ScriptedProvider::new("scripted", 2).with("battery", vec![1.0, 0.0]));
    let embeddings = Arc::new(service(provider.clone(), Duration::from_secs(5)));
    (HybridSearchEngine::new(shared(index), embeddings, fusion), provider)
}

fn assert_close(a: f32, b: f32) {
    assert!((a - b).abs() < 1e-5, "{a} != {b}");
}

#[tokio::test]
async fn hybrid_scores_follow_the_fusion_law() {
    let (engine, _) = battery_engine(fusion(true, 0.1));
    let results = engine.search("battery", SearchMode::Hybrid, 10, &MetadataFilter::default()).await.unwrap();

    let paths: Vec<&str> = results.iter().map(|r| r.metadata.source_path.as_str()).collect();
    assert_eq!(paths, vec!["kb/alarms.md", "kb/wiring.md", "kb/gateway.md"]);
    for r in &results {
        let sem = r.provenance.semantic_score.unwrap();
        let kw = r.provenance.keyword_score.unwrap();
        assert_close(r.similarity_score, 0.7 * sem + 0.3 * kw * 1.5);
        assert_eq!(r.provenance.search_type, SearchMode::Hybrid);
    }
    assert_close(results[0].similarity_score, 1.15);
    assert_eq!(results[1].provenance.semantic_score, Some(0.0), "missing modality counts as exactly 0");
    assert_eq!(results[2].provenance.keyword_score, Some(0.0));
    assert_eq!(results[1].provenance.matched_terms, vec!["battery".to_string()]);
}

#[tokio::test]
async fn boost_and_relevance_threshold_change_the_ranking() {
    let (engine, _) = battery_engine(fusion(false, 0.1));
    let results = engine.search("battery", SearchMode::Hybrid, 10, &MetadataFilter::default()).await.unwrap();
    let paths: Vec<&str> = results.iter().map(|r| r.metadata.source_path.as_str()).collect();
    assert_eq!(paths, vec!["kb/alarms.md", "kb/gateway.md", "kb/wiring.md"]);
    assert_close(results[2].similarity_score, 0.3);

    let (engine, _) = battery_engine(fusion(true, 0.43));
    let results = engine.search("battery", SearchMode::Hybrid, 10, &MetadataFilter::default()).await.unwrap();
    assert_eq!(results.len(), 2, "gateway (0.42) falls under the relevance threshold");

    let (engine, _) = battery_engine(fusion(true, 0.1));
    let top = engine.search("battery", SearchMode::Hybrid, 1, &MetadataFilter::default()).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].metadata.source_path, "kb/alarms.md");
}

#[tokio::test]
async fn equal_combined_scores_keep_encounter_order() {
    // The keyword-only chunk sits at an earlier position than the semantic-only one.
    let mut index = ip_index(2, 0.5);
    add_chunk(&mut index, "kb/a.md", "Logs", 0, "watchdog reset log", vec![0.0, 1.0]);
    add_chunk(&mut index, "kb/b.md", "Reboot", 0, "device reboot sequence", vec![1.0, 0.0]);
    let provider = Arc::new(ScriptedProvider::new("scripted", 2).with("watchdog", vec![1.0, 0.0]));
    let embeddings = Arc::new(service(provider, Duration::from_secs(5)));
    let even = FusionSettings { hybrid_weight: 0.5, keyword_boost_enabled: false, keyword_boost: 1.5, relevance_threshold: 0.1 };
    let engine = HybridSearchEngine::new(shared(index), embeddings, even);

    let results = engine.search("watchdog", SearchMode::Hybrid, 10, &MetadataFilter::default()).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].similarity_score, results[1].similarity_score);
    let paths: Vec<&str> = results.iter().map(|r| r.metadata.source_path.as_str()).collect();
    assert_eq!(paths, vec!["kb/b.md", "kb/a.md"], "semantic candidates come first on ties");
    assert_eq!(results[0].provenance.keyword_score, Some(0.0));
    assert_eq!(results[1].provenance.semantic_score, Some(0.0));
}

#[tokio::test]
async fn single_mode_searches_report_one_sub_score() {
    let (engine, _) = battery_engine(fusion(true, 0.1));
    let none = MetadataFilter::default();

    let semantic = engine.search("battery", SearchMode::Semantic, 10, &none).await.unwrap();
    assert_eq!(semantic.len(), 2, "wiring is orthogonal to the query");
    assert_close(semantic[0].similarity_score, 1.0);
    assert_eq!(semantic[0].provenance.keyword_score, None);

    let keyword = engine.search("battery", SearchMode::Keyword, 10, &none).await.unwrap();
    assert_eq!(keyword.len(), 2);
    assert!(keyword.iter().all(|r| r.provenance.semantic_score.is_none()));

    let filter = MetadataFilter::new().with(MetadataField::SourcePath, FilterOp::Contains, FilterValue::Text("wiring".into()));
    let filtered = engine.search("battery", SearchMode::Hybrid, 10, &filter).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].metadata.section_title, "Wiring");
}

#[tokio::test]
async fn keyword_search_finds_the_single_matching_chunk() {
    let mut index = ip_index(4, 0.3);
    let docs = [
        "install the agent on the gateway",
        "configure the uplink interval",
        "the watchdog restarts stalled services",
        "sms alerts reach the on-call phone",
        "firmware updates run overnight",
    ];
    for (i, d) in docs.iter().enumerate() {
        add_chunk(&mut index, "kb/ops.md", &format!("Step {i}"), i, d, vec![1.0, 0.0, 0.0, 0.0]);
    }
    let provider = Arc::new(ScriptedProvider::new("scripted", 4));
    let engine = HybridSearchEngine::new(shared(index), Arc::new(service(provider, Duration::from_secs(5))), fusion(true, 0.1));

    let results = engine.keyword_search("watchdog", 10, &MetadataFilter::default());
    assert_eq!(results.len(), 1);
    assert!(results[0].content.contains("watchdog"));
    assert!(results[0].similarity_score > 0.0);
}

#[tokio::test]
async fn auxiliary_lookups() {
    let mut index = ip_index(2, 0.3);
    add_chunk(&mut index, "kb/guide.md", "Battery Alarms", 1, "second", vec![1.0, 0.0]);
    add_chunk(&mut index, "kb/guide.md", "Setup", 0, "first", vec![1.0, 0.0]);
    add_chunk(&mut index, "kb/other.md", "Battery Wiring", 0, "other", vec![0.0, 1.0]);
    add_chunk(&mut index, "kb/other.md", "Alarms Routing", 1, "routing", vec![0.0, 1.0]);
    let provider = Arc::new(ScriptedProvider::new("scripted", 2));
    let engine = HybridSearchEngine::new(shared(index), Arc::new(service(provider, Duration::from_secs(5))), fusion(true, 0.1));

    let file: Vec<String> = engine.search_by_file("kb/guide.md").into_iter().map(|r| r.content).collect();
    assert_eq!(file, vec!["first".to_string(), "second".to_string()]);
    assert!(engine.search_by_file("kb/none.md").is_empty());

    let sections = engine.search_by_section("battery", 10);
    assert_eq!(sections.len(), 2);

    // "Battery Alarms" shares two terms; the one-term ties sort by title.
    let suggestions = engine.suggest_related_queries("alarms for battery", 5);
    assert_eq!(
        suggestions,
        vec!["Battery Alarms".to_string(), "Alarms Routing".to_string(), "Battery Wiring".to_string()]
    );
    assert!(engine.suggest_related_queries("the", 5).is_empty());
}

fn search_settings() -> SearchSettings {
    SearchSettings { search_timeout_ms: 200, ..SearchSettings::default() }
}

#[tokio::test]
async fn repeated_query_is_served_from_the_response_cache() {
    let (engine, provider) = battery_engine(fusion(true, 0.1));
    let svc = SearchService::new(engine, &search_settings());
    let request = SearchRequest::new("battery", SearchMode::Hybrid, 5);

    let first = svc.search(&request).await;
    let calls = provider.calls();
    let second = svc.search(&SearchRequest::new("  Battery ", SearchMode::Hybrid, 5)).await;

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.results, second.results);
    assert_eq!(provider.calls(), calls, "no new embedding call");
    let stats = svc.stats();
    assert_eq!(stats.total_searches, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.searches_by_mode.get("hybrid"), Some(&2));
    assert_eq!(stats.cache_entries, 1);

    svc.invalidate();
    assert!(!svc.search(&request).await.from_cache);
    let other_k = svc.search(&SearchRequest::new("battery", SearchMode::Hybrid, 4)).await;
    assert!(!other_k.from_cache, "k is part of the cache key");
}

#[tokio::test]
async fn bad_requests_yield_empty_responses() {
    let (engine, _) = battery_engine(fusion(true, 0.1));
    let svc = SearchService::new(engine, &search_settings());

    let zero = svc.search(&SearchRequest::new("battery", SearchMode::Hybrid, 0)).await;
    assert_eq!(zero.total, 0);
    assert!(zero.error.is_none());

    let mut negative = SearchRequest::new("battery", SearchMode::Keyword, 1);
    negative.k = Some(-3);
    assert_eq!(svc.search(&negative).await.total, 0);

    let mut fuzzy = SearchRequest::new("battery", SearchMode::Keyword, 3);
    fuzzy.mode = "fuzzy".to_string();
    let resp = svc.search(&fuzzy).await;
    assert_eq!(resp.total, 0);
    assert_eq!(resp.mode, "fuzzy");

    let mut default_k = SearchRequest::new("battery", SearchMode::Keyword, 1);
    default_k.k = None;
    assert_eq!(svc.search(&default_k).await.total, 2);
}

#[tokio::test]
async fn empty_index_returns_empty_response() {
    let provider = Arc::new(ScriptedProvider::new("scripted", 2));
    let engine = HybridSearchEngine::new(shared(ip_index(2, 0.3)), Arc::new(service(provider.clone(), Duration::from_secs(5))), fusion(true, 0.1));
    let svc = SearchService::new(engine, &search_settings());
    for mode in SearchMode::ALL {
        let resp = svc.search(&SearchRequest::new("anything", mode, 5)).await;
        assert_eq!(resp.total, 0);
        assert!(resp.results.is_empty());
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn slow_search_times_out_with_an_error_response() {
    let mut index = ip_index(2, 0.3);
    add_chunk(&mut index, "kb/a.md", "A", 0, "battery", vec![1.0, 0.0]);
    let provider = Arc::new(ScriptedProvider::new("scripted", 2).slow(Duration::from_secs(5)));
    let engine = HybridSearchEngine::new(shared(index), Arc::new(service(provider, Duration::from_secs(10))), fusion(true, 0.1));
    let svc = SearchService::new(engine, &search_settings());

    let resp = svc.search(&SearchRequest::new("battery", SearchMode::Semantic, 3)).await;
    assert_eq!(resp.error.as_deref(), Some("search timed out"));
    assert_eq!(resp.total, 0);
    assert_eq!(svc.stats().timeouts, 1);
    assert_eq!(svc.stats().cache_entries, 0, "failures are not cached");
}
