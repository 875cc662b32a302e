use kbsearch_text::{KeywordMatch, KeywordScorer};

const CHUNKS: [&str; 5] = [
    "Gateways report heartbeat metrics every minute.",
    "Devices reboot when the watchdog fires.",
    "Send the STATUS command over SMS to query a device.",
    "Firmware updates are staged by the job scheduler.",
    "Prometheus scrapes the exporter on port 9100.",
];

#[test]
fn term_in_one_chunk_returns_only_that_chunk() {
    let scorer = KeywordScorer::new();
    let hits = scorer.rank("watchdog", CHUNKS.iter().enumerate().map(|(i, c)| (i, *c)), 10);
    assert_eq!(hits.len(), 1, "chunks without the term are excluded");
    assert_eq!(hits[0].0, 1);
    assert!(hits[0].1.score > 0.0);
    assert_eq!(hits[0].1.matched_terms, vec!["watchdog".to_string()]);
}

#[test]
fn stop_words_and_short_terms_are_dropped() {
    let scorer = KeywordScorer::new();
    assert_eq!(scorer.terms("How do I reboot the Gateway?"), vec!["reboot", "gateway"]);
    assert_eq!(scorer.terms("¿Cómo reinicio el equipo para la alarma?"), vec!["reinicio", "equipo", "alarma"]);
    assert_eq!(scorer.terms("sms sms SMS"), vec!["sms"], "terms are de-duplicated");
    assert!(scorer.terms("is it on").is_empty());
}

#[test]
fn score_combines_coverage_and_capped_density() {
    let terms = vec!["alert".to_string(), "battery".to_string()];

    let half = KeywordScorer::score(&terms, "Battery level nominal").unwrap();
    // coverage 1/2, density 1/2
    assert!((half.score - 0.25).abs() < 1e-6, "score={}", half.score);

    let full = KeywordScorer::score(&terms, "battery alert: battery low, alert raised, alert acked").unwrap();
    // coverage 1, density min(5/2, 2) = 2, capped at 1
    assert!((full.score - 1.0).abs() < 1e-6);

    assert_eq!(KeywordScorer::score(&terms, "nothing relevant"), None::<KeywordMatch>);
    assert_eq!(KeywordScorer::score(&[], "battery"), None);
}

#[test]
fn ranking_is_descending_with_stable_ties() {
    let scorer = KeywordScorer::new();
    let docs = vec![
        ("a", "device rebooted"),
        ("b", "device went offline"),
        ("c", "another device"),
    ];
    let hits = scorer.rank("device offline", docs, 3);
    let order: Vec<&str> = hits.iter().map(|(k, _)| *k).collect();
    assert_eq!(order, vec!["b", "a", "c"]);
    assert!(scorer.rank("device", vec![("a", "device")], 0).is_empty(), "k = 0 yields nothing");
}
