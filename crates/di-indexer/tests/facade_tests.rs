//! End-to-end tests for the index facade over the local store.

use di_indexer::{
    ColumnDef, ColumnType, Document, IndexFacade, IndexerConfig, IndexerError, Metric, Operation, QueryPolicy,
    Request, Response,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir, n_dim: usize) -> IndexerConfig {
    IndexerConfig {
        hosts: vec![format!("file://{}", dir.path().display())],
        index_name: "test".into(),
        n_dim,
        columns: vec![
            ColumnDef::new("price", ColumnType::Float),
            ColumnDef::new("kind", ColumnType::Str),
            ColumnDef::new("title", ColumnType::Str),
        ],
        ..Default::default()
    }
}

fn params(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap_or_default()
}

fn ids(docs: &[Document]) -> Vec<&str> {
    docs.iter().map(|d| d.id.as_str()).collect()
}

fn match_ids(doc: &Document) -> Vec<&str> {
    doc.matches.iter().map(|m| m.document.id.as_str()).collect()
}

fn plane_docs() -> Vec<Document> {
    vec![
        Document::with_id("a").embedding(vec![1.0, 0.0]).tag("kind", "widget"),
        Document::with_id("b").embedding(vec![2.0, 0.0]).tag("kind", "widget"),
        Document::with_id("c").embedding(vec![0.0, 1.0]).tag("kind", "gadget"),
        Document::with_id("d").embedding(vec![0.5, 0.5]).tag("kind", "gadget"),
        Document::with_id("e").embedding(vec![-1.0, 0.0]).tag("kind", "widget"),
    ]
}

fn priced_docs(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            Document::with_id(format!("doc-{i}"))
                .embedding(vec![i as f32])
                .tag("price", i as f64)
                .tag("kind", if i % 2 == 0 { "even" } else { "odd" })
        })
        .collect()
}

fn assert_non_increasing(doc: &Document) {
    for pair in doc.matches.windows(2) {
        assert!(pair[0].score >= pair[1].score, "scores out of order: {:?}", doc.matches);
    }
}

// ============================================================
// Construction
// ============================================================

#[tokio::test]
async fn test_open_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 2);
    cfg.n_dim = 0;
    assert!(matches!(IndexFacade::open(cfg).await, Err(IndexerError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_unsupported_host_is_connectivity_error() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 2);
    cfg.hosts = vec!["http://localhost:9200".into()];
    assert!(matches!(IndexFacade::open(cfg).await, Err(IndexerError::Connectivity(_))));
}

#[tokio::test]
async fn test_reopen_with_different_identity_fails() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 2)).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();
    facade.close().await.unwrap();

    let err = IndexFacade::open(config(&dir, 3)).await.err().unwrap();
    match err {
        IndexerError::ConfigMismatch { field, persisted, requested, .. } => {
            assert_eq!(field, "n_dim");
            assert_eq!(persisted, "2");
            assert_eq!(requested, "3");
        }
        e => panic!("unexpected error: {e}"),
    }

    let mut cfg = config(&dir, 2);
    cfg.distance = Metric::L2Norm;
    assert!(matches!(
        IndexFacade::open(cfg).await,
        Err(IndexerError::ConfigMismatch { field: "distance", .. })
    ));

    let mut cfg = config(&dir, 2);
    cfg.columns.push(ColumnDef::new("in_stock", ColumnType::Bool));
    assert!(matches!(
        IndexFacade::open(cfg).await,
        Err(IndexerError::ConfigMismatch { field: "columns", .. })
    ));

    // Same identity with columns declared in another order still attaches.
    let mut cfg = config(&dir, 2);
    cfg.columns.reverse();
    let facade = IndexFacade::open(cfg).await.unwrap();
    assert_eq!(facade.len().await.unwrap(), 5);
}

#[tokio::test]
async fn test_reopen_with_different_text_settings_fails() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
    facade.index(&[Document::with_id("t").tag("title", "hello world")]).await.unwrap();
    facade.close().await.unwrap();

    let mut cfg = config(&dir, 1);
    cfg.tag_indices = vec!["title".into()];
    assert!(matches!(
        IndexFacade::open(cfg).await,
        Err(IndexerError::ConfigMismatch { field: "tag_indices", .. })
    ));

    let mut cfg = config(&dir, 1);
    cfg.index_text = true;
    assert!(matches!(
        IndexFacade::open(cfg).await,
        Err(IndexerError::ConfigMismatch { field: "index_text", .. })
    ));
}

#[tokio::test]
async fn test_config_loaded_from_json() {
    let dir = TempDir::new().unwrap();
    let raw = json!({
        "hosts": [dir.path().display().to_string()],
        "n_dim": 2,
        "distance": "l2_norm",
        "index_name": "from_json",
        "columns": [["kind", "str"]],
        "match_args": {"limit": 1},
    });
    let cfg = IndexerConfig::from_json_str(&raw.to_string()).unwrap();
    let facade = IndexFacade::open(cfg).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();

    let mut q = vec![Document::new().embedding(vec![1.0, 0.0])];
    facade.search(&mut q, &Map::new()).await.unwrap();
    assert_eq!(match_ids(&q[0]), vec!["a"]);
}

// ============================================================
// Index / clear / delete
// ============================================================

#[tokio::test]
async fn test_index_overwrites_and_dedupes() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 2);
    cfg.batch_size = 2;
    let facade = IndexFacade::open(cfg).await.unwrap();

    let docs = vec![
        Document::with_id("x").embedding(vec![1.0, 0.0]).tag("price", 1.0),
        Document::with_id("y").embedding(vec![0.0, 1.0]),
        Document::with_id("x").embedding(vec![1.0, 1.0]).tag("price", 3.0),
    ];
    facade.index(&docs).await.unwrap();
    assert_eq!(facade.len().await.unwrap(), 2);
    let x = facade.get("x").await.unwrap().unwrap();
    assert_eq!(x.tags["price"].as_f64(), Some(3.0));
    assert_eq!(x.embedding, Some(vec![1.0, 1.0]));

    facade.index(&[]).await.unwrap();
    assert_eq!(facade.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_index_checks_whole_batch_before_writing() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 2);
    cfg.batch_size = 1;
    let facade = IndexFacade::open(cfg).await.unwrap();

    let docs = vec![
        Document::with_id("ok").embedding(vec![1.0, 0.0]),
        Document::with_id("bad").embedding(vec![1.0, 0.0, 0.0]),
    ];
    let err = facade.index(&docs).await.err().unwrap();
    assert!(matches!(err, IndexerError::DimensionMismatch { expected: 2, got: 3 }));
    assert!(facade.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_non_finite_values_rejected_before_write() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();

    let err = facade
        .index(&[
            Document::with_id("a").embedding(vec![1.0]).tag("price", f64::NAN),
            Document::with_id("b").embedding(vec![1.0]).tag("price", 3.0),
        ])
        .await
        .err()
        .unwrap();
    assert!(matches!(err, IndexerError::InvalidRequest(_)));
    assert!(facade.is_empty().await.unwrap());

    assert!(matches!(
        facade.index(&[Document::with_id("bad").embedding(vec![f32::NAN])]).await,
        Err(IndexerError::InvalidRequest(_))
    ));

    facade.index(&[Document::with_id("good").embedding(vec![1.0])]).await.unwrap();
    assert!(matches!(
        facade.update(&[Document::with_id("good").tag("price", f64::INFINITY)]).await,
        Err(IndexerError::InvalidRequest(_))
    ));

    let mut q = vec![Document::new().embedding(vec![f32::NAN])];
    assert!(matches!(
        facade.search(&mut q, &Map::new()).await,
        Err(IndexerError::InvalidRequest(_))
    ));

    let mut q = vec![Document::new().embedding(vec![1.0])];
    facade.search(&mut q, &Map::new()).await.unwrap();
    assert_eq!(match_ids(&q[0]), vec!["good"]);
    assert_non_increasing(&q[0]);

    facade.close().await.unwrap();
    let reopened = IndexFacade::open(config(&dir, 1)).await.unwrap();
    assert_eq!(reopened.len().await.unwrap(), 1);
    assert!(reopened.get("good").await.unwrap().unwrap().tags.is_empty());
}

#[tokio::test]
async fn test_documents_without_embedding_are_stored() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 2)).await.unwrap();
    facade.index(&[Document::with_id("plain").text("no vector here")]).await.unwrap();
    let doc = facade.get("plain").await.unwrap().unwrap();
    assert_eq!(doc.text_content(), Some("no vector here"));
    assert!(doc.embedding.is_none());
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 2)).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();

    facade.clear().await.unwrap();
    assert_eq!(facade.len().await.unwrap(), 0);
    facade.clear().await.unwrap();
    assert_eq!(facade.len().await.unwrap(), 0);

    facade.index(&plane_docs()[..2]).await.unwrap();
    assert_eq!(facade.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 2)).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();

    let p = params(json!({"ids": ["a", "c"]}));
    facade.delete(&p).await.unwrap();
    facade.delete(&p).await.unwrap();
    facade.delete(&params(json!({"ids": ["never-indexed"]}))).await.unwrap();
    facade.delete(&params(json!({"ids": []}))).await.unwrap();
    facade.delete(&Map::new()).await.unwrap();

    assert_eq!(ids(&facade.documents().await.unwrap()), vec!["b", "d", "e"]);
    assert!(matches!(
        facade.delete(&params(json!({"ids": "a"}))).await,
        Err(IndexerError::InvalidRequest(_))
    ));
}

// ============================================================
// Update
// ============================================================

#[tokio::test]
async fn test_update_skips_missing_ids() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 1);
    cfg.batch_size = 2;
    let facade = IndexFacade::open(cfg).await.unwrap();
    facade.index(&priced_docs(5)).await.unwrap();

    let updates = vec![
        Document::with_id("doc-0").embedding(vec![9.0]).tag("price", 100.0),
        Document::with_id("missing-1").embedding(vec![9.0]).tag("price", 100.0),
        Document::with_id("doc-3").embedding(vec![9.0]).tag("price", 100.0),
        Document::with_id("missing-2").tag("price", 100.0),
        Document::with_id("doc-4").tag("price", 100.0),
    ];
    let report = facade.update(&updates).await.unwrap();
    assert_eq!(report.updated, vec!["doc-0", "doc-3", "doc-4"]);
    assert_eq!(report.skipped, vec!["missing-1", "missing-2"]);
    assert!(!report.is_complete());
    assert_eq!(report.total(), 5);

    assert_eq!(facade.len().await.unwrap(), 5);
    assert!(facade.get("missing-1").await.unwrap().is_none());
    let doc0 = facade.get("doc-0").await.unwrap().unwrap();
    assert_eq!(doc0.tags["price"].as_f64(), Some(100.0));
    assert_eq!(doc0.embedding, Some(vec![9.0]));

    // Update replaces the whole document, embedding included.
    let doc4 = facade.get("doc-4").await.unwrap().unwrap();
    assert!(doc4.embedding.is_none());
    assert!(!doc4.tags.contains_key("kind"));
}

#[tokio::test]
async fn test_update_checks_dimensions() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 2)).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();
    let err = facade
        .update(&[Document::with_id("a").embedding(vec![1.0])])
        .await
        .err()
        .unwrap();
    assert!(matches!(err, IndexerError::DimensionMismatch { .. }));
    assert_eq!(facade.get("a").await.unwrap().unwrap().embedding, Some(vec![1.0, 0.0]));
}

// ============================================================
// Search
// ============================================================

async fn top_three(metric: Metric) -> (Vec<String>, Vec<f32>) {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 2);
    cfg.distance = metric;
    let facade = IndexFacade::open(cfg).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();

    let mut q = vec![Document::with_id("q").embedding(vec![1.0, 0.0])];
    facade.search(&mut q, &params(json!({"limit": 3}))).await.unwrap();
    assert_eq!(q[0].matches.len(), 3);
    assert_non_increasing(&q[0]);

    let mut all = vec![Document::with_id("q").embedding(vec![1.0, 0.0])];
    facade.search(&mut all, &Map::new()).await.unwrap();
    assert_eq!(all[0].matches.len(), 5);
    assert_non_increasing(&all[0]);

    (
        match_ids(&q[0]).into_iter().map(String::from).collect(),
        q[0].matches.iter().map(|m| m.score).collect(),
    )
}

#[tokio::test]
async fn test_search_cosine_ordering() {
    let (ids, scores) = top_three(Metric::Cosine).await;
    assert_eq!(ids, vec!["a", "b", "d"]);
    assert!((scores[0] - 1.0).abs() < 1e-6);
    assert!((scores[2] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
}

#[tokio::test]
async fn test_search_l2_ordering() {
    let (ids, scores) = top_three(Metric::L2Norm).await;
    assert_eq!(ids, vec!["a", "d", "b"]);
    assert!((scores[0] - 1.0).abs() < 1e-6);
    assert!((scores[2] - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn test_search_dot_product_ordering() {
    let (ids, scores) = top_three(Metric::DotProduct).await;
    assert_eq!(ids, vec!["b", "a", "d"]);
    assert!((scores[0] - 2.0).abs() < 1e-6);
    assert!((scores[1] - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_search_replaces_previous_matches_and_leaves_collection() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 2)).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();

    let mut q = vec![
        Document::with_id("q1").embedding(vec![1.0, 0.0]),
        Document::with_id("q2").embedding(vec![0.0, 1.0]),
    ];
    facade.search(&mut q, &params(json!({"limit": 1}))).await.unwrap();
    assert_eq!(match_ids(&q[0]), vec!["a"]);
    assert_eq!(match_ids(&q[1]), vec!["c"]);

    facade.search(&mut q, &params(json!({"limit": 2}))).await.unwrap();
    assert_eq!(q[0].matches.len(), 2);
    assert!(q[0].matches.iter().all(|m| m.document.matches.is_empty()));
    assert_eq!(facade.len().await.unwrap(), 5);
}

#[tokio::test]
async fn test_search_validates_queries() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 2)).await.unwrap();

    let mut q = vec![Document::with_id("no-vector")];
    assert!(matches!(
        facade.search(&mut q, &Map::new()).await,
        Err(IndexerError::InvalidRequest(_))
    ));

    let mut q = vec![Document::with_id("ok").embedding(vec![1.0, 0.0]), Document::new().embedding(vec![1.0])];
    assert!(matches!(
        facade.search(&mut q, &Map::new()).await,
        Err(IndexerError::DimensionMismatch { expected: 2, got: 1 })
    ));
    assert!(q[0].matches.is_empty());

    let mut q = vec![Document::new().embedding(vec![1.0, 0.0])];
    assert!(matches!(
        facade.search(&mut q, &params(json!({"limit": -1}))).await,
        Err(IndexerError::InvalidRequest(_))
    ));
    assert!(matches!(
        facade.search(&mut q, &params(json!({"filter": {"term": {"colour": "red"}}}))).await,
        Err(IndexerError::InvalidFilter(_))
    ));
}

#[tokio::test]
async fn test_search_with_filter_and_threshold() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 2)).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();

    let mut q = vec![Document::new().embedding(vec![1.0, 0.0])];
    facade
        .search(&mut q, &params(json!({"filter": {"term": {"kind": "gadget"}}})))
        .await
        .unwrap();
    assert_eq!(match_ids(&q[0]), vec!["d", "c"]);

    facade.search(&mut q, &params(json!({"score_threshold": 0.9}))).await.unwrap();
    assert_eq!(match_ids(&q[0]), vec!["a", "b"]);
    assert!(q[0].matches.iter().all(|m| m.score >= 0.9));
}

#[tokio::test]
async fn test_default_policy_merges_with_call_parameters() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 2);
    cfg.match_args = QueryPolicy {
        filter: Some(di_indexer::FilterExpr::term("kind", "widget")),
        limit: Some(2),
        score_threshold: None,
    };
    let facade = IndexFacade::open(cfg).await.unwrap();
    facade.index(&plane_docs()).await.unwrap();

    let mut q = vec![Document::new().embedding(vec![1.0, 0.0])];
    facade.search(&mut q, &Map::new()).await.unwrap();
    assert_eq!(match_ids(&q[0]), vec!["a", "b"]);

    // Per-call limit wins, default filter still applies.
    facade.search(&mut q, &params(json!({"limit": 10}))).await.unwrap();
    assert_eq!(match_ids(&q[0]), vec!["a", "b", "e"]);

    // Per-call filter wins, default limit still applies.
    facade
        .search(&mut q, &params(json!({"filter": {"term": {"kind": "gadget"}}})))
        .await
        .unwrap();
    assert_eq!(match_ids(&q[0]), vec!["d", "c"]);
}

// ============================================================
// Filter
// ============================================================

#[tokio::test]
async fn test_filter_price_range() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
    facade.index(&priced_docs(50)).await.unwrap();

    let found = facade
        .filter(&params(json!({"filter": {"range": {"price": {"gte": 30}}}})))
        .await
        .unwrap();
    assert_eq!(found.len(), 20);
    assert_eq!(found[0].id, "doc-30");
    assert_eq!(found[19].id, "doc-49");
    assert!(found.iter().all(|d| d.tags["price"].as_f64().unwrap() >= 30.0));

    let aliased = facade
        .filter(&params(json!({"query": {"range": {"price": {"gte": 30}}}})))
        .await
        .unwrap();
    assert_eq!(ids(&aliased), ids(&found));
}

#[tokio::test]
async fn test_filter_boolean_composites() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
    facade.index(&priced_docs(10)).await.unwrap();

    let found = facade
        .filter(&params(json!({"filter": {"and": [
            {"term": {"kind": "even"}},
            {"range": {"price": {"gt": 2, "lte": 8}}},
        ]}})))
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["doc-4", "doc-6", "doc-8"]);

    let found = facade
        .filter(&params(json!({"filter": {"bool": {
            "should": [{"term": {"price": 1.0}}, {"term": {"price": 9.0}}],
            "must_not": [{"term": {"kind": "even"}}],
        }}})))
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["doc-1", "doc-9"]);

    let found = facade
        .filter(&params(json!({"filter": {"not": {"range": {"price": {"lt": 8}}}}})))
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["doc-8", "doc-9"]);
}

#[tokio::test]
async fn test_filter_rejects_bad_expressions() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
    facade.index(&priced_docs(3)).await.unwrap();

    for bad in [
        json!({"filter": {"term": {"colour": "red"}}}),
        json!({"filter": {"range": {"kind": {"gte": 1}}}}),
        json!({"filter": {"match": {"price": "cheap"}}}),
        json!({"filter": {"term": {"kind": "x"}, "range": {"price": {"gt": 1}}}}),
        json!({"filter": {"text": {"query": "anything"}}}),
    ] {
        assert!(
            matches!(facade.filter(&params(bad.clone())).await, Err(IndexerError::InvalidFilter(_))),
            "accepted {bad}"
        );
    }
    assert!(matches!(facade.filter(&Map::new()).await, Err(IndexerError::InvalidRequest(_))));
    assert_eq!(facade.len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_text_and_match_filters() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 1);
    cfg.index_text = true;
    cfg.tag_indices = vec!["title".into()];
    let facade = IndexFacade::open(cfg).await.unwrap();
    facade
        .index(&[
            Document::with_id("1").text("The quick brown fox").tag("title", "Animals"),
            Document::with_id("2").text("Lazy dogs sleep").tag("title", "Quick notes"),
            Document::with_id("3").text("Nothing to see").tag("title", "Misc"),
        ])
        .await
        .unwrap();

    let found = facade.filter(&params(json!({"filter": {"text": {"query": "quick"}}}))).await.unwrap();
    assert_eq!(ids(&found), vec!["1", "2"]);

    let found = facade
        .filter(&params(json!({"filter": {"match": {"title": "NOTES quick"}}})))
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["2"]);
}

// ============================================================
// Fill embedding
// ============================================================

#[tokio::test]
async fn test_fill_embedding_round_trip() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
    facade.index(&[Document::with_id("x").embedding(vec![1.0])]).await.unwrap();

    let mut docs = vec![Document::with_id("x")];
    facade.fill_embedding(&mut docs).await.unwrap();
    assert_eq!(docs[0].embedding, Some(vec![1.0]));
}

#[tokio::test]
async fn test_fill_embedding_stops_at_first_unknown_id() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
    facade.index(&priced_docs(3)).await.unwrap();

    let mut docs = vec![Document::with_id("doc-1"), Document::with_id("ghost"), Document::with_id("doc-2")];
    match facade.fill_embedding(&mut docs).await {
        Err(IndexerError::NotFound { id }) => assert_eq!(id, "ghost"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(docs[0].embedding, Some(vec![1.0]));
    assert!(docs[2].embedding.is_none());
}

// ============================================================
// Persistence and replicas
// ============================================================

#[tokio::test]
async fn test_persistence_by_identity() {
    let dir = TempDir::new().unwrap();
    {
        let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
        facade.index(&priced_docs(7)).await.unwrap();
        facade.close().await.unwrap();
    }
    {
        let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
        assert_eq!(facade.len().await.unwrap(), 7);
        facade.delete(&params(json!({"ids": ["doc-0"]}))).await.unwrap();
        // Dropped without close: the guard releases the handle.
    }
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();
    assert_eq!(facade.len().await.unwrap(), 6);
    assert!(facade.get("doc-0").await.unwrap().is_none());

    let mut other = config(&dir, 1);
    other.index_name = "other".into();
    let fresh = IndexFacade::open(other).await.unwrap();
    assert!(fresh.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_replicas_agree() {
    let dir = TempDir::new().unwrap();
    let primary = IndexFacade::open(config(&dir, 2)).await.unwrap();
    let replica = IndexFacade::open(config(&dir, 2)).await.unwrap();
    primary.index(&plane_docs()).await.unwrap();

    let p = params(json!({"limit": 4}));
    let mut a = vec![Document::with_id("q").embedding(vec![0.3, 0.7])];
    let mut b = a.clone();
    primary.search(&mut a, &p).await.unwrap();
    replica.search(&mut b, &p).await.unwrap();
    assert_eq!(a, b);

    replica.delete(&params(json!({"ids": ["a"]}))).await.unwrap();
    assert_eq!(primary.len().await.unwrap(), 4);
    assert_eq!(primary.documents().await.unwrap(), replica.documents().await.unwrap());
}

// ============================================================
// Concurrency
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_search_sees_whole_chunks() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(&dir, 1);
    cfg.batch_size = 10;
    let facade = Arc::new(IndexFacade::open(cfg).await.unwrap());

    let writer = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.index(&priced_docs(200)).await })
    };
    let reader = {
        let facade = facade.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..50 {
                let mut q = vec![Document::new().embedding(vec![0.0])];
                facade.search(&mut q, &Map::new()).await?;
                seen.push(q[0].matches.len());
                tokio::task::yield_now().await;
            }
            Ok::<_, IndexerError>(seen)
        })
    };
    writer.await.unwrap().unwrap();
    let seen = reader.await.unwrap().unwrap();
    assert!(seen.iter().all(|n| n % 10 == 0), "partial chunk observed: {seen:?}");
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(facade.len().await.unwrap(), 200);
}

// ============================================================
// Dispatch
// ============================================================

#[tokio::test]
async fn test_dispatch_routes_every_operation() {
    let dir = TempDir::new().unwrap();
    let facade = IndexFacade::open(config(&dir, 1)).await.unwrap();

    let resp = facade.dispatch(Request::new("/index").docs(priced_docs(5))).await.unwrap();
    assert_eq!(resp, Response::Empty);

    let resp = facade
        .dispatch(Request::new("search").docs(vec![Document::new().embedding(vec![4.0])]).param("limit", 2))
        .await
        .unwrap();
    let queries = resp.into_documents().unwrap();
    assert_eq!(queries[0].matches.len(), 2);

    let resp = facade
        .dispatch(Request::new("/update").docs(vec![Document::with_id("doc-1"), Document::with_id("nope")]))
        .await
        .unwrap();
    match resp {
        Response::Updated(report) => assert_eq!(report.skipped, vec!["nope"]),
        other => panic!("unexpected response {other:?}"),
    }

    let resp = facade
        .dispatch(Request::new("/filter").param("filter", json!({"term": {"kind": "even"}})))
        .await
        .unwrap();
    assert_eq!(ids(resp.documents().unwrap()), vec!["doc-0", "doc-2", "doc-4"]);

    let resp = facade
        .dispatch(Request::new(Operation::FillEmbedding.endpoint()).docs(vec![Document::with_id("doc-3")]))
        .await
        .unwrap();
    assert_eq!(resp.documents().unwrap()[0].embedding, Some(vec![3.0]));

    facade
        .dispatch(Request::new("/delete").param("ids", json!(["doc-0"])))
        .await
        .unwrap();
    assert_eq!(facade.len().await.unwrap(), 4);

    facade.dispatch(Request::new("clear")).await.unwrap();
    assert_eq!(facade.len().await.unwrap(), 0);

    assert!(matches!(
        facade.dispatch(Request::new("/reindex")).await,
        Err(IndexerError::InvalidRequest(_))
    ));
}
