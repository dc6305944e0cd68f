use serde_json::{Value, json};
use sleuth_web::exa::{ExaSearch, QueryInput, SearchError, SearchParams};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn exa_for(server: &MockServer) -> ExaSearch {
    ExaSearch::with_base(&format!("{}/", server.uri()), Some("exa-key".into())).unwrap()
}

fn hits(urls: &[&str]) -> Value {
    json!({
        "requestId": "req-1",
        "resolvedSearchType": "neural",
        "results": urls.iter().enumerate().map(|(i, u)| json!({
            "id": u,
            "url": u,
            "title": format!("Result {i}"),
            "score": 0.5,
            "publishedDate": "2025-01-02T00:00:00.000Z",
            "author": "Ada",
            "text": "body text"
        })).collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn invalid_params_never_reach_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(&[])))
        .expect(0)
        .mount(&server)
        .await;

    let exa = exa_for(&server);
    let cases = [
        ("", SearchParams::default()),
        (
            "rust",
            SearchParams {
                num_results: 0,
                ..SearchParams::default()
            },
        ),
        (
            "rust",
            SearchParams {
                num_results: 101,
                ..SearchParams::default()
            },
        ),
        (
            "rust",
            SearchParams {
                subpages: 6,
                ..SearchParams::default()
            },
        ),
    ];

    for (query, params) in cases {
        let err = exa.search(query, &params).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidParams(_)), "{err}");
    }

    let err = exa
        .search_any(&QueryInput::Many(vec![]), &SearchParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidParams(_)));

    let too_many = SearchParams {
        num_results: 500,
        ..SearchParams::default()
    };
    let batch = QueryInput::from(vec!["a".to_string(), "b".to_string()]);
    let err = exa.search_any(&batch, &too_many).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidParams(_)), "{err}");
    assert!(exa.multi_search(&["a".to_string()], &too_many).await.is_empty());
}

#[tokio::test]
async fn search_sends_key_and_maps_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("x-api-key", "exa-key"))
        .and(body_partial_json(json!({
            "query": "grid batteries",
            "type": "auto",
            "numResults": 2,
            "contents": { "text": true }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "url": "https://a.test", "title": "A", "score": 0.9, "author": "Ada" },
                { "url": "https://b.test" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = SearchParams {
        num_results: 2,
        ..SearchParams::default()
    };
    let results = exa_for(&server).search(" grid batteries ", &params).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].title, "A");
    assert_eq!(results[0].author.as_deref(), Some("Ada"));
    assert_eq!(results[1].title, "No title");
    assert_eq!(results[1].score, 0.0);
    assert!(results[1].published_date.is_none());
}

#[tokio::test]
async fn api_failure_is_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "bad key" })))
        .mount(&server)
        .await;

    let err = exa_for(&server)
        .search("rust", &SearchParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Api(_)));
    assert!(err.to_string().starts_with("EXA search failed"));
}

#[tokio::test]
async fn multi_search_flattens_and_skips_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "query": "first" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(&["https://1.test", "https://2.test"])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "query": "broken" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "bad query" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "query": "third" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(&["https://3.test"])))
        .mount(&server)
        .await;

    let exa = exa_for(&server);
    let queries = vec!["first".to_string(), "broken".to_string(), "third".to_string()];
    let results = exa.multi_search(&queries, &SearchParams::default()).await;

    let urls: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, vec!["https://1.test", "https://2.test", "https://3.test"]);

    assert!(exa.multi_search(&[], &SearchParams::default()).await.is_empty());
}

#[tokio::test]
async fn search_any_routes_by_input_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits(&["https://x.test"])))
        .expect(3)
        .mount(&server)
        .await;

    let exa = exa_for(&server);
    let one = exa
        .search_any(&QueryInput::from("solo"), &SearchParams::default())
        .await
        .unwrap();
    assert_eq!(one.len(), 1);

    let many = exa
        .search_any(
            &QueryInput::from(vec!["a".to_string(), "b".to_string()]),
            &SearchParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(many.len(), 2);
}

#[test]
fn missing_key_is_reported() {
    temp_env::with_var_unset("EXA_API_KEY", || {
        let err = ExaSearch::new(None).err().expect("no key available");
        assert_eq!(
            err.to_string(),
            "EXA API key must be provided or set in EXA_API_KEY environment variable"
        );
        assert!(ExaSearch::new(Some("  ".into())).is_err());
    });
}
