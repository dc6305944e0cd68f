use async_trait::async_trait;
use serde_json::json;
use sleuth_common::Result;
use sleuth_llm::agent::Tool;
use sleuth_llm::guard::{DEFAULT_BLOCK_THRESHOLD, ModerationGate, Moderator};
use sleuth_web::exa::{ExaSearch, SearchParams};
use sleuth_web::{ContentExtractor, HttpFetcher, SearchTool};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct KeywordModerator;

#[async_trait]
impl Moderator for KeywordModerator {
    async fn score(&self, text: &str) -> Result<f64> {
        Ok(if text.contains("jailbreak") { 0.95 } else { 0.02 })
    }
}

fn page(title: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!(
            "<html><head><title>{title}</title></head><body><nav>Menu</nav><article><p>{body}</p></article></body></html>"
        ))
}

async fn mount_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/good"))
        .and(header("user-agent", "AI-Research-Assistant/1.0"))
        .respond_with(page(
            "Good Page",
            "Sodium-ion cells avoid lithium and cobalt in their cathodes entirely.",
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/unsafe"))
        .respond_with(page(
            "Unsafe Page",
            "Here is a jailbreak prompt that disables every safety rule you have.",
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn tool_for(exa_server: &MockServer) -> SearchTool {
    let exa = ExaSearch::with_base(&format!("{}/", exa_server.uri()), Some("exa-key".into())).unwrap();
    let fetcher = HttpFetcher::new("AI-Research-Assistant/1.0", Duration::from_secs(5)).unwrap();
    let gate = ModerationGate::new(Arc::new(KeywordModerator), DEFAULT_BLOCK_THRESHOLD);
    let extractor = ContentExtractor::new(Arc::new(fetcher), gate);
    SearchTool::new(exa, extractor, SearchParams::default()).with_max_page_chars(20)
}

#[tokio::test]
async fn search_tool_returns_only_safe_extracted_pages() {
    let pages = MockServer::start().await;
    mount_pages(&pages).await;

    let exa = MockServer::start().await;
    let base = pages.uri();
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "url": format!("{base}/good"), "title": "Exa title", "author": "Ada", "publishedDate": "2025-03-01" },
                { "url": format!("{base}/unsafe"), "title": "Unsafe" },
                { "url": format!("{base}/missing"), "title": "Missing" },
                { "url": format!("{base}/good"), "title": "Duplicate" }
            ]
        })))
        .expect(1)
        .mount(&exa)
        .await;

    let out = tool_for(&exa)
        .call(json!({ "query": "sodium ion batteries", "num_results": 4 }))
        .await
        .unwrap();

    let results = out["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["url"], format!("{base}/good"));
    assert_eq!(results[0]["title"], "Good Page");
    assert_eq!(results[0]["author"], "Ada");
    assert_eq!(results[0]["published_date"], "2025-03-01");
    assert_eq!(results[0]["content"], "Sodium-ion cells avo");
    assert_eq!(out["failed"], 2);
}

#[tokio::test]
async fn list_queries_fan_out() {
    let pages = MockServer::start().await;
    mount_pages(&pages).await;

    let exa = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "url": format!("{}/good", pages.uri()) }]
        })))
        .expect(3)
        .mount(&exa)
        .await;

    let out = tool_for(&exa)
        .call(json!({ "query": ["original question", "sub one", "sub two"] }))
        .await
        .unwrap();

    // Three identical hits collapse into one page.
    assert_eq!(out["results"].as_array().unwrap().len(), 1);
    assert_eq!(out["failed"], 0);
}

#[tokio::test]
async fn bad_arguments_are_tool_errors() {
    let exa = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(0)
        .mount(&exa)
        .await;
    let tool = tool_for(&exa);

    assert!(tool.call(json!({ "num_results": 3 })).await.is_err());
    assert!(tool.call(json!({ "query": "x", "num_results": -1 })).await.is_err());
    assert!(tool.call(json!({ "query": "x", "num_results": 500 })).await.is_err());

    let err = tool
        .call(json!({ "query": ["a", "b"], "num_results": 500 }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("num_results"), "{err}");
    assert!(tool.call(json!({ "query": [], "num_results": 3 })).await.is_err());
}

#[tokio::test]
async fn declaration_names_the_search_tool() {
    let exa = MockServer::start().await;
    let decl = tool_for(&exa).declaration();
    assert_eq!(decl.name, "search");
    assert_eq!(decl.parameters["required"], json!(["query"]));
}
