use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use searchbridge::crawler::{
    BrowserSettings, HttpPageExtractor, PageExtractor, RemoteCrawlerExtractor, RunConfig,
};
use searchbridge::data_models::Depth;
use searchbridge::error::CrawlError;
use searchbridge::http::build_client;

mod test_helpers {
    use super::*;

    pub const ARTICLE: &str = r#"<html lang="en"><head>
        <title>Field Guide</title>
        <meta name="description" content="A guide to the field">
        <meta property="og:title" content="Field Guide (OG)">
        </head><body>
        <nav>Site navigation links</nav>
        <h1>Guide</h1>
        <p>Short bit</p>
        <p>This paragraph carries enough words to survive pruning because it keeps going for quite a while longer.</p>
        <img src="/img/a.png" alt="diagram">
        <img src="data:image/png;base64,AAAA" alt="inline">
        <iframe src="/frame"></iframe>
        </body></html>"#;

    pub const FRAME: &str = r#"<html><body>
        <p>Embedded frame paragraph with plenty of words so that it is kept after pruning runs over it.</p>
        </body></html>"#;

    pub fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
    }

    pub async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
    }

    pub fn http_extractor() -> HttpPageExtractor {
        HttpPageExtractor::new(build_client("TestBot/1.0", None).unwrap())
    }

    pub fn remote_extractor(server: &MockServer) -> RemoteCrawlerExtractor {
        RemoteCrawlerExtractor::new(
            build_client("TestBot/1.0", None).unwrap(),
            &format!("{}/", server.uri()),
            BrowserSettings {
                headless: true,
                user_agent: "TestBot/1.0".to_string(),
                ..Default::default()
            },
        )
    }

    pub fn basic() -> RunConfig {
        RunConfig::for_depth(Depth::Basic, Duration::from_secs(5))
    }

    pub fn advanced() -> RunConfig {
        RunConfig::for_depth(Depth::Advanced, Duration::from_secs(5))
    }
}

use test_helpers::*;

mod http_extractor {
    use super::*;

    #[tokio::test]
    async fn test_page_metadata_images_and_markdown() {
        let server = MockServer::start().await;
        serve(&server, "/article", html(ARTICLE)).await;
        let url = format!("{}/article", server.uri());

        let output = http_extractor().crawl(&url, &basic()).await.unwrap();

        assert!(output.success);
        assert_eq!(output.url, url);
        assert_eq!(output.status_code, Some(200));
        assert_eq!(output.error_message, None);

        let metadata = output.metadata.unwrap();
        assert_eq!(metadata["title"], json!("Field Guide"));
        assert_eq!(metadata["description"], json!("A guide to the field"));
        assert_eq!(metadata["og:title"], json!("Field Guide (OG)"));

        let images = output.media.unwrap().images;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["src"], json!(format!("{}/img/a.png", server.uri())));
        assert_eq!(images[0]["alt"], json!("diagram"));

        let markdown = output.markdown.unwrap();
        let raw = markdown.raw.unwrap();
        let fit = markdown.fit.unwrap();
        assert!(raw.contains("Short bit"));
        assert!(!raw.contains("Site navigation"));
        assert!(fit.contains("enough words to survive pruning"));
        assert!(!fit.contains("Short bit"));
        assert!(output.html.unwrap().contains("<nav>"));
        assert!(!output.cleaned_html.unwrap().contains("<nav>"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/gone",
            ResponseTemplate::new(404).set_body_string("not here"),
        )
        .await;
        let url = format!("{}/gone", server.uri());

        let output = http_extractor().crawl(&url, &basic()).await.unwrap();

        assert!(!output.success);
        assert_eq!(output.error_message.as_deref(), Some("http_error_404"));
        assert_eq!(output.status_code, Some(404));
        assert!(output.markdown.is_none());
        assert!(output.response_headers.is_some());
    }

    #[tokio::test]
    async fn test_advanced_depth_appends_iframe_text() {
        let server = MockServer::start().await;
        serve(&server, "/article", html(ARTICLE)).await;
        serve(&server, "/frame", html(FRAME)).await;
        let url = format!("{}/article", server.uri());

        let output = http_extractor().crawl(&url, &advanced()).await.unwrap();

        let raw = output.markdown.unwrap().raw.unwrap();
        assert!(raw.contains("Embedded frame paragraph"));
        let article = raw.find("enough words to survive").unwrap();
        let frame = raw.find("Embedded frame paragraph").unwrap();
        assert!(frame > article);
    }

    #[tokio::test]
    async fn test_basic_depth_skips_iframes() {
        let server = MockServer::start().await;
        serve(&server, "/article", html(ARTICLE)).await;
        Mock::given(method("GET"))
            .and(path("/frame"))
            .respond_with(html(FRAME))
            .expect(0)
            .mount(&server)
            .await;
        let url = format!("{}/article", server.uri());

        let output = http_extractor().crawl(&url, &basic()).await.unwrap();
        assert!(!output.markdown.unwrap().raw.unwrap().contains("Embedded frame"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_an_error() {
        let err = http_extractor().crawl("not a url", &basic()).await.unwrap_err();
        assert!(matches!(err, CrawlError::Url(_)));
    }
}

mod remote_extractor {
    use super::*;

    #[tokio::test]
    async fn test_request_body_and_object_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl"))
            .and(body_partial_json(json!({
                "urls": ["https://a.test/post"],
                "browser_config": {
                    "type": "BrowserConfig",
                    "params": {"headless": true, "user_agent": "TestBot/1.0"}
                },
                "crawler_config": {
                    "type": "CrawlerRunConfig",
                    "params": {
                        "cache_mode": "bypass",
                        "process_iframes": true,
                        "page_timeout": 5000,
                        "markdown_generator": {
                            "params": {
                                "content_filter": {
                                    "type": "PruningContentFilter",
                                    "params": {"threshold": 0.5, "min_word_threshold": 12}
                                }
                            }
                        }
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "success": true,
                    "markdown": {"raw_markdown": "raw body", "fit_markdown": "fit body"},
                    "metadata": {"title": "Remote title"},
                    "status_code": 200
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = remote_extractor(&server)
            .crawl("https://a.test/post", &advanced())
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.url, "https://a.test/post");
        let markdown = output.markdown.unwrap();
        assert_eq!(markdown.fit.as_deref(), Some("fit body"));
        assert_eq!(markdown.raw.as_deref(), Some("raw body"));
        assert_eq!(output.metadata.unwrap()["title"], json!("Remote title"));
        assert_eq!(output.status_code, Some(200));
    }

    #[tokio::test]
    async fn test_reported_failure_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "url": "https://a.test/blocked",
                    "success": false,
                    "markdown": "",
                    "error_message": "net::ERR_BLOCKED_BY_CLIENT"
                }]
            })))
            .mount(&server)
            .await;

        let output = remote_extractor(&server)
            .crawl("https://a.test/blocked", &basic())
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(
            output.error_message.as_deref(),
            Some("net::ERR_BLOCKED_BY_CLIENT")
        );
    }

    #[tokio::test]
    async fn test_empty_results_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let err = remote_extractor(&server)
            .crawl("https://a.test/post", &basic())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::EmptyResponse(url) if url == "https://a.test/post"));
    }

    #[tokio::test]
    async fn test_service_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = remote_extractor(&server)
            .crawl("https://a.test/post", &basic())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Request(_)));
    }
}
