//! Integration tests for robots.txt retrieval over HTTP

use page_fetcher::robots::{HttpRobotsSource, RobotsFetch, RobotsGate, RobotsSource};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_AGENT: &str = "OttoBot/1.0 (+https://example.com/bot)";

fn source() -> HttpRobotsSource {
    HttpRobotsSource::new(USER_AGENT, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_found_robots_body_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin\n"))
        .mount(&server)
        .await;

    assert_eq!(
        source().fetch(&server.uri()).await,
        RobotsFetch::Found("User-agent: *\nDisallow: /admin\n".to_string())
    );
}

#[tokio::test]
async fn test_missing_robots_is_unavailable() {
    let server = MockServer::start().await;

    assert_eq!(
        source().fetch(&server.uri()).await,
        RobotsFetch::Unavailable("HTTP 404".to_string())
    );
}

#[tokio::test]
async fn test_gate_honours_agent_specific_group() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: OttoBot\nDisallow: /listings\n\nUser-agent: *\nDisallow:\n",
        ))
        .mount(&server)
        .await;

    let gate = RobotsGate::new(Arc::new(source()), USER_AGENT, Duration::from_secs(3600));
    let listing = Url::parse(&format!("{}/listings/42", server.uri())).unwrap();
    let about = Url::parse(&format!("{}/about", server.uri())).unwrap();

    assert!(!gate.is_allowed(&listing).await);
    assert!(gate.is_allowed(&about).await);
    assert_eq!(gate.cached_domains().await, 1);
}

#[tokio::test]
async fn test_unreachable_site_allows() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let gate = RobotsGate::new(Arc::new(source()), USER_AGENT, Duration::from_secs(3600));
    let url = Url::parse(&format!("http://127.0.0.1:{}/page", port)).unwrap();

    assert!(gate.is_allowed(&url).await);
    assert_eq!(gate.cached_domains().await, 0);
}
