// topsite-scan-lib/tests/integration.rs

//! Integration tests for the ranking fetch, the scanner and the full pipeline,
//! run against local mock servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use topsite_scan_lib::{
    ConcurrentScanner, Credentials, RankingClient, RankingConfig, ScanConfig, ScanError,
    ScanOutcome, SiteAnalyzer,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOMEPAGE: &str = r#"<html><head><title>Mock home</title></head>
<body><h1>Welcome home</h1><p>Four words right here</p><script>var x = 1;</script></body></html>"#;

const AUTH_ERROR: &str = r#"<?xml version="1.0"?>
<Response><Errors><Error><Code>InvalidClientTokenId</Code><Message>The security token included in the request is invalid</Message></Error></Errors></Response>"#;

/// `host:port` of a mock server, usable as a domain.
fn host_of(server: &MockServer) -> String {
    server.address().to_string()
}

fn ranking_xml(domains: &[String], first_rank: u32) -> String {
    let sites: String = domains
        .iter()
        .enumerate()
        .map(|(idx, domain)| {
            format!(
                "<aws:Site><aws:DataUrl type=\"canonical\">{}</aws:DataUrl>\
                 <aws:Country><aws:Rank>{}</aws:Rank></aws:Country></aws:Site>",
                domain,
                first_rank + idx as u32
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\"?>\
         <aws:TopSitesResponse xmlns:aws=\"http://ats.amazonaws.com/doc/2005-11-21\">\
         <aws:Response><aws:TopSitesResult><aws:Alexa><aws:TopSites><aws:List>\
         <aws:Sites>{}</aws:Sites></aws:List></aws:TopSites></aws:Alexa>\
         </aws:TopSitesResult></aws:Response></aws:TopSitesResponse>",
        sites
    )
}

async fn html_server(delay: Option<Duration>) -> MockServer {
    let server = MockServer::start().await;
    let mut response =
        ResponseTemplate::new(200).set_body_raw(HOMEPAGE, "text/html; charset=utf-8");
    if let Some(delay) = delay {
        response = response.set_delay(delay);
    }
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(response)
        .mount(&server)
        .await;
    server
}

async fn ranking_server(domains: &[String]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("Action", "TopSites"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ranking_xml(domains, 1), "text/xml"))
        .mount(&server)
        .await;
    server
}

/// A local port with nothing listening on it.
fn closed_port_host() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

fn fast_scanner(concurrency: usize, timeout: Duration) -> ConcurrentScanner {
    ConcurrentScanner::new(
        ScanConfig::default()
            .with_concurrency(concurrency)
            .with_timeout(timeout),
    )
    .unwrap()
}

#[tokio::test]
async fn test_success_and_timeout_side_by_side() {
    let fast = html_server(None).await;
    let slow = html_server(Some(Duration::from_secs(3))).await;
    let domains = vec![host_of(&fast), host_of(&slow)];

    let results = fast_scanner(10, Duration::from_millis(400))
        .scan(&domains)
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].domain, domains[0]);
    assert_eq!(results[0].outcome, ScanOutcome::Success);
    assert_eq!(results[0].status_code, Some(200));
    assert_eq!(results[0].header("content-type").map(|v| v.starts_with("text/html")), Some(true));
    assert_eq!(results[0].word_count, Some(6));

    assert_eq!(results[1].domain, domains[1]);
    assert_eq!(results[1].outcome, ScanOutcome::Timeout);
    assert_eq!(results[1].status_code, None);
}

#[tokio::test]
async fn test_one_result_per_domain_when_everything_fails() {
    let domains = vec![
        closed_port_host(),
        closed_port_host(),
        "bad host".to_string(),
        closed_port_host(),
    ];

    let results = fast_scanner(2, Duration::from_secs(2)).scan(&domains).await;

    assert_eq!(results.len(), domains.len());
    for (result, domain) in results.iter().zip(&domains) {
        assert_eq!(&result.domain, domain);
        assert!(!result.is_success());
        assert_eq!(result.status_code, None);
        assert!(result.error_message.is_some());
    }
}

#[tokio::test]
async fn test_timeout_never_reported_as_success() {
    let slow = html_server(Some(Duration::from_secs(2))).await;
    let domains = vec![host_of(&slow); 3];

    let results = fast_scanner(3, Duration::from_millis(200)).scan(&domains).await;

    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.outcome, ScanOutcome::Timeout);
        assert!(result.elapsed >= Duration::from_millis(200));
    }
}

#[tokio::test]
async fn test_invalid_utf8_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            vec![b'<', b'p', b'>', 0xff, 0xfe, 0xfd, b'<', b'/', b'p', b'>'],
            "text/html; charset=utf-8",
        ))
        .mount(&server)
        .await;

    let result = fast_scanner(1, Duration::from_secs(2))
        .scan_one(&host_of(&server))
        .await;

    assert_eq!(result.outcome, ScanOutcome::DecodeError);
    assert_eq!(result.status_code, None);
    assert_eq!(result.encoding.as_deref(), Some("utf-8"));
    assert!(!result.headers.is_empty());
}

#[tokio::test]
async fn test_error_status_still_counts_as_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_raw("down", "text/plain"))
        .mount(&server)
        .await;

    let result = fast_scanner(1, Duration::from_secs(2))
        .scan_one(&host_of(&server))
        .await;

    assert_eq!(result.outcome, ScanOutcome::Success);
    assert_eq!(result.status_code, Some(503));
    assert_eq!(result.word_count, None);
}

#[tokio::test]
async fn test_repeated_scans_agree() {
    let ok = html_server(None).await;
    let domains = vec![host_of(&ok), closed_port_host(), host_of(&ok)];
    let scanner = fast_scanner(3, Duration::from_secs(2));

    let first = scanner.scan(&domains).await;
    let second = scanner.scan(&domains).await;

    let summary = |results: &[topsite_scan_lib::ScanResult]| {
        results
            .iter()
            .map(|r| (r.domain.clone(), r.outcome, r.status_code))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&first), summary(&second));
}

#[tokio::test]
async fn test_overlapping_requests_sum_exceeds_wall_clock() {
    let slow = html_server(Some(Duration::from_millis(300))).await;
    let entries: Vec<topsite_scan_lib::SiteRankEntry> = (1..=4)
        .map(|rank| topsite_scan_lib::SiteRankEntry {
            domain: host_of(&slow),
            rank,
        })
        .collect();

    let analyzer = SiteAnalyzer::with_parts(
        Credentials::new("key", "secret"),
        RankingClient::new(RankingConfig::default()).unwrap(),
        fast_scanner(4, Duration::from_secs(5)),
    );
    let report = analyzer.scan_entries(&entries, 20).await;

    assert_eq!(report.success_count, 4);
    assert!(report.sum_elapsed > report.wall_clock);
    assert!(report.effective_parallelism().unwrap() > 1.0);
    let ranks: Vec<Option<u32>> = report.results.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![Some(1), Some(2), Some(3), Some(4)]);
}

/// A homepage server that tracks how many requests it is serving at once.
///
/// The count drops before the response is written, so a request is only
/// counted while the client is still waiting on it.
async fn counting_server(hold: Duration) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let max = Arc::clone(&max_in_flight);

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);

                let body = "<html><body><p>counted</p></body></html>";
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (host, max)
}

#[tokio::test]
async fn test_in_flight_requests_never_exceed_concurrency() {
    let (host, max_in_flight) = counting_server(Duration::from_millis(100)).await;
    let domains = vec![host; 12];

    let results = fast_scanner(3, Duration::from_secs(5)).scan(&domains).await;

    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r.is_success()));
    let max = max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "{} requests were in flight at once", max);
    assert!(max >= 2);
}

#[tokio::test]
async fn test_corrupt_gzip_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_raw(b"definitely not gzip data".to_vec(), "text/html"),
        )
        .mount(&server)
        .await;

    let result = fast_scanner(1, Duration::from_secs(2))
        .scan_one(&host_of(&server))
        .await;

    assert_eq!(result.outcome, ScanOutcome::DecodeError);
    assert_eq!(result.status_code, None);
    assert!(result.error_message.is_some());
}

#[tokio::test]
async fn test_ranking_fetch_parses_sites() {
    let domains = vec!["alpha.example".to_string(), "beta.example".to_string()];
    let server = ranking_server(&domains).await;

    let client = RankingClient::new(
        RankingConfig::default()
            .with_count(2)
            .with_endpoint(format!("{}/", server.uri())),
    )
    .unwrap();
    let entries = client
        .fetch_top_sites(&Credentials::new("AKIDEXAMPLE", "secret"))
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].domain, "alpha.example");
    assert_eq!(entries[0].rank, 1);
    assert_eq!(entries[1].domain, "beta.example");
    assert_eq!(entries[1].rank, 2);
}

#[tokio::test]
async fn test_ranking_requests_are_signed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("AWSAccessKeyId", "AKIDEXAMPLE"))
        .and(query_param("SignatureMethod", "HmacSHA256"))
        .and(query_param("SignatureVersion", "2"))
        .and(query_param("CountryCode", "US"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(ranking_xml(&["signed.example".to_string()], 1), "text/xml"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = RankingClient::new(
        RankingConfig::default()
            .with_count(1)
            .with_endpoint(server.uri()),
    )
    .unwrap();
    let entries = client
        .fetch_top_sites(&Credentials::new("AKIDEXAMPLE", "secret"))
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].url.query().unwrap_or("").contains("Signature="));
}

#[tokio::test]
async fn test_ranking_fetch_pages_through_large_counts() {
    let server = MockServer::start().await;
    let first_page: Vec<String> = (1..=100).map(|i| format!("site{}.example", i)).collect();
    let second_page: Vec<String> = (101..=150).map(|i| format!("site{}.example", i)).collect();

    Mock::given(method("GET"))
        .and(query_param("Start", "1"))
        .and(query_param("Count", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ranking_xml(&first_page, 1), "text/xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("Start", "101"))
        .and(query_param("Count", "50"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(ranking_xml(&second_page, 101), "text/xml"),
        )
        .mount(&server)
        .await;

    let client = RankingClient::new(
        RankingConfig::default()
            .with_count(150)
            .with_endpoint(server.uri()),
    )
    .unwrap();
    let entries = client
        .fetch_top_sites(&Credentials::new("key", "secret"))
        .await
        .unwrap();

    assert_eq!(entries.len(), 150);
    assert_eq!(entries[0].domain, "site1.example");
    assert_eq!(entries[149].domain, "site150.example");
    assert_eq!(entries[149].rank, 150);
}

#[tokio::test]
async fn test_rejected_credentials_are_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_raw(AUTH_ERROR, "text/xml"))
        .mount(&server)
        .await;

    let client = RankingClient::new(RankingConfig::default().with_endpoint(server.uri())).unwrap();
    let err = client
        .fetch_top_sites(&Credentials::new("wrong", "credentials"))
        .await
        .unwrap_err();

    assert!(err.is_authentication());
    assert!(err.to_string().contains("InvalidClientTokenId"));
}

#[tokio::test]
async fn test_malformed_ranking_response_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>maintenance</html>", "text/html"))
        .mount(&server)
        .await;

    let client = RankingClient::new(RankingConfig::default().with_endpoint(server.uri())).unwrap();
    let err = client
        .fetch_top_sites(&Credentials::new("key", "secret"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::Service { .. }));
}

#[tokio::test]
async fn test_unreachable_ranking_service_is_network_error() {
    let client = RankingClient::new(
        RankingConfig::default().with_endpoint(format!("http://{}/", closed_port_host())),
    )
    .unwrap();
    let err = client
        .fetch_top_sites(&Credentials::new("key", "secret"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::NetworkError { .. }));
}

#[tokio::test]
async fn test_full_pipeline_two_domains() {
    let fast = html_server(None).await;
    let slow = html_server(Some(Duration::from_secs(3))).await;
    let domains = vec![host_of(&fast), host_of(&slow)];
    let ranking = ranking_server(&domains).await;

    let analyzer = SiteAnalyzer::new(
        Credentials::new("AKIDEXAMPLE", "secret"),
        RankingConfig::default()
            .with_count(2)
            .with_endpoint(ranking.uri()),
        ScanConfig::default()
            .with_concurrency(2)
            .with_timeout(Duration::from_millis(400)),
    )
    .unwrap();
    let report = analyzer.run(20).await.unwrap();

    assert_eq!(report.total(), 2);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.failure_count, 1);
    assert_eq!(report.timeout_count, 1);
    assert_eq!(report.results[0].status_code, Some(200));
    assert_eq!(report.results[0].rank, Some(1));
    assert_eq!(report.results[1].outcome, ScanOutcome::Timeout);
    assert_eq!(report.results[0].word_count_rank, Some(1));
    assert!(report
        .header_stats
        .iter()
        .any(|stat| stat.name == "content-type" && stat.sites == 1));
}

#[tokio::test]
async fn test_full_pipeline_stops_on_rejected_credentials() {
    let ranking = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_raw(AUTH_ERROR, "text/xml"))
        .mount(&ranking)
        .await;

    let analyzer = SiteAnalyzer::new(
        Credentials::new("wrong", "credentials"),
        RankingConfig::default().with_endpoint(ranking.uri()),
        ScanConfig::default(),
    )
    .unwrap();
    let err = analyzer.run(20).await.unwrap_err();

    assert!(err.is_authentication());
}
