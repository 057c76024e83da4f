use std::fs;
use tracing::info;
use yieldfetch::core::Provenance;
use yieldfetch::core::config::AppConfig;

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// One server answering every upstream: protocol APIs, the subgraph and the listing.
    pub async fn create_mock_server() -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/steth-apr"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"data": {"apr": 3.2}}"#),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/mainnet/apr"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"yearlyAPR": "2.91"}"#))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data": {"reserves": [
                    {"symbol": "USDC", "liquidityRate": "40000000000000000000000000", "totalLiquidity": "1000"},
                    {"symbol": "DAI", "liquidityRate": "20000000000000000000000000", "totalLiquidity": "1000"}
                ]}}"#,
            ))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v3/markets/mainnet-usdc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"market": {"totalSupplyUsd": 500000000, "supplyApr": 4.1}}"#,
            ))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/pools"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status": "success", "data": [
                    {"pool": "a", "project": "curve-dex", "symbol": "DAI-USDC-USDT", "tvlUsd": 2000000, "apyBase": 3.0, "stablecoin": true},
                    {"pool": "b", "project": "curve-dex", "symbol": "FRAX-USDC", "tvlUsd": 6000000, "apyBase": 5.0, "stablecoin": true},
                    {"pool": "c", "project": "curve-dex", "symbol": "ETH-STETH", "tvlUsd": 9000000, "apyBase": 40.0, "stablecoin": false}
                ]}"#,
            ))
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub async fn listing_downloads(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/pools")
            .count()
    }

    pub fn config_for(uri: &str) -> String {
        format!(
            r#"
        providers:
          lido:
            base_url: {uri}
          rocket_pool:
            base_url: {uri}
          aave:
            base_url: {uri}
          compound:
            base_url: {uri}
          llama:
            base_url: {uri}
        batch:
          retry_count: 0
          chunk_delay_ms: 10
    "#
        )
    }
}

#[test_log::test(tokio::test)]
async fn test_batch_against_mocked_upstreams() {
    let mock_server = test_utils::create_mock_server().await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), test_utils::config_for(&mock_server.uri()))
        .expect("Failed to write config file");

    let config = AppConfig::load_from_path(config_file.path()).expect("Failed to load config");
    let batch = yieldfetch::build_batch_fetcher(&config);

    let ids: Vec<String> = ["lido", "rocket-pool", "aave-v3", "compound-v3", "curve"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let result = batch.fetch_batch(&ids).await;
    info!(?result, "Batch result");

    let apy = |id: &str| result.entries[id].outcome.as_ref().unwrap().apy;
    let provenance = |id: &str| result.entries[id].outcome.as_ref().unwrap().provenance;

    assert_eq!(result.successes(), 5);
    assert_eq!(apy("lido"), Some(3.2));
    assert_eq!(apy("rocket-pool"), Some(2.91));
    assert_eq!(apy("aave-v3"), Some(3.0));
    assert_eq!(apy("compound-v3"), Some(4.1));
    // Stablecoin pools only, weighted by TVL
    assert_eq!(apy("curve"), Some(4.5));

    assert_eq!(provenance("lido"), Provenance::Primary);
    assert_eq!(provenance("curve"), Provenance::Aggregate);

    // Second round is served from cache
    let again = batch.fetch_batch(&ids).await;
    assert!(again.entries.values().all(|e| e.cached));
    let response = yieldfetch::api::BatchResponse::from(again);
    assert_eq!(response.cache_status(), "partial");
}

#[test_log::test(tokio::test)]
async fn test_lido_falls_back_to_aggregate() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/steth-apr"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"status": "success", "data": [
                {"pool": "steth", "project": "lido", "symbol": "STETH", "tvlUsd": 30000000000, "apyBase": 2.87}
            ]}"#,
        ))
        .mount(&mock_server)
        .await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), test_utils::config_for(&mock_server.uri()))
        .expect("Failed to write config file");
    let config = AppConfig::load_from_path(config_file.path()).expect("Failed to load config");
    let batch = yieldfetch::build_batch_fetcher(&config);

    let result = batch.fetcher().fetch(yieldfetch::core::Protocol::Lido).await;
    assert_eq!(result.provenance, Provenance::Aggregate);
    assert_eq!(result.apy, Some(2.87));
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let mock_server = test_utils::create_mock_server().await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    let config_path = config_file.path();
    fs::write(config_path, test_utils::config_for(&mock_server.uri()))
        .expect("Failed to write config file");

    let result = yieldfetch::run_command(
        yieldfetch::AppCommand::Batch {
            protocols: Some("lido,curve".to_string()),
            json: true,
        },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(
        result.is_ok(),
        "Batch command failed with: {:?}",
        result.err()
    );

    let result = yieldfetch::run_command(
        yieldfetch::AppCommand::Fetch {
            protocol: "aave-v3".to_string(),
        },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(
        result.is_ok(),
        "Fetch command failed with: {:?}",
        result.err()
    );
}

#[test_log::test(tokio::test)]
async fn test_unknown_protocols_are_rejected() {
    let mock_server = test_utils::create_mock_server().await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), test_utils::config_for(&mock_server.uri()))
        .expect("Failed to write config file");

    let result = yieldfetch::run_command(
        yieldfetch::AppCommand::Batch {
            protocols: Some("lido,foo,bar".to_string()),
            json: false,
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;

    let err = result.expect_err("Unknown protocols should fail");
    assert!(err.to_string().contains("foo, bar"));
}

#[test_log::test(tokio::test)]
async fn test_watch_runs_bounded_rounds() {
    let mock_server = test_utils::create_mock_server().await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), test_utils::config_for(&mock_server.uri()))
        .expect("Failed to write config file");

    let result = yieldfetch::run_command(
        yieldfetch::AppCommand::Watch {
            protocols: Some("lido".to_string()),
            interval: std::time::Duration::from_millis(10),
            rounds: Some(2),
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "Watch failed with: {:?}", result.err());
}

/// Every primary is down, so each protocol is answered from the listing.
const FULL_LISTING: &str = r#"{"status": "success", "data": [
    {"pool": "l", "project": "lido", "symbol": "STETH", "tvlUsd": 30000000000, "apyBase": 2.87},
    {"pool": "r", "project": "rocket-pool", "symbol": "RETH", "tvlUsd": 3000000000, "apyBase": 2.65},
    {"pool": "a", "project": "aave-v3", "symbol": "USDC", "tvlUsd": 2000000000, "apyBase": 4.2},
    {"pool": "c", "project": "compound-v3", "symbol": "USDC", "tvlUsd": 1000000000, "apyBase": 3.9},
    {"pool": "d", "project": "curve-dex", "symbol": "DAI-USDC-USDT", "tvlUsd": 200000000, "apyBase": 1.8, "stablecoin": true}
]}"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), content).expect("Failed to write config file");
    config_file
}

#[test_log::test(tokio::test)]
async fn test_batch_downloads_listing_once() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FULL_LISTING))
        .mount(&mock_server)
        .await;

    let config_file = write_config(&test_utils::config_for(&mock_server.uri()));
    let config = AppConfig::load_from_path(config_file.path()).expect("Failed to load config");
    let batch = yieldfetch::build_batch_fetcher(&config);

    let ids: Vec<String> = yieldfetch::core::Protocol::ALL
        .iter()
        .map(|p| p.id().to_string())
        .collect();
    let result = batch.fetch_batch(&ids).await;

    assert_eq!(result.successes(), 5);
    assert!(
        result
            .entries
            .values()
            .all(|e| e.outcome.as_ref().unwrap().provenance == Provenance::Aggregate)
    );
    assert_eq!(test_utils::listing_downloads(&mock_server).await, 1);
}

#[test_log::test(tokio::test)]
async fn test_slow_listing_within_its_timeout() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pools"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FULL_LISTING)
                .set_delay(std::time::Duration::from_millis(800)),
        )
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let config_file = write_config(&format!(
        r#"
        providers:
          llama:
            base_url: {uri}
            timeout_secs: 10
        batch:
          per_call_timeout_ms: 300
    "#
    ));
    let config = AppConfig::load_from_path(config_file.path()).expect("Failed to load config");
    let batch = yieldfetch::build_batch_fetcher(&config);

    let result = batch.fetcher().fetch(yieldfetch::core::Protocol::Curve).await;
    assert_eq!(result.provenance, Provenance::Aggregate);
    assert_eq!(result.apy, Some(1.8));
}

#[test_log::test(tokio::test)]
async fn test_error_rate_stays_bounded_when_everything_fails() {
    let mock_server = wiremock::MockServer::start().await;

    let config_file = write_config(&test_utils::config_for(&mock_server.uri()));
    let config = AppConfig::load_from_path(config_file.path()).expect("Failed to load config");
    let batch = yieldfetch::build_batch_fetcher(&config);

    let result = batch.fetcher().fetch(yieldfetch::core::Protocol::Lido).await;
    assert_eq!(result.provenance, Provenance::Unavailable);

    let metrics = batch.fetcher().metrics();
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_fetches, 1);
    assert!(snapshot.error_rate <= 1.0, "error rate {}", snapshot.error_rate);
    assert!(
        metrics
            .check_thresholds()
            .contains(&"High error rate: 100.00%".to_string())
    );
}
