//! Metadata endpoints against a mock portal

use minder_downloader::config::PortalConfig;
use minder_downloader::fetcher::PortalHttpClient;
use minder_downloader::metadata::{fetch_organizations, DatasetCatalog, MetadataError, MetadataLookup};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> (PortalHttpClient, String) {
    let config = PortalConfig::new("meta-token", server.uri()).unwrap();
    (PortalHttpClient::new(&config).unwrap(), config.server)
}

#[tokio::test]
async fn catalog_is_fetched_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/datasets"))
        .and(header("Authorization", "Bearer meta-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Categories": {
                "raw": {
                    "raw_sleep_mat": {"availableColumns": ["id", "start_date", "state"], "description": "Sleep mat"},
                    "raw_door_sensor": {"availableColumns": ["id", "start_date", "location_name"]}
                },
                "device": {
                    "device_types": {"availableColumns": ["id", "type"], "units": "n/a"}
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (transport, base) = client(&server);
    let catalog = DatasetCatalog::fetch(&transport, &base).await.unwrap();

    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.domains(), vec!["device", "raw"]);
    assert_eq!(
        catalog.columns_for("raw_sleep_mat").unwrap(),
        ["id", "start_date", "state"]
    );
    assert!(catalog.columns_for("raw_unknown").is_none());

    let device = catalog.get("device_types").unwrap();
    assert_eq!(device.domain, "device");
    assert_eq!(device.extra.get("units"), Some(&json!("n/a")));

    let raw: Vec<&str> = catalog.in_domain("raw").map(|d| d.name.as_str()).collect();
    assert_eq!(raw, vec!["raw_door_sensor", "raw_sleep_mat"]);
}

#[tokio::test]
async fn unauthorized_catalog_request_is_a_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/datasets"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (transport, base) = client(&server);
    let err = DatasetCatalog::fetch(&transport, &base).await.unwrap_err();
    assert!(matches!(err, MetadataError::Fetch(_)));
}

#[tokio::test]
async fn malformed_catalog_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/datasets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"datasets": []})))
        .mount(&server)
        .await;

    let (transport, base) = client(&server);
    assert!(DatasetCatalog::fetch(&transport, &base).await.is_err());
}

#[tokio::test]
async fn organizations_are_listed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info/organizations"))
        .and(header("Authorization", "Bearer meta-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organizations": [
                {"id": "org-a", "name": "Clinic A", "acronym": "CA"},
                {"organization": "org-b"}
            ]
        })))
        .mount(&server)
        .await;

    let (transport, base) = client(&server);
    let orgs = fetch_organizations(&transport, &base).await.unwrap();

    assert_eq!(orgs.len(), 2);
    assert_eq!(orgs[0].id, "org-a");
    assert_eq!(orgs[0].acronym.as_deref(), Some("CA"));
    assert_eq!(orgs[1].id, "org-b");
    assert!(orgs[1].name.is_none());
}
