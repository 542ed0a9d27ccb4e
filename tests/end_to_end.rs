//! End-to-end tests: a real controller on a local port, driven by the client API.

use std::time::Duration;

use serde_json::{json, Value};

use fleet_controller::api::{new_client_facade, ApiError, Connection, OffersClient};
use fleet_controller::facades::offers::{
    AddApplicationOffer, ApplicationOfferFilter, EndpointFilterTerm, RemoteEndpoint,
};
use fleet_controller::rpc::ErrorCode;
use fleet_controller::worker::{clean_kill, Worker};

mod common;
use common::{ADMIN_PASSWORD, ADMIN_TAG, READER_PASSWORD, READER_TAG};

#[tokio::test]
async fn test_echo_then_server_kill_fails_calls() {
    let (controller, addr) = common::start(common::test_config()).await;
    let conn = Connection::open(&addr, ADMIN_TAG, ADMIN_PASSWORD).await.unwrap();

    let (_front, ping) = new_client_facade(&conn, "Ping").unwrap();
    let echoed: String = ping.facade_call("Echo", "hello").await.unwrap();
    assert_eq!(echoed, "hello");

    controller.kill();
    controller.wait().await.unwrap();

    assert!(common::wait_until(Duration::from_secs(2), || async { conn.is_closed() }).await);
    let err = ping.facade_call::<_, String>("Echo", "again").await.unwrap_err();
    assert!(matches!(err, ApiError::ConnectionClosed), "got {err:?}");
}

#[tokio::test]
async fn test_login_lists_permitted_facades() {
    let (controller, addr) = common::start(common::test_config()).await;

    let admin = Connection::open(&addr, ADMIN_TAG, ADMIN_PASSWORD).await.unwrap();
    assert_eq!(admin.tag(), ADMIN_TAG);
    assert_eq!(admin.facade_versions("Ping"), &[1]);
    assert_eq!(admin.facade_versions("ApplicationOffers"), &[1]);
    assert_eq!(admin.facade_versions("Admin"), &[3]);

    let reader = Connection::open(&addr, READER_TAG, READER_PASSWORD).await.unwrap();
    assert_eq!(reader.facade_versions("Ping"), &[1]);
    assert!(reader.facade_versions("ApplicationOffers").is_empty());
    assert!(matches!(
        OffersClient::new(&reader),
        Err(ApiError::NoCompatibleVersion { .. })
    ));

    clean_kill(&controller, Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_bad_password_is_refused() {
    let (controller, addr) = common::start(common::test_config()).await;

    let err = Connection::open(&addr, ADMIN_TAG, "wrong").await.err().unwrap();
    assert_eq!(err.remote_kind(), Some(&ErrorCode::Unauthorized));

    clean_kill(&controller, Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_resolution_errors_reach_the_caller() {
    let (controller, addr) = common::start(common::test_config()).await;
    let reader = Connection::open(&addr, READER_TAG, READER_PASSWORD).await.unwrap();

    let err = reader.call("Nope", 1, "Anything", Value::Null).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(&ErrorCode::NotFound));

    let err = reader.call("Ping", 7, "Ping", Value::Null).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(&ErrorCode::NotSupported));

    let err = reader
        .call("ApplicationOffers", 1, "FindApplicationOffers", json!({"filters": []}))
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(&ErrorCode::Unauthorized));

    let err = reader.call("Ping", 1, "Pong", Value::Null).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(&ErrorCode::NotImplemented));

    let err = reader.call("Ping", 1, "Echo", json!({"not": "a string"})).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(&ErrorCode::BadRequest));

    // Protocol errors leave the connection usable.
    assert_eq!(reader.call("Ping", 1, "Echo", json!("still here")).await.unwrap(), json!("still here"));

    clean_kill(&controller, Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_calls_on_one_connection() {
    let (controller, addr) = common::start(common::test_config()).await;
    let conn = Connection::open(&addr, ADMIN_TAG, ADMIN_PASSWORD).await.unwrap();

    let calls = (0..32).map(|i| {
        let conn = conn.clone();
        async move { conn.call("Ping", 1, "Echo", json!(format!("msg-{i}"))).await }
    });
    let results = futures_util::future::join_all(calls).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), json!(format!("msg-{i}")));
    }

    clean_kill(&controller, Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_offer_and_find_endpoints() {
    let (controller, addr) = common::start(common::test_config()).await;
    let conn = Connection::open(&addr, ADMIN_TAG, ADMIN_PASSWORD).await.unwrap();
    let offers = OffersClient::new(&conn).unwrap();
    assert_eq!(offers.best_api_version(), 1);

    let offer = AddApplicationOffer {
        model_name: "prod".into(),
        offer_name: "hosted-mysql".into(),
        application_name: "mysql".into(),
        endpoints: vec![RemoteEndpoint {
            name: "db".into(),
            role: "provider".into(),
            interface: "mysql".into(),
        }],
        ..Default::default()
    };
    let results = offers.offer(vec![offer.clone(), offer]).await.unwrap();
    assert!(results[0].error.is_none());
    assert_eq!(
        results[1].error.as_ref().map(|e| e.kind.clone()),
        Some(ErrorCode::Other("already-exists".into()))
    );

    let mut filter = ApplicationOfferFilter::from_url("admin/prod").unwrap();
    filter.endpoints.push(EndpointFilterTerm {
        interface: "mysql".into(),
        ..Default::default()
    });
    let found = offers.find_application_offers(vec![filter]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].offer_url, "admin/prod.hosted-mysql");
    assert_eq!(found[0].access, "admin");

    offers.close().await;
    offers.close().await;
    assert!(conn.is_closed());

    clean_kill(&controller, Duration::from_secs(5)).await.unwrap();
}
