use super::*;
use crate::test_support::{item, spawn_items_server};
use axum::{routing::get, Router};
use shared::protocol::ListedItem;
use tokio::net::TcpListener;

#[tokio::test]
async fn lists_items_in_server_order() {
    let (server_url, _server) =
        spawn_items_server(vec![item("1", "milk", false), item("2", "bread", true)]).await;
    let gateway = HttpGateway::new(&server_url).expect("gateway");

    let items = gateway.list().await.expect("list");
    assert_eq!(items, vec![item("1", "milk", false), item("2", "bread", true)]);
}

#[tokio::test]
async fn listed_item_with_blank_name_is_skipped() {
    let (server_url, server) =
        spawn_items_server(vec![item("1", "milk", false), item("3", "eggs", false)]).await;
    server
        .push_listed(ListedItem {
            id: ItemId::from("2"),
            name: "   ".into(),
            checked: true,
        })
        .await;
    let gateway = HttpGateway::new(&server_url).expect("gateway");

    let items = gateway.list().await.expect("list");
    assert_eq!(items, vec![item("1", "milk", false), item("3", "eggs", false)]);
}

#[tokio::test]
async fn listed_names_are_not_trimmed() {
    let (server_url, server) = spawn_items_server(Vec::new()).await;
    server
        .push_listed(ListedItem {
            id: ItemId::from("1"),
            name: " oat milk".into(),
            checked: false,
        })
        .await;
    let gateway = HttpGateway::new(&server_url).expect("gateway");

    let items = gateway.list().await.expect("list");
    assert_eq!(items[0].name.as_str(), " oat milk");
}

#[tokio::test]
async fn create_completes_id_only_response_with_submitted_name() {
    let (server_url, server) = spawn_items_server(Vec::new()).await;
    let gateway = HttpGateway::new(&server_url).expect("gateway");

    let created = gateway
        .create(&ItemName::parse("eggs").expect("name"))
        .await
        .expect("create");
    assert_eq!(created.name.as_str(), "eggs");
    assert!(!created.checked);
    assert_eq!(server.items().await, vec![created]);
}

#[tokio::test]
async fn set_checked_and_delete_reach_the_item_resource() {
    let (server_url, server) = spawn_items_server(vec![item("1", "milk", false)]).await;
    let gateway = HttpGateway::new(&server_url).expect("gateway");

    gateway
        .set_checked(&ItemId::from("1"), true)
        .await
        .expect("set checked");
    assert!(server.items().await[0].checked);

    gateway.delete(&ItemId::from("1")).await.expect("delete");
    assert!(server.items().await.is_empty());
}

#[tokio::test]
async fn missing_item_maps_to_not_found_with_server_message() {
    let (server_url, _server) = spawn_items_server(Vec::new()).await;
    let gateway = HttpGateway::new(&server_url).expect("gateway");

    let err = gateway
        .set_checked(&ItemId::from("nope"), true)
        .await
        .expect_err("must fail");
    assert_eq!(err, SyncError::NotFound("Item not found".to_string()));

    let err = gateway
        .delete(&ItemId::from("nope"))
        .await
        .expect_err("must fail");
    assert!(err.is_desync());
}

#[tokio::test]
async fn non_success_statuses_map_to_failure_kinds() {
    let (server_url, server) = spawn_items_server(vec![item("1", "milk", false)]).await;
    let gateway = HttpGateway::new(&server_url).expect("gateway");

    server
        .fail_with(Some(StatusCode::INTERNAL_SERVER_ERROR))
        .await;
    let err = gateway.list().await.expect_err("must fail");
    assert_eq!(
        err,
        SyncError::Server {
            status: 500,
            message: Some("injected failure".to_string()),
        }
    );

    server.fail_with(Some(StatusCode::BAD_REQUEST)).await;
    let err = gateway
        .create(&ItemName::parse("eggs").expect("name"))
        .await
        .expect_err("must fail");
    assert!(matches!(err, SyncError::Validation(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let gateway = HttpGateway::new(&format!("http://{addr}")).expect("gateway");
    let err = gateway.list().await.expect_err("must fail");
    assert!(matches!(err, SyncError::Network(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn undecodable_body_is_an_invalid_response() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route("/api/items", get(|| async { "not json" }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let gateway = HttpGateway::new(&format!("http://{addr}")).expect("gateway");
    let err = gateway.list().await.expect_err("must fail");
    assert!(
        matches!(err, SyncError::InvalidResponse(_)),
        "unexpected error: {err}"
    );
}

#[test]
fn item_ids_are_pushed_as_single_encoded_segment() {
    let gateway = HttpGateway::new("http://localhost:8080").expect("gateway");
    let url = gateway.item_url(&ItemId::from("a/b c")).expect("url");
    assert_eq!(url.as_str(), "http://localhost:8080/api/items/a%2Fb%20c");
}

#[test]
fn server_url_path_prefix_is_kept() {
    let gateway = HttpGateway::new("http://localhost:8080/shoplist").expect("gateway");
    assert_eq!(
        gateway.items_url().as_str(),
        "http://localhost:8080/shoplist/api/items"
    );
}

#[test]
fn malformed_server_url_is_rejected() {
    let err = HttpGateway::new("not a url").err().expect("must fail");
    assert!(matches!(err, SyncError::Validation(_)));
}
