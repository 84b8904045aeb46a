//! Product Insights Tests

mod common;

use axum::http::StatusCode;
use bofu_notify::infra::memory::ProductRow;
use common::app;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn merges_products_for_research_result() {
    let app = app();
    let user = app.create_user("Riley");
    let research = Uuid::new_v4();
    app.store.put_product(ProductRow {
        id: Uuid::new_v4(),
        research_result_id: Some(research),
        product_data: json!({
            "keywords": ["crm"],
            "competitors": ["Globex", "Initech"]
        }),
    });
    app.store.put_product(ProductRow {
        id: Uuid::new_v4(),
        research_result_id: Some(research),
        product_data: json!({ "keywords": "not a list" }),
    });

    let resp = app
        .get(
            &format!("/products/insights?research_result_id={}", research),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["keywords"], json!(["crm"]));
    assert_eq!(body["competitors"], json!(["Globex", "Initech"]));
    assert_eq!(body["products"], 1);
    assert_eq!(body["skipped"], 1);
}

#[tokio::test]
async fn unknown_source_product_falls_back_to_research_result() {
    let app = app();
    let user = app.create_user("Riley");
    let research = Uuid::new_v4();
    app.store.put_product(ProductRow {
        id: Uuid::new_v4(),
        research_result_id: Some(research),
        product_data: json!({ "keywords": ["crm"] }),
    });

    let resp = app
        .get(
            &format!(
                "/products/insights?source_product_id={}&research_result_id={}",
                Uuid::new_v4(),
                research
            ),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["keywords"], json!(["crm"]));
    assert_eq!(resp.json()["products"], 1);
}

#[tokio::test]
async fn requires_an_id() {
    let app = app();
    let user = app.create_user("Riley");
    let resp = app.get("/products/insights", Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}
