//! Checkout engine: idempotency, concurrency safety, balance validation and
//! the multi-party commission split.

mod common;

use common::{dec, fund_wallet, seed, setup_test_app, wallet_balance};
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

fn cart(fixtures: &common::Fixtures, quantity: i32, unit_price: &str, key: Option<&str>) -> serde_json::Value {
    json!({
        "stand": fixtures.stand_id,
        "items": [{
            "product": fixtures.product_id,
            "quantity": quantity,
            "unit_price": unit_price,
        }],
        "idempotency_key": key,
    })
}

#[tokio::test]
async fn test_checkout_completes_and_splits_commission() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "200.00").await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/orders", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .json(&cart(&fixtures, 2, "50.00", None))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let order: serde_json::Value = res.json().await.unwrap();
    assert_eq!(order["status"], "COMPLETED");
    assert_eq!(order["total_amount"], "100.00");
    assert_eq!(order["items"].as_array().unwrap().len(), 1);

    // 100.00 at 10%: buyer pays 100, stand admin nets 90, platform keeps 10
    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("100.00"));
    assert_eq!(wallet_balance(&app.pool, fixtures.stand_admin_id).await, dec("90.00"));
    assert_eq!(common::platform_balance(&app.pool).await, dec("10.00"));

    let snapshot: (String, String, String) = sqlx::query_as(
        "SELECT total_amount::text, commission_amount::text, net_amount::text
         FROM financial_audit_log WHERE order_id = $1",
    )
    .bind(Uuid::parse_str(order["id"].as_str().unwrap()).unwrap())
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(dec(&snapshot.0), dec("100.00"));
    assert_eq!(dec(&snapshot.1), dec("10.00"));
    assert_eq!(dec(&snapshot.2), dec("90.00"));
}

#[tokio::test]
async fn test_idempotent_checkout_same_key_no_double_charge() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "200.00").await;

    let client = reqwest::Client::new();
    let body = cart(&fixtures, 2, "50.00", Some("idem-key-001"));

    let first = client
        .post(format!("{}/orders", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: serde_json::Value = first.json().await.unwrap();

    let second = client
        .post(format!("{}/orders", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second: serde_json::Value = second.json().await.unwrap();

    assert_eq!(first["id"], second["id"]);

    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(order_count, 1);

    let debits: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT t.amount::text
        FROM wallet_transactions t
        JOIN wallets w ON w.id = t.wallet_id
        WHERE w.user_id = $1 AND t.entry_type = 'DEBIT'
        "#,
    )
    .bind(fixtures.buyer_id)
    .fetch_all(&app.pool)
    .await
    .unwrap();
    assert_eq!(debits.len(), 1, "must not double-charge");
    assert_eq!(dec(&debits[0].0), dec("100.00"));

    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("100.00"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_checkout_same_key_single_order() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "5.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "100.00").await;

    let body = cart(&fixtures, 2, "25.00", Some("concurrent-idem-key"));
    let url = format!("{}/orders", app.base_url);
    let buyer = fixtures.buyer_id.to_string();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let url = url.clone();
        let buyer = buyer.clone();
        let body = body.clone();
        handles.push(tokio::spawn(async move {
            reqwest::Client::new()
                .post(url)
                .header("x-user-id", buyer)
                .json(&body)
                .send()
                .await
                .unwrap()
                .status()
        }));
    }
    for handle in handles {
        let status = handle.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
    }

    let order_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE idempotency_key = $1")
            .bind("concurrent-idem-key")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(order_count, 1);

    let total_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(total_orders, 1);

    let debit_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM wallet_transactions t
        JOIN wallets w ON w.id = t.wallet_id
        WHERE w.user_id = $1 AND t.entry_type = 'DEBIT'
        "#,
    )
    .bind(fixtures.buyer_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(debit_count, 1, "must not double-charge");

    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("50.00"));
}

#[tokio::test]
async fn test_insufficient_balance_creates_nothing() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "10.00").await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/orders", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .json(&cart(&fixtures, 1, "50.00", Some("key-insufficient")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Insufficient"));

    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(order_count, 0);

    // only the seed credit exists, no order-tagged movements
    let tagged: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions WHERE order_id IS NOT NULL")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(tagged, 0);
    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("10.00"));
}

#[tokio::test]
async fn test_zero_quantity_cart_is_rejected() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "100.00").await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/orders", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .json(&cart(&fixtures, 0, "50.00", None))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_from_another_stand_is_rejected() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "100.00").await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/orders", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .json(&json!({
            "stand": fixtures.stand_id,
            "items": [{
                "product": Uuid::new_v4(),
                "quantity": 1,
                "unit_price": "50.00",
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_requires_buyer_role() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.stand_admin_id, "100.00").await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/orders", app.base_url))
        .header("x-user-id", fixtures.stand_admin_id.to_string())
        .json(&cart(&fixtures, 1, "50.00", None))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_add_funds_requires_privileged_role() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/wallet/add-funds", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .json(&json!({ "user_id": fixtures.buyer_id, "amount": "100.00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_wallet_me_and_transactions() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "75.00").await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/wallet/me", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let wallet: serde_json::Value = res.json().await.unwrap();
    assert_eq!(wallet["balance"], "75.00");

    let res = client
        .get(format!("{}/wallet/transactions", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let entries: serde_json::Value = res.json().await.unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["entry_type"], "CREDIT");
    assert_eq!(entries[0]["amount"], "75.00");
}
