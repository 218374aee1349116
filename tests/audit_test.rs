//! Audit engine: snapshot arithmetic, reconciliation, the global balance
//! invariant, compensating reversal, and ledger immutability.

mod common;

use common::{dec, fund_wallet, platform_balance, seed, setup_test_app, wallet_balance};
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

async fn checkout(
    app: &common::TestApp,
    fixtures: &common::Fixtures,
    quantity: i32,
    unit_price: &str,
) -> serde_json::Value {
    let res = reqwest::Client::new()
        .post(format!("{}/orders", app.base_url))
        .header("x-user-id", fixtures.buyer_id.to_string())
        .json(&json!({
            "stand": fixtures.stand_id,
            "items": [{
                "product": fixtures.product_id,
                "quantity": quantity,
                "unit_price": unit_price,
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn patch_status(
    app: &common::TestApp,
    caller: Uuid,
    order_id: &str,
    status: &str,
) -> reqwest::Response {
    reqwest::Client::new()
        .patch(format!("{}/orders/{}", app.base_url, order_id))
        .header("x-user-id", caller.to_string())
        .json(&json!({ "status": status }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_reconcile_reports_consistent_order() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "200.00").await;
    checkout(&app, &fixtures, 2, "50.00").await;

    let res = reqwest::Client::new()
        .get(format!("{}/audit/reconcile", app.base_url))
        .header("x-user-id", fixtures.superadmin_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["total_orders_checked"], 1);
    assert_eq!(report["inconsistencies_found"], 0);
    let details = report["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["is_valid"], true);
    assert!(details[0]["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_flags_completed_order_without_movements() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;

    // A COMPLETED order written behind the ledger's back: no snapshot, no
    // wallet movements. Reconciliation must flag it, not fail.
    sqlx::query(
        "INSERT INTO orders (id, user_id, stand_id, status, total_amount) VALUES ($1, $2, $3, 'COMPLETED', 40.00)",
    )
    .bind(Uuid::new_v4())
    .bind(fixtures.buyer_id)
    .bind(fixtures.stand_id)
    .execute(&app.pool)
    .await
    .unwrap();

    let res = reqwest::Client::new()
        .get(format!("{}/audit/reconcile", app.base_url))
        .header("x-user-id", fixtures.superadmin_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["total_orders_checked"], 1);
    assert_eq!(report["inconsistencies_found"], 1);
    let errors = report["details"][0]["errors"].as_array().unwrap();
    assert!(!errors.is_empty());
    assert!(errors[0].as_str().unwrap().contains("snapshot"));
}

#[tokio::test]
async fn test_global_balance_invariant_holds_across_operations() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "7.50").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "500.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.stand_admin_id, "25.00").await;

    let order = checkout(&app, &fixtures, 3, "40.00").await;
    checkout(&app, &fixtures, 1, "19.99").await;

    // reverse the first order as well
    let res = patch_status(
        &app,
        fixtures.superadmin_id,
        order["id"].as_str().unwrap(),
        "CANCELLED",
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = reqwest::Client::new()
        .get(format!("{}/audit/balance", app.base_url))
        .header("x-user-id", fixtures.superadmin_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    let difference = dec(report["difference"].as_str().unwrap());
    assert_eq!(difference, dec("0"));
    let wallet_total = dec(report["wallet_total"].as_str().unwrap());
    let ledger_total = dec(report["ledger_total"].as_str().unwrap());
    assert_eq!(wallet_total, ledger_total);
}

#[tokio::test]
async fn test_reversal_restores_balances_and_runs_once() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "200.00").await;

    let order = checkout(&app, &fixtures, 2, "50.00").await;
    let order_id = order["id"].as_str().unwrap();

    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("100.00"));
    assert_eq!(wallet_balance(&app.pool, fixtures.stand_admin_id).await, dec("90.00"));
    assert_eq!(platform_balance(&app.pool).await, dec("10.00"));

    let res = patch_status(&app, fixtures.superadmin_id, order_id, "CANCELLED").await;
    assert_eq!(res.status(), StatusCode::OK);
    let reversed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(reversed["status"], "CANCELLED");
    assert_eq!(reversed["is_reversed"], true);

    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("200.00"));
    assert_eq!(wallet_balance(&app.pool, fixtures.stand_admin_id).await, dec("0.00"));
    assert_eq!(platform_balance(&app.pool).await, dec("0.00"));

    let entry_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions")
        .fetch_one(&app.pool)
        .await
        .unwrap();

    // A second cancellation is a no-op: no new compensating entries.
    let res = patch_status(&app, fixtures.superadmin_id, order_id, "CANCELLED").await;
    assert_eq!(res.status(), StatusCode::OK);
    let after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(entry_count, after);
    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("200.00"));
}

#[tokio::test]
async fn test_reversal_fails_when_clawback_cannot_be_funded() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "200.00").await;

    let order = checkout(&app, &fixtures, 2, "50.00").await;
    let order_id = order["id"].as_str().unwrap();

    // Drain the stand admin's wallet so the net claw-back cannot be funded.
    sqlx::query("UPDATE wallets SET balance = 0 WHERE user_id = $1")
        .bind(fixtures.stand_admin_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let res = patch_status(&app, fixtures.superadmin_id, order_id, "CANCELLED").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // The transition rolled back: still COMPLETED, not reversed, retryable.
    let row: (String, bool) =
        sqlx::query_as("SELECT status, is_reversed FROM orders WHERE id = $1")
            .bind(Uuid::parse_str(order_id).unwrap())
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(row.0, "COMPLETED");
    assert!(!row.1);
    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("100.00"));

    // Refund the admin wallet and retry; now the reversal lands.
    fund_wallet(&app, fixtures.superadmin_id, fixtures.stand_admin_id, "90.00").await;
    let res = patch_status(&app, fixtures.superadmin_id, order_id, "CANCELLED").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(wallet_balance(&app.pool, fixtures.buyer_id).await, dec("200.00"));
}

#[tokio::test]
async fn test_invalid_transition_is_rejected() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "200.00").await;

    let order = checkout(&app, &fixtures, 1, "50.00").await;
    let order_id = order["id"].as_str().unwrap();

    let res = patch_status(&app, fixtures.superadmin_id, order_id, "CONFIRMED").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = patch_status(&app, fixtures.buyer_id, order_id, "CANCELLED").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ledger_entries_are_immutable() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "120.00").await;

    let before: (Uuid, String) =
        sqlx::query_as("SELECT id, amount::text FROM wallet_transactions LIMIT 1")
            .fetch_one(&app.pool)
            .await
            .unwrap();

    let update = sqlx::query("UPDATE wallet_transactions SET amount = amount + 1 WHERE id = $1")
        .bind(before.0)
        .execute(&app.pool)
        .await;
    let err = update.unwrap_err().to_string();
    assert!(err.contains("immutable"), "unexpected error: {}", err);

    let delete = sqlx::query("DELETE FROM wallet_transactions WHERE id = $1")
        .bind(before.0)
        .execute(&app.pool)
        .await;
    let err = delete.unwrap_err().to_string();
    assert!(err.contains("immutable"), "unexpected error: {}", err);

    let after: (Uuid, String) =
        sqlx::query_as("SELECT id, amount::text FROM wallet_transactions WHERE id = $1")
            .bind(before.0)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(before.1, after.1);
}

#[tokio::test]
async fn test_snapshot_is_immutable() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "120.00").await;
    checkout(&app, &fixtures, 1, "50.00").await;

    let update = sqlx::query("UPDATE financial_audit_log SET net_amount = 0")
        .execute(&app.pool)
        .await;
    let err = update.unwrap_err().to_string();
    assert!(err.contains("immutable"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_export_returns_csv_of_snapshots() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;
    fund_wallet(&app, fixtures.superadmin_id, fixtures.buyer_id, "200.00").await;
    let order = checkout(&app, &fixtures, 2, "50.00").await;

    let res = reqwest::Client::new()
        .get(format!("{}/audit/export", app.base_url))
        .header("x-user-id", fixtures.superadmin_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap().to_str().unwrap(),
        "text/csv"
    );
    let body = res.text().await.unwrap();
    let mut lines = body.lines();
    assert_eq!(
        lines.next().unwrap(),
        "order_id,user,organization,stand,total_amount,commission_amount,net_amount,created_at"
    );
    let row = lines.next().unwrap();
    assert!(row.contains(order["id"].as_str().unwrap()));
    assert!(row.contains("buyer"));
    assert!(row.contains("100.00"));
    assert!(row.contains("10.00"));
    assert!(row.contains("90.00"));

    // date window excluding today returns only the header
    let res = reqwest::Client::new()
        .get(format!(
            "{}/audit/export?start_date=2000-01-01&end_date=2000-01-02",
            app.base_url
        ))
        .header("x-user-id", fixtures.superadmin_id.to_string())
        .send()
        .await
        .unwrap();
    let body = res.text().await.unwrap();
    assert_eq!(body.lines().count(), 1);
}

#[tokio::test]
async fn test_audit_endpoints_require_superadmin() {
    let app = setup_test_app().await;
    let fixtures = seed(&app.pool, "10.00").await;

    for path in ["/audit/reconcile", "/audit/balance", "/audit/export"] {
        let res = reqwest::Client::new()
            .get(format!("{}{}", app.base_url, path))
            .header("x-user-id", fixtures.buyer_id.to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "path {}", path);
    }
}
