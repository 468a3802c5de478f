//! Full accrual flow against a stub oracle served over HTTP.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use loyalty_accrual::{AccrualClient, BackgroundTasks, FailurePolicy, Reconciler};
use loyalty_core::{OrderStatus, Points};
use loyalty_db::{Database, DbConfig, ErrorKind, Ledger, SubmitOutcome};

type Verdicts = Arc<Mutex<HashMap<String, Value>>>;

async fn verdict(State(verdicts): State<Verdicts>, Path(number): Path<String>) -> Response {
    match verdicts.lock().unwrap().get(&number) {
        Some(body) => Json(body.clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn spawn_oracle(verdicts: Verdicts) -> String {
    let app = Router::new()
        .route("/api/orders/{number}", get(verdict))
        .with_state(verdicts);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    // No scheme on purpose
    addr.to_string()
}

async fn setup() -> (Ledger, Verdicts, Reconciler) {
    let ledger = Ledger::new(Database::new(DbConfig::in_memory()).await.unwrap());
    let verdicts = Verdicts::default();
    let address = spawn_oracle(verdicts.clone()).await;
    let client = AccrualClient::new(&address, Duration::from_secs(1)).unwrap();
    let reconciler = Reconciler::new(ledger.clone(), Arc::new(client), FailurePolicy::AbortTick);
    (ledger, verdicts, reconciler)
}

#[tokio::test]
async fn test_accrue_then_withdraw() {
    let (ledger, verdicts, reconciler) = setup().await;

    let user = ledger.register_user("alice", "s3cret").await.unwrap();
    let outcome = ledger.submit_order(&user.id, "79927398713").await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Accepted);

    // Oracle has not seen it yet
    let report = reconciler.tick().await;
    assert_eq!(report.pending, 1);
    assert_eq!(ledger.balance(&user.id).await.unwrap().current, Points::ZERO);

    verdicts.lock().unwrap().insert(
        "79927398713".into(),
        json!({ "order": "79927398713", "status": "PROCESSED", "accrual": 500 }),
    );
    let report = reconciler.tick().await;
    assert_eq!(report.credited, 1);

    let orders = ledger.orders(&user.id).await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Processed);
    assert_eq!(orders[0].accrual, Some(Points::from_whole(500)));

    let balance = ledger.balance(&user.id).await.unwrap();
    assert_eq!(balance.current, Points::from_whole(500));
    assert_eq!(balance.withdrawn, Points::ZERO);

    ledger
        .withdraw(&user.id, "2377225624", Points::from_whole(200))
        .await
        .unwrap();
    let balance = ledger.balance(&user.id).await.unwrap();
    assert_eq!(balance.current, Points::from_whole(300));
    assert_eq!(balance.withdrawn, Points::from_whole(200));

    let err = ledger
        .withdraw(&user.id, "2377225624", Points::from_whole(400))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    let balance = ledger.balance(&user.id).await.unwrap();
    assert_eq!(balance.current, Points::from_whole(300));
    assert_eq!(balance.withdrawn, Points::from_whole(200));
    assert_eq!(ledger.withdrawals(&user.id).await.unwrap().len(), 1);

    // Replaying the same verdict changes nothing
    let report = reconciler.tick().await;
    assert_eq!(report.examined, 0);
    assert_eq!(ledger.balance(&user.id).await.unwrap().current, Points::from_whole(300));
}

#[tokio::test]
async fn test_background_reconciler_credits() {
    let (ledger, verdicts, reconciler) = setup().await;

    let user = ledger.register_user("bob", "pw").await.unwrap();
    ledger.submit_order(&user.id, "18").await.unwrap();
    verdicts.lock().unwrap().insert(
        "18".into(),
        json!({ "order": "18", "status": "PROCESSED", "accrual": 12.5 }),
    );

    let mut tasks = BackgroundTasks::new();
    reconciler.run_every(&mut tasks, Duration::from_millis(20));

    let mut current = Points::ZERO;
    for _ in 0..100 {
        current = ledger.balance(&user.id).await.unwrap().current;
        if current.is_positive() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tasks.shutdown().await;

    assert_eq!(current, Points::from_hundredths(1250));
}
