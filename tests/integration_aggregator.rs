//! Aggregator Integration Tests
//!
//! Multi-provider fan-out, consent caching, date filtering and
//! deadline/cancellation handling against mock providers.

use std::sync::Arc;
use std::time::Duration;

use bank_aggregator::domain::AgreementRequest;
use bank_aggregator::{
    AggregatorError, ConsentKind, DateRange, OperationContext, PaymentRequest, ProviderFilter,
};
use chrono::NaiveDate;
use futures::future::join_all;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

fn january() -> DateRange {
    DateRange::between(
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
    )
}

#[tokio::test]
async fn test_accounts_merged_in_provider_order() {
    let vbank = common::healthy_provider(&["v-1", "v-2"]).await;
    let abank = common::healthy_provider(&["a-1"]).await;
    let aggregator = common::aggregator_for(&[(&vbank, "vbank"), (&abank, "abank")]);

    let accounts = aggregator
        .get_accounts(&OperationContext::new(), common::USER, &ProviderFilter::All)
        .await
        .unwrap();

    let ids: Vec<&str> = accounts.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["v-1", "v-2", "a-1"]);
    assert_eq!(accounts[0].provider, "vbank");
    assert_eq!(accounts[2].provider, "abank");
}

#[tokio::test]
async fn test_failing_provider_is_skipped() {
    let vbank = common::healthy_provider(&["v-1"]).await;
    let abank = MockServer::start().await;
    common::mount_broken(&abank).await;
    let aggregator = common::aggregator_for(&[(&vbank, "vbank"), (&abank, "abank")]);

    let accounts = aggregator
        .get_accounts(&OperationContext::new(), common::USER, &ProviderFilter::All)
        .await
        .unwrap();

    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].provider, "vbank");

    let transactions = aggregator
        .get_transactions(
            &OperationContext::new(),
            common::USER,
            &ProviderFilter::All,
            &DateRange::unbounded(),
        )
        .await
        .unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].id, "v-1-t1");
}

#[tokio::test]
async fn test_all_providers_failing_is_error() {
    let vbank = MockServer::start().await;
    let abank = MockServer::start().await;
    common::mount_broken(&vbank).await;
    common::mount_broken(&abank).await;
    let aggregator = common::aggregator_for(&[(&vbank, "vbank"), (&abank, "abank")]);

    let err = aggregator
        .get_accounts(&OperationContext::new(), common::USER, &ProviderFilter::All)
        .await
        .unwrap_err();

    match err {
        AggregatorError::AllProvidersFailed { failures, .. } => assert_eq!(failures.len(), 2),
        other => panic!("expected all-providers failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_targeted_provider_error_propagates() {
    let vbank = common::healthy_provider(&["v-1"]).await;
    let abank = MockServer::start().await;
    common::mount_broken(&abank).await;
    let aggregator = common::aggregator_for(&[(&vbank, "vbank"), (&abank, "abank")]);

    let err = aggregator
        .get_accounts(
            &OperationContext::new(),
            common::USER,
            &ProviderFilter::only("abank"),
        )
        .await
        .unwrap_err();

    let provider_err = err.provider_error().expect("provider error");
    assert_eq!(provider_err.provider(), "abank");
}

#[tokio::test]
async fn test_unknown_provider() {
    let vbank = common::healthy_provider(&["v-1"]).await;
    let aggregator = common::aggregator_for(&[(&vbank, "vbank")]);

    let err = aggregator
        .get_accounts(
            &OperationContext::new(),
            common::USER,
            &ProviderFilter::only("nobank"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AggregatorError::UnknownProvider(ref code) if code == "nobank"));
}

#[tokio::test]
async fn test_concurrent_requests_create_one_consent() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/account-consents/request"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "consent_id": "consent-1", "status": "approved" }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;
    common::mount_accounts(&server, &["v-1"]).await;

    let aggregator = Arc::new(common::aggregator_for(&[(&server, "vbank")]));

    let calls = (0..10).map(|_| {
        let aggregator = aggregator.clone();
        async move {
            aggregator
                .get_accounts(&OperationContext::new(), common::USER, &ProviderFilter::All)
                .await
        }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(
        aggregator
            .consents()
            .cached(ConsentKind::Account, "vbank", common::USER)
            .await
            .as_deref(),
        Some("consent-1")
    );
}

#[tokio::test]
async fn test_transactions_filtered_by_date() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    common::mount_consent(&server, "account-consents", "consent-1").await;
    common::mount_accounts(&server, &["v-1"]).await;

    let mut body = common::transactions_body(&[
        ("t-jan", "2025-01-15", "10.00", "Debit"),
        ("t-feb", "2025-02-10", "20.00", "Debit"),
        ("t-dec", "2024-12-31", "30.00", "Credit"),
    ]);
    body["data"]["transaction"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "transactionId": "t-undated", "amount": "5.00" }));
    common::mount_transactions(&server, "v-1", body).await;

    let aggregator = common::aggregator_for(&[(&server, "vbank")]);

    let filtered = aggregator
        .get_transactions(&OperationContext::new(), common::USER, &ProviderFilter::All, &january())
        .await
        .unwrap();
    let ids: Vec<&str> = filtered.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t-jan"]);
    assert_eq!(filtered[0].amount, dec!(-10.00));

    let all = aggregator
        .get_transactions(
            &OperationContext::new(),
            common::USER,
            &ProviderFilter::All,
            &DateRange::unbounded(),
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_account_failure_skipped_only_in_fan_out() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    common::mount_consent(&server, "account-consents", "consent-1").await;
    common::mount_accounts(&server, &["v-1", "v-2"]).await;
    common::mount_transactions(
        &server,
        "v-1",
        common::transactions_body(&[("t1", "2025-01-15", "10.00", "Credit")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/accounts/v-2/transactions"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "error": "forbidden" })))
        .mount(&server)
        .await;

    let aggregator = common::aggregator_for(&[(&server, "vbank")]);

    let merged = aggregator
        .get_transactions(
            &OperationContext::new(),
            common::USER,
            &ProviderFilter::All,
            &DateRange::unbounded(),
        )
        .await
        .unwrap();
    assert_eq!(merged.len(), 1);

    let err = aggregator
        .get_transactions(
            &OperationContext::new(),
            common::USER,
            &ProviderFilter::only("vbank"),
            &DateRange::unbounded(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.provider_error().and_then(|e| e.status()), Some(403));
}

#[tokio::test]
async fn test_revoked_consent_is_recreated() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/account-consents/request"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "consent_id": "consent-1", "status": "approved" })),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/account-consents/consent-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let aggregator = common::aggregator_for(&[(&server, "vbank")]);
    let ctx = OperationContext::new();

    let first = aggregator
        .ensure_consent(&ctx, "vbank", common::USER, ConsentKind::Account)
        .await
        .unwrap();
    let cached = aggregator
        .ensure_consent(&ctx, "vbank", common::USER, ConsentKind::Account)
        .await
        .unwrap();
    assert_eq!(first, cached);

    aggregator
        .revoke_consent(&ctx, "vbank", ConsentKind::Account, &first)
        .await
        .unwrap();
    assert!(aggregator
        .consents()
        .cached(ConsentKind::Account, "vbank", common::USER)
        .await
        .is_none());

    aggregator
        .ensure_consent(&ctx, "VBANK", common::USER, ConsentKind::Account)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_deadline_exceeded() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    common::mount_consent(&server, "account-consents", "consent-1").await;
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accounts": [] }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let aggregator = common::aggregator_for(&[(&server, "vbank")]);
    let ctx = OperationContext::new().with_timeout(Duration::from_millis(100));

    let err = aggregator
        .get_accounts(&ctx, common::USER, &ProviderFilter::All)
        .await
        .unwrap_err();

    assert!(matches!(err, AggregatorError::DeadlineExceeded));
}

#[tokio::test]
async fn test_cancelled_context() {
    let vbank = common::healthy_provider(&["v-1"]).await;
    let aggregator = common::aggregator_for(&[(&vbank, "vbank")]);

    let ctx = OperationContext::new();
    ctx.cancellation().cancel();

    let err = aggregator
        .get_accounts(&ctx, common::USER, &ProviderFilter::All)
        .await
        .unwrap_err();

    assert!(matches!(err, AggregatorError::Cancelled));
    assert!(vbank.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_payment_reuses_cached_payment_consent() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    common::mount_consent(&server, "payment-consents", "pay-consent-1").await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .and(header("x-payment-consent-id", "pay-consent-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "paymentId": "pay-1", "status": "Pending" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/pay-1"))
        .and(header("x-payment-consent-id", "pay-consent-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "paymentId": "pay-1", "status": "AcceptedSettlementCompleted" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let aggregator = common::aggregator_for(&[(&server, "vbank")]);
    let ctx = OperationContext::new();
    let request = PaymentRequest::new("40817810000000000001", "40817810000000000002", dec!(99.90));

    let payment = aggregator
        .create_payment(&ctx, "vbank", common::USER, &request)
        .await
        .unwrap();
    assert_eq!(payment.id, "pay-1");
    assert_eq!(payment.amount, dec!(99.90));

    let status = aggregator
        .get_payment(&ctx, "vbank", common::USER, "pay-1")
        .await
        .unwrap();
    assert_eq!(status.status, "AcceptedSettlementCompleted");
}

#[tokio::test]
async fn test_account_detail_from_list_envelope() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    common::mount_consent(&server, "account-consents", "consent-1").await;
    Mock::given(method("GET"))
        .and(path("/accounts/acc-9"))
        .and(header("x-consent-id", "consent-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "account": [{ "accountId": "acc-9", "currency": "RUB", "nickname": "Main" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let aggregator = common::aggregator_for(&[(&server, "vbank")]);
    let account = aggregator
        .get_account_detail(&OperationContext::new(), "vbank", common::USER, "acc-9")
        .await
        .unwrap();

    assert_eq!(account.id, "acc-9");
    assert_eq!(account.currency, "RUB");
    assert_eq!(account.provider, "vbank");
}

#[tokio::test]
async fn test_agreement_lifecycle_shares_one_consent() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/product-agreement-consents/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "consent_id": "pa-consent-1",
            "status": "approved",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/agreements"))
        .and(header("x-product-agreement-consent-id", "pa-consent-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "agreementId": "agr-1", "status": "active" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/agreements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "agreement": [
                { "agreementId": "agr-1", "productId": "dep-1", "amount": "50000", "status": "active" }
            ] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/agreements/agr-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agreement_id": "agr-1",
            "product_id": "dep-1",
            "start_date": "2025-01-01",
            "status": "active",
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/agreements/agr-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let aggregator = common::aggregator_for(&[(&server, "vbank")]);
    let ctx = OperationContext::new();
    let request = AgreementRequest {
        product_id: "dep-1".to_string(),
        amount: dec!(50000),
        term_months: Some(12),
        source_account_id: None,
    };

    let opened = aggregator
        .open_agreement(&ctx, "vbank", common::USER, &request)
        .await
        .unwrap();
    assert_eq!(opened.id, "agr-1");
    assert_eq!(opened.product_id, "dep-1");
    assert_eq!(opened.amount, dec!(50000));

    let listed = aggregator
        .list_agreements(&ctx, common::USER, &ProviderFilter::All)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].provider, "vbank");

    let fetched = aggregator
        .get_agreement(&ctx, "vbank", common::USER, "agr-1")
        .await
        .unwrap();
    assert_eq!(fetched.start_date, NaiveDate::from_ymd_opt(2025, 1, 1));

    let closed = aggregator
        .close_agreement(&ctx, "vbank", common::USER, "agr-1")
        .await
        .unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_account_transactions_filtered_client_side() {
    let server = MockServer::start().await;
    common::mount_token(&server, 3600).await;
    common::mount_consent(&server, "account-consents", "consent-1").await;
    common::mount_transactions(
        &server,
        "acc-1",
        common::transactions_body(&[
            ("t1", "2024-12-31", "10.00", "Debit"),
            ("t2", "2025-01-15", "50.00", "Debit"),
            ("t3", "2025-02-01", "20.00", "Credit"),
        ]),
    )
    .await;

    let aggregator = common::aggregator_for(&[(&server, "vbank")]);
    let transactions = aggregator
        .get_account_transactions(
            &OperationContext::new(),
            "vbank",
            common::USER,
            "acc-1",
            &january(),
        )
        .await
        .unwrap();

    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].id, "t2");
    assert_eq!(transactions[0].amount, dec!(-50.00));
    assert_eq!(transactions[0].provider, "vbank");
}
