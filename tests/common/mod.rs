//! Common test utilities
//!
//! Mock provider servers built on wiremock plus helpers wiring them into
//! providers and aggregators with a fast retry policy.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bank_aggregator::token::{ClientCredentials, TokenManager};
use bank_aggregator::transport::{HttpTransport, RetryPolicy};
use bank_aggregator::{BankAggregator, BankProvider, OpenBankingProvider};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEAM_ID: &str = "team042";
pub const CLIENT_SECRET: &str = "secret";
pub const USER: &str = "demo-user-1";

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

pub fn shared_tokens() -> Arc<TokenManager> {
    Arc::new(TokenManager::new(ClientCredentials::new(TEAM_ID, CLIENT_SECRET)))
}

pub fn transport_for(server: &MockServer, code: &str) -> HttpTransport {
    HttpTransport::new(code, server.uri(), reqwest::Client::new(), fast_retry())
}

pub fn provider_with_tokens(
    server: &MockServer,
    code: &str,
    tokens: Arc<TokenManager>,
) -> Arc<OpenBankingProvider> {
    Arc::new(OpenBankingProvider::new(
        transport_for(server, code),
        tokens,
        TEAM_ID,
    ))
}

pub fn provider_for(server: &MockServer, code: &str) -> Arc<OpenBankingProvider> {
    provider_with_tokens(server, code, shared_tokens())
}

/// Aggregator over `(server, code)` pairs sharing one token cache, in order
pub fn aggregator_for(servers: &[(&MockServer, &str)]) -> BankAggregator {
    let tokens = shared_tokens();
    let providers = servers
        .iter()
        .map(|(server, code)| {
            provider_with_tokens(server, code, tokens.clone()) as Arc<dyn BankProvider>
        })
        .collect();
    BankAggregator::new(providers)
}

// =========================================================================
// Mock endpoints
// =========================================================================

pub async fn mount_token(server: &MockServer, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/auth/bank-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": format!("token-{}", expires_in),
            "token_type": "bearer",
            "expires_in": expires_in,
        })))
        .mount(server)
        .await;
}

pub async fn mount_consent(server: &MockServer, resource: &str, consent_id: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/request", resource)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "consent_id": consent_id,
            "status": "approved",
        })))
        .mount(server)
        .await;
}

pub async fn mount_accounts(server: &MockServer, account_ids: &[&str]) {
    let accounts: Vec<Value> = account_ids
        .iter()
        .map(|id| {
            json!({
                "accountId": id,
                "currency": "RUB",
                "accountType": "Personal",
                "nickname": format!("Account {}", id),
                "status": "Enabled",
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "account": accounts } })),
        )
        .mount(server)
        .await;
}

/// One transaction per date: `(id, "YYYY-MM-DD", amount, "Credit" | "Debit")`
pub fn transactions_body(items: &[(&str, &str, &str, &str)]) -> Value {
    let transactions: Vec<Value> = items
        .iter()
        .map(|(id, date, amount, indicator)| {
            json!({
                "transactionId": id,
                "bookingDateTime": format!("{}T10:00:00Z", date),
                "amount": { "amount": amount, "currency": "RUB" },
                "creditDebitIndicator": indicator,
                "transactionInformation": format!("Transaction {}", id),
            })
        })
        .collect();
    json!({ "data": { "transaction": transactions } })
}

pub async fn mount_transactions(server: &MockServer, account_id: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/accounts/{}/transactions", account_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Every unmatched provider path answers 500
pub async fn mount_broken(server: &MockServer) {
    Mock::given(path_regex(".*"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(server)
        .await;
}

/// A fully working provider with accounts and transactions
pub async fn healthy_provider(account_ids: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    mount_token(&server, 3600).await;
    mount_consent(&server, "account-consents", "consent-1").await;
    mount_accounts(&server, account_ids).await;
    for id in account_ids {
        let transaction_id = format!("{}-t1", id);
        let body =
            transactions_body(&[(transaction_id.as_str(), "2025-01-10", "100.00", "Credit")]);
        mount_transactions(&server, id, body).await;
    }
    server
}
