//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{
    Account, AgreementRequest, Balance, Consent, ConsentKind, DateRange, OperationContext,
    Payment, PaymentRequest, Product, ProductAgreement, ProviderFilter, Transaction,
};
use crate::error::{AppError, AppResult};

/// User assumed when the caller does not name one
pub const DEFAULT_USER: &str = "demo-user-1";

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bank: Option<String>,
}

impl UserQuery {
    fn user(&self) -> &str {
        user_or_default(self.user.as_deref())
    }

    fn filter(&self) -> ProviderFilter {
        ProviderFilter::from_param(self.bank.as_deref())
    }

    fn bank(&self) -> AppResult<&str> {
        require_bank(self.bank.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl TransactionQuery {
    fn range(&self) -> AppResult<DateRange> {
        let from = parse_query_date("from", self.from.as_deref())?;
        let to = parse_query_date("to", self.to.as_deref())?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(AppError::InvalidRequest(
                    "'from' must not be after 'to'".to_string(),
                ));
            }
        }
        Ok(DateRange::new(from, to))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsentQuery {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

impl ConsentQuery {
    fn kind(&self) -> AppResult<ConsentKind> {
        match self.kind.as_deref().map(str::trim) {
            None | Some("") => Ok(ConsentKind::Account),
            Some(raw) => raw.parse().map_err(AppError::InvalidRequest),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConsentResponse {
    pub ok: bool,
    pub bank: String,
    pub user: String,
    pub kind: ConsentKind,
    pub consent_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CloseAgreementResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement: Option<ProductAgreement>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// =========================================================================
// Query helpers
// =========================================================================

fn user_or_default(user: Option<&str>) -> &str {
    match user.map(str::trim) {
        Some(user) if !user.is_empty() => user,
        _ => DEFAULT_USER,
    }
}

fn require_bank(bank: Option<&str>) -> AppResult<&str> {
    match bank.map(str::trim) {
        Some(bank) if !bank.is_empty() => Ok(bank),
        _ => Err(AppError::InvalidRequest(
            "Missing 'bank' query parameter".to_string(),
        )),
    }
}

/// Parse a `YYYY-MM-DD` or RFC 3339 query date; blank means unbounded.
fn parse_query_date(name: &str, raw: Option<&str>) -> AppResult<Option<NaiveDate>> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(timestamp.date_naive()));
    }

    Err(AppError::InvalidRequest(format!(
        "Invalid '{}' date: {} (expected YYYY-MM-DD or RFC 3339)",
        name, raw
    )))
}

// =========================================================================
// Routes
// =========================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Consents
        .route("/consents", post(create_consent))
        .route("/consents/:consent_id", get(get_consent).delete(revoke_consent))
        .route("/banks/:bank/connect", post(connect_bank))
        // Accounts
        .route("/accounts", get(list_accounts))
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/balances", get(get_account_balances))
        .route(
            "/accounts/:account_id/transactions",
            get(get_account_transactions),
        )
        .route("/transactions", get(list_transactions))
        // Payments
        .route("/payments", post(create_payment))
        .route("/payments/:payment_id", get(get_payment))
        // Products & agreements
        .route("/products", get(list_products))
        .route("/agreements", get(list_agreements).post(open_agreement))
        .route(
            "/agreements/:agreement_id",
            get(get_agreement).delete(close_agreement),
        )
}

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =========================================================================
// Consent handlers
// =========================================================================

async fn create_consent(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<ConsentQuery>,
) -> AppResult<Json<ConsentResponse>> {
    let bank = require_bank(query.bank.as_deref())?;
    let user = user_or_default(query.user.as_deref());
    let kind = query.kind()?;

    let consent_id = state
        .aggregator
        .ensure_consent(&context, bank, user, kind)
        .await?;

    Ok(Json(ConsentResponse {
        ok: true,
        bank: bank.to_string(),
        user: user.to_string(),
        kind,
        consent_id,
        message: "Consent created successfully".to_string(),
    }))
}

async fn connect_bank(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(bank): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ConsentResponse>> {
    let user = query.user();

    let consent_id = state
        .aggregator
        .ensure_consent(&context, &bank, user, ConsentKind::Account)
        .await?;

    Ok(Json(ConsentResponse {
        ok: true,
        user: user.to_string(),
        bank,
        kind: ConsentKind::Account,
        consent_id,
        message: "Consent created successfully".to_string(),
    }))
}

async fn get_consent(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(consent_id): Path<String>,
    Query(query): Query<ConsentQuery>,
) -> AppResult<Json<Consent>> {
    let bank = require_bank(query.bank.as_deref())?;
    let kind = query.kind()?;

    let consent = state
        .aggregator
        .consent_status(&context, bank, kind, &consent_id)
        .await?;

    Ok(Json(consent))
}

async fn revoke_consent(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(consent_id): Path<String>,
    Query(query): Query<ConsentQuery>,
) -> AppResult<Json<RevokeResponse>> {
    let bank = require_bank(query.bank.as_deref())?;
    let kind = query.kind()?;

    state
        .aggregator
        .revoke_consent(&context, bank, kind, &consent_id)
        .await?;

    Ok(Json(RevokeResponse {
        ok: true,
        message: "Consent revoked successfully".to_string(),
    }))
}

// =========================================================================
// Account handlers
// =========================================================================

async fn list_accounts(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<Account>>> {
    let accounts = state
        .aggregator
        .get_accounts(&context, query.user(), &query.filter())
        .await?;

    Ok(Json(accounts))
}

async fn get_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Account>> {
    let account = state
        .aggregator
        .get_account_detail(&context, query.bank()?, query.user(), &account_id)
        .await?;

    Ok(Json(account))
}

async fn get_account_balances(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<Balance>>> {
    let balances = state
        .aggregator
        .get_account_balances(&context, query.bank()?, query.user(), &account_id)
        .await?;

    Ok(Json(balances))
}

async fn get_account_transactions(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<String>,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<Transaction>>> {
    let bank = require_bank(query.bank.as_deref())?;
    let user = user_or_default(query.user.as_deref());
    let range = query.range()?;

    let transactions = state
        .aggregator
        .get_account_transactions(&context, bank, user, &account_id, &range)
        .await?;

    Ok(Json(transactions))
}

async fn list_transactions(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<Transaction>>> {
    let user = user_or_default(query.user.as_deref());
    let filter = ProviderFilter::from_param(query.bank.as_deref());
    let range = query.range()?;

    let transactions = state
        .aggregator
        .get_transactions(&context, user, &filter, &range)
        .await?;

    Ok(Json(transactions))
}

// =========================================================================
// Payment handlers
// =========================================================================

async fn create_payment(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<UserQuery>,
    Json(request): Json<PaymentRequest>,
) -> AppResult<(StatusCode, Json<Payment>)> {
    if request.amount <= Decimal::ZERO {
        return Err(AppError::InvalidRequest(
            "Payment amount must be positive".to_string(),
        ));
    }

    let payment = state
        .aggregator
        .create_payment(&context, query.bank()?, query.user(), &request)
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

async fn get_payment(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(payment_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Payment>> {
    let payment = state
        .aggregator
        .get_payment(&context, query.bank()?, query.user(), &payment_id)
        .await?;

    Ok(Json(payment))
}

// =========================================================================
// Product & agreement handlers
// =========================================================================

async fn list_products(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<Vec<Product>>> {
    let filter = ProviderFilter::from_param(query.bank.as_deref());
    let product_type = query
        .product_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let products = state
        .aggregator
        .list_products(&context, &filter, product_type)
        .await?;

    Ok(Json(products))
}

async fn list_agreements(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<ProductAgreement>>> {
    let agreements = state
        .aggregator
        .list_agreements(&context, query.user(), &query.filter())
        .await?;

    Ok(Json(agreements))
}

async fn open_agreement(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<UserQuery>,
    Json(request): Json<AgreementRequest>,
) -> AppResult<(StatusCode, Json<ProductAgreement>)> {
    if request.product_id.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "product_id is required".to_string(),
        ));
    }

    let agreement = state
        .aggregator
        .open_agreement(&context, query.bank()?, query.user(), &request)
        .await?;

    Ok((StatusCode::CREATED, Json(agreement)))
}

async fn get_agreement(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(agreement_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ProductAgreement>> {
    let agreement = state
        .aggregator
        .get_agreement(&context, query.bank()?, query.user(), &agreement_id)
        .await?;

    Ok(Json(agreement))
}

async fn close_agreement(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(agreement_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<CloseAgreementResponse>> {
    let agreement = state
        .aggregator
        .close_agreement(&context, query.bank()?, query.user(), &agreement_id)
        .await?;

    Ok(Json(CloseAgreementResponse {
        ok: true,
        agreement,
    }))
}
