//! Provider wire format
//!
//! Typed request bodies and lenient response types for the Open-Banking
//! style API. Providers disagree on envelopes (bare arrays, plural or
//! singular collection fields, an optional `data` wrapper) and on field
//! casing, so every response type here accepts both snake_case and
//! camelCase and every list goes through [`decode_list`].
//!
//! Nothing in this module leaks past the adapter: each wire type converts
//! into its domain counterpart, tagged with the provider code.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{
    parse_amount, signed_amount, Account, AgreementRequest, Balance, Consent, ConsentKind,
    Payment, PaymentRequest, Product, ProductAgreement, Transaction,
};

// =========================================================================
// List envelopes
// =========================================================================

/// Collection candidates of one response, in decoding priority order.
pub(crate) trait ListEnvelope: DeserializeOwned {
    type Item: DeserializeOwned;

    fn into_candidates(self) -> [Option<Vec<Self::Item>>; 4];
}

macro_rules! list_envelope {
    ($envelope:ident, $nested:ident, $item:ty, $plural:literal, $singular:literal) => {
        #[derive(Debug, Default, Deserialize)]
        pub(crate) struct $nested {
            #[serde(default, rename = $plural)]
            plural: Option<Vec<$item>>,
            #[serde(default, rename = $singular)]
            singular: Option<Vec<$item>>,
        }

        #[derive(Debug, Default, Deserialize)]
        pub(crate) struct $envelope {
            #[serde(default, rename = $plural)]
            plural: Option<Vec<$item>>,
            #[serde(default, rename = $singular)]
            singular: Option<Vec<$item>>,
            #[serde(default)]
            data: Option<$nested>,
        }

        impl ListEnvelope for $envelope {
            type Item = $item;

            fn into_candidates(self) -> [Option<Vec<$item>>; 4] {
                let data = self.data.unwrap_or_default();
                [self.plural, self.singular, data.plural, data.singular]
            }
        }
    };
}

list_envelope!(AccountList, AccountListData, AccountWire, "accounts", "account");
list_envelope!(BalanceList, BalanceListData, BalanceWire, "balances", "balance");
list_envelope!(
    TransactionList,
    TransactionListData,
    TransactionWire,
    "transactions",
    "transaction"
);
list_envelope!(ProductList, ProductListData, ProductWire, "products", "product");
list_envelope!(
    AgreementList,
    AgreementListData,
    AgreementWire,
    "agreements",
    "agreement"
);

/// Decode a list response, trying in order: a bare array, the plural field,
/// the singular field, then both under `data`. The first non-empty match
/// wins; an unrecognized shape yields an empty list.
pub(crate) fn decode_list<E: ListEnvelope>(body: &[u8]) -> Vec<E::Item> {
    if let Ok(items) = serde_json::from_slice::<Vec<E::Item>>(body) {
        if !items.is_empty() {
            return items;
        }
    }

    match serde_json::from_slice::<E>(body) {
        Ok(envelope) => envelope
            .into_candidates()
            .into_iter()
            .flatten()
            .find(|items| !items.is_empty())
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// Single object, optionally wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Enveloped<T> {
    Data { data: T },
    Bare(T),
}

impl<T> Enveloped<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Enveloped::Data { data } => data,
            Enveloped::Bare(inner) => inner,
        }
    }
}

// =========================================================================
// Lenient scalars
// =========================================================================

/// Decimal sent as a string or as a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum DecimalValue {
    Text(String),
    Number(serde_json::Number),
}

impl DecimalValue {
    pub(crate) fn to_decimal(&self) -> Decimal {
        match self {
            DecimalValue::Text(text) => parse_amount(text),
            DecimalValue::Number(number) => parse_amount(&number.to_string()),
        }
    }
}

/// Amount as a bare value or as `{ "amount": ..., "currency": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum AmountWire {
    Detailed {
        amount: DecimalValue,
        #[serde(default)]
        currency: Option<String>,
    },
    Scalar(DecimalValue),
}

impl AmountWire {
    pub(crate) fn value(&self) -> Decimal {
        match self {
            AmountWire::Detailed { amount, .. } => amount.to_decimal(),
            AmountWire::Scalar(amount) => amount.to_decimal(),
        }
    }

    pub(crate) fn currency(&self) -> Option<&str> {
        match self {
            AmountWire::Detailed { currency, .. } => currency.as_deref(),
            AmountWire::Scalar(_) => None,
        }
    }
}

fn amount_parts(amount: Option<&AmountWire>, currency: Option<String>) -> (Decimal, String) {
    let value = amount.map(AmountWire::value).unwrap_or(Decimal::ZERO);
    let currency = currency
        .filter(|c| !c.is_empty())
        .or_else(|| amount.and_then(AmountWire::currency).map(str::to_string))
        .unwrap_or_default();
    (value, currency)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::Many(items) => items.into_iter().next(),
            OneOrMany::One(item) => Some(item),
        }
    }
}

/// Account identification block (`{ schemeName, identification, name }`).
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AccountRefWire {
    #[serde(default)]
    pub identification: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Counterparty account, either a plain identifier or an identification block.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum PartyWire {
    Plain(String),
    Reference(AccountRefWire),
}

impl PartyWire {
    fn identification(self) -> String {
        match self {
            PartyWire::Plain(id) => id,
            PartyWire::Reference(reference) => reference.identification.unwrap_or_default(),
        }
    }
}

fn first_non_empty(candidates: impl IntoIterator<Item = Option<String>>) -> String {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_default()
}

/// Parse RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC) or a bare date.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    parse_date(raw).and_then(|date| date.and_hms_opt(0, 0, 0)).map(|naive| naive.and_utc())
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

// =========================================================================
// Consents
// =========================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ConsentRequestBody<'a> {
    pub requesting_bank: &'a str,
    pub client_id: &'a str,
    pub permissions: &'a [String],
    pub reason: &'a str,
    pub auto_approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<PaymentDetailsBody<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaymentDetailsBody<'a> {
    pub amount: String,
    pub currency: &'a str,
    pub debtor_account: &'a str,
    pub creditor_account: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<&'a str>,
}

impl<'a> From<&'a PaymentRequest> for PaymentDetailsBody<'a> {
    fn from(request: &'a PaymentRequest) -> Self {
        Self {
            amount: request.amount.to_string(),
            currency: &request.currency,
            debtor_account: &request.debtor_account,
            creditor_account: &request.creditor_account,
            reference: request.reference.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsentWire {
    #[serde(default, alias = "consentId")]
    consent_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "creationDateTime")]
    creation_date_time: Option<String>,
}

impl ConsentWire {
    pub(crate) fn into_domain(self, provider: &str, kind: ConsentKind) -> Consent {
        Consent {
            id: first_non_empty([self.consent_id, self.id]),
            kind,
            status: self.status.unwrap_or_default(),
            provider: provider.to_string(),
            created_at: self.creation_date_time.as_deref().and_then(parse_timestamp),
        }
    }
}

// =========================================================================
// Accounts
// =========================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct AccountWire {
    #[serde(default, alias = "accountId")]
    account_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, alias = "accountType")]
    account_type: Option<String>,
    #[serde(default, alias = "accountSubType")]
    account_sub_type: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "ownerName")]
    owner: Option<String>,
    #[serde(default)]
    account: Option<OneOrMany<AccountRefWire>>,
}

impl AccountWire {
    pub(crate) fn into_domain(self, provider: &str) -> Account {
        let reference = self.account.and_then(OneOrMany::into_first).unwrap_or_default();
        let id = first_non_empty([self.account_id, self.id]);

        Account {
            ext_id: first_non_empty([reference.identification, Some(id.clone())]),
            id,
            provider: provider.to_string(),
            account_type: first_non_empty([self.account_sub_type, self.account_type]),
            currency: self.currency.unwrap_or_default(),
            owner: first_non_empty([self.owner, reference.name]),
            nickname: self.nickname.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BalanceWire {
    #[serde(default, alias = "accountId")]
    account_id: Option<String>,
    #[serde(default, rename = "type", alias = "balance_type", alias = "balanceType")]
    balance_type: Option<String>,
    #[serde(default)]
    amount: Option<AmountWire>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, alias = "creditDebitIndicator")]
    credit_debit_indicator: Option<String>,
    #[serde(default, alias = "dateTime")]
    date_time: Option<String>,
}

impl BalanceWire {
    pub(crate) fn into_domain(self, provider: &str, account_id: &str) -> Balance {
        let (amount, currency) = amount_parts(self.amount.as_ref(), self.currency);
        Balance {
            account_id: first_non_empty([self.account_id, Some(account_id.to_string())]),
            balance_type: self.balance_type.unwrap_or_default(),
            amount: signed_amount(amount, self.credit_debit_indicator.as_deref()),
            currency,
            provider: provider.to_string(),
            as_of: self.date_time.as_deref().and_then(parse_timestamp),
        }
    }
}

// =========================================================================
// Transactions
// =========================================================================

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MerchantWire {
    #[serde(default, alias = "merchantName")]
    merchant_name: Option<String>,
    #[serde(default, alias = "merchantCategoryCode")]
    merchant_category_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TransactionCodeWire {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "subCode")]
    sub_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransactionWire {
    #[serde(default, alias = "transactionId")]
    transaction_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "accountId")]
    account_id: Option<String>,
    #[serde(default, alias = "bookingDateTime")]
    booking_date_time: Option<String>,
    #[serde(default, alias = "valueDateTime")]
    value_date_time: Option<String>,
    #[serde(default)]
    amount: Option<AmountWire>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, alias = "creditDebitIndicator")]
    credit_debit_indicator: Option<String>,
    #[serde(default, alias = "transactionInformation")]
    transaction_information: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "merchantDetails")]
    merchant_details: Option<MerchantWire>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "bankTransactionCode")]
    bank_transaction_code: Option<TransactionCodeWire>,
    #[serde(default)]
    status: Option<String>,
}

impl TransactionWire {
    pub(crate) fn into_domain(self, provider: &str, account_id: &str) -> Transaction {
        let (amount, currency) = amount_parts(self.amount.as_ref(), self.currency);
        let merchant = self.merchant_details.unwrap_or_default();
        let code = self.bank_transaction_code.unwrap_or_default();
        let date = self
            .booking_date_time
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| self.value_date_time.as_deref().and_then(parse_timestamp));

        Transaction {
            id: first_non_empty([self.transaction_id, self.id]),
            account_id: first_non_empty([self.account_id, Some(account_id.to_string())]),
            date,
            amount: signed_amount(amount, self.credit_debit_indicator.as_deref()),
            currency,
            merchant: merchant.merchant_name.unwrap_or_default(),
            category: first_non_empty([
                self.category,
                merchant.merchant_category_code,
                code.sub_code,
                code.code,
            ]),
            description: first_non_empty([self.transaction_information, self.description]),
            status: self.status.unwrap_or_default(),
            provider: provider.to_string(),
        }
    }
}

// =========================================================================
// Payments
// =========================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentBody<'a> {
    pub data: PaymentData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentData<'a> {
    pub initiation: PaymentInitiation<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaymentInitiation<'a> {
    pub instructed_amount: InstructedAmount<'a>,
    pub debtor_account: AccountIdentification<'a>,
    pub creditor_account: AccountIdentification<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InstructedAmount<'a> {
    pub amount: String,
    pub currency: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountIdentification<'a> {
    pub scheme_name: &'static str,
    pub identification: &'a str,
}

impl<'a> From<&'a PaymentRequest> for PaymentBody<'a> {
    fn from(request: &'a PaymentRequest) -> Self {
        let account = |identification: &'a str| AccountIdentification {
            scheme_name: "RU.CBR.PAN",
            identification,
        };
        PaymentBody {
            data: PaymentData {
                initiation: PaymentInitiation {
                    instructed_amount: InstructedAmount {
                        amount: request.amount.to_string(),
                        currency: &request.currency,
                    },
                    debtor_account: account(&request.debtor_account),
                    creditor_account: account(&request.creditor_account),
                    comment: request.reference.as_deref(),
                },
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InitiationWire {
    #[serde(default, alias = "instructedAmount")]
    instructed_amount: Option<AmountWire>,
    #[serde(default, alias = "debtorAccount")]
    debtor_account: Option<PartyWire>,
    #[serde(default, alias = "creditorAccount")]
    creditor_account: Option<PartyWire>,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentWire {
    #[serde(default, alias = "paymentId")]
    payment_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<AmountWire>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, alias = "debtorAccount")]
    debtor_account: Option<PartyWire>,
    #[serde(default, alias = "creditorAccount")]
    creditor_account: Option<PartyWire>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    initiation: Option<InitiationWire>,
    #[serde(default, alias = "creationDateTime")]
    creation_date_time: Option<String>,
}

impl PaymentWire {
    pub(crate) fn into_domain(self, provider: &str) -> Payment {
        let initiation = self.initiation.unwrap_or_default();
        let amount = self.amount.or(initiation.instructed_amount);
        let (amount, currency) = amount_parts(amount.as_ref(), self.currency);

        Payment {
            id: first_non_empty([self.payment_id, self.id]),
            status: self.status.unwrap_or_default(),
            amount,
            currency,
            debtor_account: self
                .debtor_account
                .or(initiation.debtor_account)
                .map(PartyWire::identification)
                .unwrap_or_default(),
            creditor_account: self
                .creditor_account
                .or(initiation.creditor_account)
                .map(PartyWire::identification)
                .unwrap_or_default(),
            reference: first_non_empty([self.reference, initiation.comment]),
            provider: provider.to_string(),
            created_at: self.creation_date_time.as_deref().and_then(parse_timestamp),
        }
    }
}

// =========================================================================
// Products & agreements
// =========================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ProductWire {
    #[serde(default, alias = "productId")]
    product_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "productType")]
    product_type: Option<String>,
    #[serde(default, alias = "productName")]
    product_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "interestRate")]
    interest_rate: Option<DecimalValue>,
    #[serde(default, alias = "minAmount")]
    min_amount: Option<DecimalValue>,
    #[serde(default, alias = "maxAmount")]
    max_amount: Option<DecimalValue>,
    #[serde(default, alias = "termMonths")]
    term_months: Option<u32>,
}

impl ProductWire {
    pub(crate) fn into_domain(self, provider: &str) -> Product {
        Product {
            id: first_non_empty([self.product_id, self.id]),
            product_type: self.product_type.unwrap_or_default(),
            name: first_non_empty([self.product_name, self.name]),
            description: self.description.unwrap_or_default(),
            interest_rate: self.interest_rate.as_ref().map(DecimalValue::to_decimal),
            min_amount: self.min_amount.as_ref().map(DecimalValue::to_decimal),
            max_amount: self.max_amount.as_ref().map(DecimalValue::to_decimal),
            term_months: self.term_months,
            provider: provider.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AgreementBody<'a> {
    pub product_id: &'a str,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_account_id: Option<&'a str>,
}

impl<'a> From<&'a AgreementRequest> for AgreementBody<'a> {
    fn from(request: &'a AgreementRequest) -> Self {
        Self {
            product_id: &request.product_id,
            amount: request.amount.to_string(),
            term_months: request.term_months,
            source_account_id: request.source_account_id.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgreementWire {
    #[serde(default, alias = "agreementId")]
    agreement_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "productId")]
    product_id: Option<String>,
    #[serde(default, alias = "productName")]
    product_name: Option<String>,
    #[serde(default, alias = "productType")]
    product_type: Option<String>,
    #[serde(default)]
    amount: Option<AmountWire>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "accountNumber")]
    account_number: Option<String>,
    #[serde(default, alias = "startDate")]
    start_date: Option<String>,
    #[serde(default, alias = "endDate")]
    end_date: Option<String>,
}

impl AgreementWire {
    pub(crate) fn into_domain(self, provider: &str) -> ProductAgreement {
        let (amount, currency) = amount_parts(self.amount.as_ref(), self.currency);
        ProductAgreement {
            id: first_non_empty([self.agreement_id, self.id]),
            product_id: self.product_id.unwrap_or_default(),
            product_name: self.product_name.unwrap_or_default(),
            product_type: self.product_type.unwrap_or_default(),
            amount,
            currency,
            status: self.status.unwrap_or_default(),
            account_number: self.account_number.unwrap_or_default(),
            start_date: self.start_date.as_deref().and_then(parse_date),
            end_date: self.end_date.as_deref().and_then(parse_date),
            provider: provider.to_string(),
        }
    }
}
