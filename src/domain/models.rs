//! Canonical domain model
//!
//! Provider-neutral entities returned by the aggregator. Provider wire
//! field names never leak past the adapter layer; everything here is tagged
//! with the provider code it came from.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =========================================================================
// Consents
// =========================================================================

/// What a consent authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentKind {
    Account,
    Payment,
    ProductAgreement,
}

impl ConsentKind {
    /// Provider resource collection for this kind of consent.
    pub fn resource(&self) -> &'static str {
        match self {
            ConsentKind::Account => "account-consents",
            ConsentKind::Payment => "payment-consents",
            ConsentKind::ProductAgreement => "product-agreement-consents",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentKind::Account => "account",
            ConsentKind::Payment => "payment",
            ConsentKind::ProductAgreement => "product_agreement",
        }
    }
}

impl fmt::Display for ConsentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "account" | "accounts" => Ok(ConsentKind::Account),
            "payment" | "payments" => Ok(ConsentKind::Payment),
            "product_agreement" | "product-agreement" | "agreement" => {
                Ok(ConsentKind::ProductAgreement)
            }
            other => Err(format!("unknown consent kind: {}", other)),
        }
    }
}

/// Consent as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub id: String,
    pub kind: ConsentKind,
    pub status: String,
    #[serde(rename = "bank")]
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

// =========================================================================
// Accounts, balances, transactions
// =========================================================================

/// Normalized bank account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// External identifier (account number / IBAN-like identification)
    pub ext_id: String,
    #[serde(rename = "bank")]
    pub provider: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub currency: String,
    pub owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nickname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
}

/// Normalized balance of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: String,
    /// Provider balance type (e.g. `InterimAvailable`, `ClosingBooked`)
    pub balance_type: String,
    /// Signed amount, negative when the provider reports a debit balance
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "bank")]
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

/// Normalized movement on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    /// Booking date; `None` when the provider sent nothing parseable
    pub date: Option<DateTime<Utc>>,
    /// Signed amount: negative = debit, positive = credit
    pub amount: Decimal,
    pub currency: String,
    pub merchant: String,
    pub category: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(rename = "bank")]
    pub provider: String,
}

impl Transaction {
    /// Calendar date of the booking, used by date filters.
    pub fn booking_date(&self) -> Option<NaiveDate> {
        self.date.map(|date| date.date_naive())
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

// =========================================================================
// Payments
// =========================================================================

/// Payment initiation parameters (also carried by the payment consent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub debtor_account: String,
    pub creditor_account: String,
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub reference: Option<String>,
}

impl PaymentRequest {
    pub fn new(
        debtor_account: impl Into<String>,
        creditor_account: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            debtor_account: debtor_account.into(),
            creditor_account: creditor_account.into(),
            amount,
            currency: default_currency(),
            reference: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

fn default_currency() -> String {
    "RUB".to_string()
}

/// Normalized payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub debtor_account: String,
    pub creditor_account: String,
    pub reference: String,
    #[serde(rename = "bank")]
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

// =========================================================================
// Products & agreements
// =========================================================================

/// A product a provider offers (deposit, loan, card...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub product_type: String,
    pub name: String,
    pub description: String,
    pub interest_rate: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub term_months: Option<u32>,
    #[serde(rename = "bank")]
    pub provider: String,
}

/// Parameters for opening a product agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementRequest {
    pub product_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub term_months: Option<u32>,
    #[serde(default)]
    pub source_account_id: Option<String>,
}

/// Normalized product agreement (contract).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAgreement {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_type: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub account_number: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(rename = "bank")]
    pub provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_consent_kind_parse() {
        assert_eq!("account".parse::<ConsentKind>(), Ok(ConsentKind::Account));
        assert_eq!("Payment".parse::<ConsentKind>(), Ok(ConsentKind::Payment));
        assert_eq!(
            "product-agreement".parse::<ConsentKind>(),
            Ok(ConsentKind::ProductAgreement)
        );
        assert!("loan".parse::<ConsentKind>().is_err());
    }

    #[test]
    fn test_consent_kind_resource() {
        assert_eq!(ConsentKind::Account.resource(), "account-consents");
        assert_eq!(
            ConsentKind::ProductAgreement.resource(),
            "product-agreement-consents"
        );
    }

    #[test]
    fn test_transaction_serializes_provider_as_bank() {
        let tx = Transaction {
            id: "tx-1".to_string(),
            account_id: "acc-1".to_string(),
            date: None,
            amount: dec!(-10.00),
            currency: "RUB".to_string(),
            merchant: String::new(),
            category: String::new(),
            description: String::new(),
            status: String::new(),
            provider: "vbank".to_string(),
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["bank"], "vbank");
        assert!(json.get("status").is_none());
        assert!(tx.is_debit());
    }

    #[test]
    fn test_payment_request_builder() {
        let request = PaymentRequest::new("acc-1", "acc-2", dec!(100))
            .with_currency("USD")
            .with_reference("rent");

        assert_eq!(request.currency, "USD");
        assert_eq!(request.reference.as_deref(), Some("rent"));
    }
}
