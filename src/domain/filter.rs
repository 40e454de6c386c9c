//! Query filters
//!
//! Provider selection and the inclusive booking-date window applied to
//! aggregated transactions.

use chrono::NaiveDate;

use super::models::Transaction;

/// Which providers a read should touch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProviderFilter {
    /// Every configured provider, failures tolerated per provider
    #[default]
    All,
    /// One provider; its errors propagate
    Only(String),
}

impl ProviderFilter {
    /// Interpret a `bank` query parameter. Absent, empty and `all` mean every provider.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => ProviderFilter::All,
            Some(code) if code.eq_ignore_ascii_case("all") => ProviderFilter::All,
            Some(code) => ProviderFilter::Only(code.to_string()),
        }
    }

    pub fn only(code: impl Into<String>) -> Self {
        ProviderFilter::Only(code.into())
    }
}

/// Inclusive `[from, to]` window over booking dates. Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self::new(Some(from), Some(to))
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    /// Keep transactions booked inside the window.
    ///
    /// With any bound set, transactions without a parseable date are dropped.
    pub fn retain(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        if self.is_unbounded() {
            return transactions;
        }
        transactions
            .into_iter()
            .filter(|tx| tx.booking_date().map_or(false, |date| self.contains(date)))
            .collect()
    }
}
