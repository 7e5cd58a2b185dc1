//! Ledger entities: customers, dishes, debts, payments.
//!
//! Field sets mirror the hosted store's `usuarios` / `platos` / `deudas` /
//! `pagos` tables. Timestamps stay as RFC 3339 strings on the models; they
//! are only parsed at the reporting layer, which has a defined fallback for
//! malformed values.

use serde::{Deserialize, Serialize};

use crate::money::Cents;

// ---------------------------------------------------------------------------
// Customer
// ---------------------------------------------------------------------------

/// A person who can owe money (customer) or collect it (admin/staff).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Company/affiliation, used for filtering in the admin views.
    pub company: Option<String>,
    pub is_admin: bool,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

// ---------------------------------------------------------------------------
// Dish (catalog item)
// ---------------------------------------------------------------------------

/// A priced catalog item customers can be charged for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: String,
    pub name: String,
    pub price: Cents,
    pub photo_url: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDish {
    pub name: String,
    pub price: Cents,
    #[serde(default)]
    pub photo_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Debt
// ---------------------------------------------------------------------------

/// One consumption event charged to a customer.
///
/// `amount` is fixed at registration; `balance` only ever decreases, via
/// settlement, and stays within `0..=amount`. `version` is bumped on every
/// balance update so concurrent settlements cannot double-allocate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debt {
    pub id: String,
    pub debtor_id: String,
    /// Admin who registered the consumption.
    pub registered_by: String,
    pub dish_id: Option<String>,
    /// The dish's price at the moment of the charge. Later catalog edits do
    /// not reach back into historical debts.
    pub dish_price: Option<Cents>,
    pub amount: Cents,
    pub balance: Cents,
    pub description: Option<String>,
    pub active: bool,
    pub version: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDebt {
    pub debtor_id: String,
    pub registered_by: String,
    #[serde(default)]
    pub dish_id: Option<String>,
    /// Explicit charge amount. When omitted and a dish is referenced, the
    /// dish's current price is used.
    #[serde(default)]
    pub amount: Option<Cents>,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

/// Whether a payment fully settles its debt or leaves a remaining balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Full,
    Partial,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Full => "full",
            PaymentKind::Partial => "partial",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "full" => PaymentKind::Full,
            _ => PaymentKind::Partial,
        }
    }
}

/// One immutable unit of money applied to exactly one debt.
///
/// Append-only audit trail: never updated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub debtor_id: String,
    /// Admin who received the cash.
    pub collector_id: String,
    pub debt_id: String,
    pub amount: Cents,
    pub kind: PaymentKind,
    pub method: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub debtor_id: String,
    pub collector_id: String,
    pub debt_id: String,
    pub amount: Cents,
    pub kind: PaymentKind,
    /// Defaults to "cash" when omitted.
    #[serde(default)]
    pub method: Option<String>,
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Inclusive calendar-date range for history and reporting queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_kind_round_trip() {
        assert_eq!(PaymentKind::Full.as_str(), "full");
        assert_eq!(PaymentKind::from_string("full"), PaymentKind::Full);
        assert_eq!(PaymentKind::from_string("partial"), PaymentKind::Partial);
        // Unknown classifications read back as partial, the conservative choice.
        assert_eq!(PaymentKind::from_string("completo"), PaymentKind::Partial);
    }

    #[test]
    fn test_model_json_shape() {
        let payment = Payment {
            id: "pay-1".into(),
            debtor_id: "cust-1".into(),
            collector_id: "admin-1".into(),
            debt_id: "debt-1".into(),
            amount: Cents(5000),
            kind: PaymentKind::Full,
            method: "cash".into(),
            created_at: "2024-01-03T12:00:00+00:00".into(),
        };
        let json = serde_json::to_value(&payment).unwrap();
        assert_eq!(json["debtorId"], "cust-1");
        assert_eq!(json["amount"], 5000);
        assert_eq!(json["kind"], "full");
    }
}
