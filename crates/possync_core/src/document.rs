//! Pending business documents.
//!
//! Monetary amounts travel as decimal strings exactly as the till produced
//! them; this crate never does arithmetic on them.

use crate::types::{EpochMillis, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of pending document. Each kind has its own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Sales invoice.
    Invoice,
    /// Payment against an invoice.
    Payment,
    /// Till expense.
    Expense,
    /// Delivery order.
    DeliveryOrder,
}

impl DocumentKind {
    /// All kinds, in synchronization order.
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Invoice,
        DocumentKind::Payment,
        DocumentKind::Expense,
        DocumentKind::DeliveryOrder,
    ];

    /// Name of the store collection backing this kind's queue.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Invoice => "pending_invoices",
            Self::Payment => "pending_payments",
            Self::Expense => "pending_expenses",
            Self::DeliveryOrder => "pending_deliveries",
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Payment => "payment",
            Self::Expense => "expense",
            Self::DeliveryOrder => "delivery",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" | "invoices" => Ok(Self::Invoice),
            "payment" | "payments" => Ok(Self::Payment),
            "expense" | "expenses" => Ok(Self::Expense),
            "delivery" | "deliveries" => Ok(Self::DeliveryOrder),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

/// A payload that can be queued for later delivery to the remote.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The queue this document belongs to.
    const KIND: DocumentKind;
}

/// Sales invoice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Invoice {
    /// Issue date-time, as printed.
    #[serde(rename = "fecha")]
    pub issued_at: String,
    /// Cashier user name.
    #[serde(rename = "cajero")]
    pub cashier: String,
    /// Register identifier.
    #[serde(rename = "caja")]
    pub register: String,
    /// Fiscal authorization code.
    #[serde(rename = "cai")]
    pub fiscal_code: String,
    /// Invoice number.
    #[serde(rename = "factura")]
    pub invoice_number: String,
    /// Customer name or tax id.
    #[serde(rename = "cliente")]
    pub customer: String,
    /// Serialized line items.
    #[serde(rename = "productos")]
    pub line_items: String,
    /// Subtotal before tax.
    #[serde(rename = "sub_total")]
    pub subtotal: String,
    /// 15% tax bucket.
    #[serde(rename = "isv_15")]
    pub tax_15: String,
    /// 18% tax bucket.
    #[serde(rename = "isv_18")]
    pub tax_18: String,
    /// Grand total.
    pub total: String,
}

impl Document for Invoice {
    const KIND: DocumentKind = DocumentKind::Invoice;
}

/// Payment received against an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Payment {
    /// Invoice number being paid.
    #[serde(rename = "factura")]
    pub invoice_number: String,
    /// Payment method (cash, card, transfer).
    #[serde(rename = "metodo")]
    pub method: String,
    /// Amount paid.
    #[serde(rename = "monto")]
    pub amount: String,
    /// Payment date-time.
    #[serde(rename = "fecha")]
    pub paid_at: String,
    /// Cashier user name.
    #[serde(rename = "cajero")]
    pub cashier: String,
}

impl Document for Payment {
    const KIND: DocumentKind = DocumentKind::Payment;
}

/// Expense paid out of the till.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Expense {
    /// Free-text description.
    #[serde(rename = "descripcion")]
    pub description: String,
    /// Expense category.
    #[serde(rename = "categoria")]
    pub category: String,
    /// Amount.
    #[serde(rename = "monto")]
    pub amount: String,
    /// Date-time.
    #[serde(rename = "fecha")]
    pub spent_at: String,
    /// Cashier user name.
    #[serde(rename = "cajero")]
    pub cashier: String,
    /// Register identifier.
    #[serde(rename = "caja")]
    pub register: String,
}

impl Document for Expense {
    const KIND: DocumentKind = DocumentKind::Expense;
}

/// Delivery order attached to an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryOrder {
    /// Invoice number.
    #[serde(rename = "factura")]
    pub invoice_number: String,
    /// Customer name.
    #[serde(rename = "cliente")]
    pub customer: String,
    /// Delivery address.
    #[serde(rename = "direccion")]
    pub address: String,
    /// Contact phone.
    #[serde(rename = "telefono")]
    pub phone: String,
    /// Assigned courier.
    #[serde(rename = "repartidor")]
    pub courier: String,
    /// Delivery status.
    #[serde(rename = "estado")]
    pub status: String,
    /// Order total.
    pub total: String,
    /// Order date-time.
    #[serde(rename = "fecha")]
    pub ordered_at: String,
}

impl Document for DeliveryOrder {
    const KIND: DocumentKind = DocumentKind::DeliveryOrder;
}

/// A document waiting in its queue, with retry metadata.
///
/// Only `payload` is ever sent to the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecord<D> {
    /// Store-assigned id.
    pub id: RecordId,
    /// The business document.
    pub payload: D,
    /// Creation time.
    pub timestamp: EpochMillis,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    /// Time of the most recent failed attempt.
    pub last_attempt_at: Option<EpochMillis>,
}

impl<D: Document> PendingRecord<D> {
    /// The queue this record lives in.
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        D::KIND
    }
}
