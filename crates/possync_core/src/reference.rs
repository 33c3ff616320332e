//! Reference data snapshots.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key under which single-row kinds store their only entry.
pub const SINGLETON_KEY: &str = "current";

/// Kind of cached reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Product catalog, one entry per product.
    ProductCatalog,
    /// The business profile.
    BusinessProfile,
    /// The cashier's fiscal sequence assignment.
    FiscalAssignment,
    /// Whether a shift is open, and its opening data.
    ShiftOpenState,
}

impl ReferenceKind {
    /// All kinds.
    pub const ALL: [ReferenceKind; 4] = [
        ReferenceKind::ProductCatalog,
        ReferenceKind::BusinessProfile,
        ReferenceKind::FiscalAssignment,
        ReferenceKind::ShiftOpenState,
    ];

    /// Name of the store collection backing this kind.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::ProductCatalog => "catalog_cache",
            Self::BusinessProfile => "business_cache",
            Self::FiscalAssignment => "fiscal_cache",
            Self::ShiftOpenState => "shift_cache",
        }
    }

    /// True for kinds holding at most one entry.
    #[must_use]
    pub const fn is_single_row(self) -> bool {
        !matches!(self, Self::ProductCatalog)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProductCatalog => "catalog",
            Self::BusinessProfile => "business",
            Self::FiscalAssignment => "fiscal",
            Self::ShiftOpenState => "shift",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "catalog" | "products" => Ok(Self::ProductCatalog),
            "business" => Ok(Self::BusinessProfile),
            "fiscal" | "cai" => Ok(Self::FiscalAssignment),
            "shift" => Ok(Self::ShiftOpenState),
            other => Err(format!("unknown reference kind: {other}")),
        }
    }
}

/// A cacheable snapshot of reference data.
pub trait Reference: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Which cache this snapshot lives in.
    const KIND: ReferenceKind;

    /// Cache key. Single-row kinds use [`SINGLETON_KEY`].
    fn cache_key(&self) -> String {
        SINGLETON_KEY.to_string()
    }
}

/// One product of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Product {
    /// Product id.
    pub id: String,
    /// Display name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Unit price.
    #[serde(rename = "precio")]
    pub price: String,
    /// Tax class.
    #[serde(rename = "isv")]
    pub tax_class: String,
    /// Barcode, if any.
    #[serde(rename = "codigo_barras", default)]
    pub barcode: Option<String>,
    /// Category.
    #[serde(rename = "categoria", default)]
    pub category: Option<String>,
}

impl Reference for Product {
    const KIND: ReferenceKind = ReferenceKind::ProductCatalog;

    fn cache_key(&self) -> String {
        self.id.clone()
    }
}

/// Business profile printed on invoices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusinessProfile {
    /// Trade name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Tax registration number.
    pub rtn: String,
    /// Address.
    #[serde(rename = "direccion")]
    pub address: String,
    /// Phone.
    #[serde(rename = "telefono")]
    pub phone: String,
    /// Email.
    #[serde(rename = "correo", default)]
    pub email: Option<String>,
}

impl Reference for BusinessProfile {
    const KIND: ReferenceKind = ReferenceKind::BusinessProfile;
}

/// Fiscal authorization code and invoice-number range.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FiscalAssignment {
    /// Authorization code (CAI).
    pub cai: String,
    /// First invoice number of the range.
    #[serde(rename = "rango_desde")]
    pub range_from: String,
    /// Last invoice number of the range.
    #[serde(rename = "rango_hasta")]
    pub range_to: String,
    /// Last legal issue date.
    #[serde(rename = "fecha_limite")]
    pub deadline: String,
    /// Cashier the range is assigned to.
    #[serde(rename = "cajero")]
    pub cashier: String,
}

impl Reference for FiscalAssignment {
    const KIND: ReferenceKind = ReferenceKind::FiscalAssignment;
}

/// Shift-open state of the register.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShiftState {
    /// Whether a shift is open.
    #[serde(rename = "abierto")]
    pub open: bool,
    /// Cashier on shift.
    #[serde(rename = "cajero")]
    pub cashier: String,
    /// Register.
    #[serde(rename = "caja")]
    pub register: String,
    /// Opening date-time.
    #[serde(rename = "apertura", default)]
    pub opened_at: Option<String>,
    /// Opening float.
    #[serde(rename = "fondo_inicial", default)]
    pub opening_float: Option<String>,
}

impl Reference for ShiftState {
    const KIND: ReferenceKind = ReferenceKind::ShiftOpenState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_catalog_is_multi_row() {
        let multi: Vec<_> = ReferenceKind::ALL
            .into_iter()
            .filter(|k| !k.is_single_row())
            .collect();
        assert_eq!(multi, vec![ReferenceKind::ProductCatalog]);
    }

    #[test]
    fn cache_keys() {
        let product = Product {
            id: "sku-7".into(),
            ..Product::default()
        };
        assert_eq!(product.cache_key(), "sku-7");
        assert_eq!(BusinessProfile::default().cache_key(), SINGLETON_KEY);
    }

    #[test]
    fn product_decodes_from_remote_field_names() {
        let remote: std::collections::BTreeMap<&str, &str> = [
            ("id", "1"),
            ("nombre", "Cafe"),
            ("precio", "25.00"),
            ("isv", "15"),
        ]
        .into_iter()
        .collect();

        let bytes = crate::codec::to_cbor(&remote).unwrap();
        let product: Product = crate::codec::from_cbor(&bytes).unwrap();
        assert_eq!(product.name, "Cafe");
        assert_eq!(product.barcode, None);
    }
}
