//! Builders for realistic payloads and snapshots.

use possync_core::{
    BusinessProfile, DeliveryOrder, Expense, FiscalAssignment, Invoice, Payment, Product,
    ShiftState,
};

const CASHIER: &str = "maria";
const REGISTER: &str = "caja-1";
const FISCAL_CODE: &str = "35D4A1-9F8E2B-7C6D5E-4F3A2B-1C0D9E-8F";
const DATE: &str = "2024-03-15 10:30:00";

/// An invoice for 150.00 with one line item.
pub fn invoice(number: &str) -> Invoice {
    Invoice {
        issued_at: DATE.into(),
        cashier: CASHIER.into(),
        register: REGISTER.into(),
        fiscal_code: FISCAL_CODE.into(),
        invoice_number: number.into(),
        customer: "Consumidor Final".into(),
        line_items: r#"[{"id":"1","cantidad":1,"precio":"130.43"}]"#.into(),
        subtotal: "130.43".into(),
        tax_15: "19.57".into(),
        tax_18: "0.00".into(),
        total: "150.00".into(),
    }
}

/// A cash payment against `invoice_number`.
pub fn payment(invoice_number: &str, amount: &str) -> Payment {
    Payment {
        invoice_number: invoice_number.into(),
        method: "efectivo".into(),
        amount: amount.into(),
        paid_at: DATE.into(),
        cashier: CASHIER.into(),
    }
}

/// A petty-cash expense.
pub fn expense(description: &str, amount: &str) -> Expense {
    Expense {
        description: description.into(),
        category: "insumos".into(),
        amount: amount.into(),
        spent_at: DATE.into(),
        cashier: CASHIER.into(),
        register: REGISTER.into(),
    }
}

/// A pending delivery order for `invoice_number`.
pub fn delivery(invoice_number: &str) -> DeliveryOrder {
    DeliveryOrder {
        invoice_number: invoice_number.into(),
        customer: "Juan Perez".into(),
        address: "Col. Palmira, Tegucigalpa".into(),
        phone: "9999-0000".into(),
        courier: "carlos".into(),
        status: "pendiente".into(),
        total: "150.00".into(),
        ordered_at: DATE.into(),
    }
}

/// A taxable catalog item.
pub fn product(id: &str, name: &str, price: &str) -> Product {
    Product {
        id: id.into(),
        name: name.into(),
        price: price.into(),
        tax_class: "15".into(),
        barcode: None,
        category: None,
    }
}

/// A business profile.
pub fn business_profile(name: &str) -> BusinessProfile {
    BusinessProfile {
        name: name.into(),
        rtn: "08011999000001".into(),
        address: "Tegucigalpa".into(),
        phone: "2222-0000".into(),
        email: None,
    }
}

/// A fiscal assignment for the default cashier.
pub fn fiscal_assignment(cai: &str) -> FiscalAssignment {
    FiscalAssignment {
        cai: cai.into(),
        range_from: "000-001-01-00000001".into(),
        range_to: "000-001-01-00005000".into(),
        deadline: "2024-12-31".into(),
        cashier: CASHIER.into(),
    }
}

/// Shift state for the default register.
pub fn shift_state(open: bool) -> ShiftState {
    ShiftState {
        open,
        cashier: CASHIER.into(),
        register: REGISTER.into(),
        opened_at: open.then(|| DATE.to_string()),
        opening_float: open.then(|| "500.00".to_string()),
    }
}
