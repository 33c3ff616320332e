//! Property-based test generators using proptest.

use possync_core::{DocumentKind, Invoice, Product, ReferenceKind};
use proptest::prelude::*;

/// Strategy for money amounts formatted with two decimals.
pub fn amount_strategy() -> impl Strategy<Value = String> {
    (0u32..1_000_000).prop_map(|cents| format!("{}.{:02}", cents / 100, cents % 100))
}

/// Strategy for invoice numbers.
pub fn invoice_number_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for invoices with random number, customer and total.
pub fn invoice_strategy() -> impl Strategy<Value = Invoice> {
    (
        invoice_number_strategy(),
        prop::string::string_regex("[A-Za-z ]{0,24}").expect("Invalid regex"),
        amount_strategy(),
    )
        .prop_map(|(number, customer, total)| Invoice {
            invoice_number: number,
            customer,
            total,
            ..Invoice::default()
        })
}

/// Strategy for catalog items with unique-ish ids.
pub fn product_strategy() -> impl Strategy<Value = Product> {
    (
        prop::string::string_regex("[A-Z0-9]{1,6}").expect("Invalid regex"),
        prop::string::string_regex("[a-z]{1,12}").expect("Invalid regex"),
        amount_strategy(),
    )
        .prop_map(|(id, name, price)| Product {
            id,
            name,
            price,
            ..Product::default()
        })
}

/// Strategy for a document kind.
pub fn document_kind_strategy() -> impl Strategy<Value = DocumentKind> {
    prop::sample::select(DocumentKind::ALL.to_vec())
}

/// Strategy for a reference kind.
pub fn reference_kind_strategy() -> impl Strategy<Value = ReferenceKind> {
    prop::sample::select(ReferenceKind::ALL.to_vec())
}

/// A step in a queue workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOp {
    /// Enqueue a new record.
    Enqueue,
    /// Remove the n-th oldest pending record, if any.
    RemoveNth(usize),
    /// Record a failed attempt on the n-th oldest pending record, if any.
    FailNth(usize),
}

/// Strategy for queue workloads.
pub fn queue_ops_strategy(max_ops: usize) -> impl Strategy<Value = Vec<QueueOp>> {
    prop::collection::vec(
        prop_oneof![
            3 => Just(QueueOp::Enqueue),
            1 => (0usize..8).prop_map(QueueOp::RemoveNth),
            1 => (0usize..8).prop_map(QueueOp::FailNth),
        ],
        0..max_ops,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn amounts_have_two_decimals(amount in amount_strategy()) {
            let (_, cents) = amount.split_once('.').unwrap();
            prop_assert_eq!(cents.len(), 2);
        }

        #[test]
        fn invoice_numbers_are_digits(number in invoice_number_strategy()) {
            prop_assert!(!number.is_empty());
            prop_assert!(number.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
