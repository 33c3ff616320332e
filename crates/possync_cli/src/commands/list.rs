//! List command implementation.

use super::open_store;
use possync_core::{
    DeliveryOrder, Document, DocumentKind, Expense, Invoice, LocalStore, Payment, PendingQueue,
};
use std::path::Path;
use std::sync::Arc;

/// Runs the list command.
pub fn run(path: &Path, kind: DocumentKind) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(open_store(path)?);
    let records = pending_json(&store, kind)?;
    store.close()?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn pending_json(
    store: &Arc<LocalStore>,
    kind: DocumentKind,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    match kind {
        DocumentKind::Invoice => dump::<Invoice>(store),
        DocumentKind::Payment => dump::<Payment>(store),
        DocumentKind::Expense => dump::<Expense>(store),
        DocumentKind::DeliveryOrder => dump::<DeliveryOrder>(store),
    }
}

fn dump<D: Document>(store: &Arc<LocalStore>) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let records = PendingQueue::<D>::new(Arc::clone(store)).list_pending()?;
    Ok(serde_json::to_value(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::store_with;

    #[test]
    fn lists_one_kind_oldest_first() {
        let (_dir, path) = store_with(|store| {
            let invoices = PendingQueue::<Invoice>::new(Arc::clone(store));
            for number in ["1001", "1002"] {
                invoices
                    .enqueue(Invoice {
                        invoice_number: number.into(),
                        ..Invoice::default()
                    })
                    .unwrap();
            }
            PendingQueue::<Expense>::new(Arc::clone(store))
                .enqueue(Expense::default())
                .unwrap();
        });

        let store = Arc::new(open_store(&path).unwrap());
        let json = pending_json(&store, DocumentKind::Invoice).unwrap();
        let records = json.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["payload"]["factura"], "1001");
        assert_eq!(records[1]["payload"]["factura"], "1002");
        assert_eq!(records[0]["attempts"], 0);

        let deliveries = pending_json(&store, DocumentKind::DeliveryOrder).unwrap();
        assert!(deliveries.as_array().unwrap().is_empty());
    }
}
