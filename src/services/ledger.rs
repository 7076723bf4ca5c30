// services/ledger.rs
use chrono::Utc;
use mongodb::{
    bson::{self, doc},
    Collection, Database,
};
use tracing::info;

use crate::errors::Result;
use crate::models::payment::{Payment, PaymentStatus};

/// What a prepare callback should do given the stored record, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareDecision {
    /// No record yet, insert one with status `prepared`.
    Create,
    /// Record exists with the same amount, answer success without touching it.
    AlreadyPrepared,
    /// Record exists but the amount differs, reject without mutating.
    AmountMismatch,
}

/// Amounts are compared as exact strings. Parsing to float here would let
/// "10000" and "10000.0" collide or drift, so we don't.
pub fn arbitrate_prepare(existing: Option<&Payment>, amount: &str) -> PrepareDecision {
    match existing {
        None => PrepareDecision::Create,
        Some(payment) if payment.amount == amount => PrepareDecision::AlreadyPrepared,
        Some(_) => PrepareDecision::AmountMismatch,
    }
}

/// Typed access to the `payments` collection.
pub struct PaymentLedger {
    payments: Collection<Payment>,
}

impl PaymentLedger {
    pub fn new(db: &Database) -> Self {
        PaymentLedger {
            payments: db.collection("payments"),
        }
    }

    pub async fn find(&self, merchant_trans_id: &str) -> Result<Option<Payment>> {
        let payment = self
            .payments
            .find_one(doc! { "merchant_trans_id": merchant_trans_id })
            .await?;
        Ok(payment)
    }

    pub async fn insert_prepared(
        &self,
        merchant_trans_id: &str,
        click_trans_id: &str,
        amount: &str,
    ) -> Result<Payment> {
        let payment = Payment {
            id: None,
            merchant_trans_id: merchant_trans_id.to_string(),
            click_trans_id: click_trans_id.to_string(),
            amount: amount.to_string(),
            status: PaymentStatus::Prepared,
            click_paydoc_id: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.payments.insert_one(&payment).await?;
        info!("Registered prepared payment {}", merchant_trans_id);
        Ok(payment)
    }

    /// Atomic prepared → completed transition. The filter excludes already
    /// completed records, so two concurrent completes for the same id can
    /// never both observe a transition; the loser gets `None`.
    pub async fn complete_if_pending(
        &self,
        merchant_trans_id: &str,
        click_paydoc_id: &str,
    ) -> Result<Option<Payment>> {
        let transitioned = self
            .payments
            .find_one_and_update(
                doc! {
                    "merchant_trans_id": merchant_trans_id,
                    "status": { "$ne": "completed" },
                },
                doc! {
                    "$set": {
                        "status": "completed",
                        "click_paydoc_id": click_paydoc_id,
                        "completed_at": bson::DateTime::now(),
                    },
                },
            )
            .await?;

        if transitioned.is_some() {
            info!("Payment {} marked completed", merchant_trans_id);
        }
        Ok(transitioned)
    }
}
