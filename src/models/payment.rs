use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use mongodb::bson;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Prepared,
    Completed,
}

/// One record per merchant transaction id. The amount is stored exactly as
/// the gateway sent it and never rewritten after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub merchant_trans_id: String,
    pub click_trans_id: String,
    pub amount: String,
    pub status: PaymentStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_paydoc_id: Option<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<bson::DateTime>,
}
