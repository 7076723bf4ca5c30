use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;

/// Subscriber record owned by the bot side. Only the subscription fields are
/// touched here; anything else on the document is left as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub user_id: i64,

    #[serde(default)]
    pub has_paid_access: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_end: Option<bson::DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payment_date: Option<bson::DateTime>,
}
