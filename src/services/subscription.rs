// services/subscription.rs
use chrono::{DateTime, Duration, Utc};
use mongodb::{
    bson::{self, doc},
    Collection, Database,
};
use tracing::info;

use crate::errors::{AppError, Result};
use crate::models::user::User;

/// Extract the Telegram user id from a merchant transaction id of the form
/// `TG_<user_id>_<timestamp>`. The first segment must be literally `TG`.
pub fn extract_user_id(merchant_trans_id: &str) -> Option<i64> {
    let mut parts = merchant_trans_id.split('_');
    if parts.next()? != "TG" {
        return None;
    }
    parts.next()?.parse().ok()
}

/// A running subscription is stacked on top of; an expired or absent one
/// starts fresh from `now`.
pub fn next_subscription_end(
    current_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    duration_months: u32,
) -> DateTime<Utc> {
    let extension = Duration::days(30 * i64::from(duration_months));
    match current_end {
        Some(end) if end > now => end + extension,
        _ => now + extension,
    }
}

/// Grant or extend paid access after a completed payment. Reports failure to
/// the caller instead of raising past its own boundary.
pub async fn update_user_subscription(
    db: &Database,
    user_id: i64,
    duration_months: u32,
) -> Result<()> {
    let users: Collection<User> = db.collection("users");

    let user = users
        .find_one(doc! { "user_id": user_id })
        .await?
        .ok_or(AppError::UserNotFound(user_id))?;

    let now = Utc::now();
    let new_end = next_subscription_end(
        user.subscription_end.map(|end| end.to_chrono()),
        now,
        duration_months,
    );

    users
        .update_one(
            doc! { "user_id": user_id },
            doc! { "$set": {
                "has_paid_access": true,
                "subscription_end": bson::DateTime::from_chrono(new_end),
                "last_payment_date": bson::DateTime::from_chrono(now),
            }},
        )
        .await?;

    info!("Updated subscription for user {} until {}", user_id, new_end);
    Ok(())
}
