//! PostgreSQL implementation of the subscription store.
//!
//! One row per account. The `version` column backs the optimistic update
//! check that gives the reconciliation engine its per-account serialization
//! boundary: `UPDATE .. WHERE id = $1 AND version = $2` touching zero rows
//! means another writer got there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{Plan, SubscriptionRecord, SubscriptionStatus};
use crate::ports::SubscriptionStore;

/// PostgreSQL-backed subscription store.
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    /// Creates a store on the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, account_id, provider_customer_id, provider_subscription_id,
           status, plan, trial_start, trial_end, period_start, period_end,
           next_billing_date, amount_paid, currency, cancellation_date,
           cancellation_reason, last_payment_date, created_at, updated_at, version
    FROM subscriptions
"#;

/// Database row representation of a subscription record.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    account_id: String,
    provider_customer_id: Option<String>,
    provider_subscription_id: Option<String>,
    status: String,
    plan: String,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    next_billing_date: Option<DateTime<Utc>>,
    amount_paid: Option<i64>,
    currency: Option<String>,
    cancellation_date: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    last_payment_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionRecord {
            id: SubscriptionId::from_uuid(row.id),
            account_id: AccountId::new(row.account_id)
                .map_err(|e| DomainError::database(format!("Invalid account_id: {}", e)))?,
            provider_customer_id: row.provider_customer_id,
            provider_subscription_id: row.provider_subscription_id,
            status: parse_status(&row.status)?,
            plan: parse_plan(&row.plan)?,
            trial_start: row.trial_start.map(Timestamp::from_datetime),
            trial_end: row.trial_end.map(Timestamp::from_datetime),
            period_start: row.period_start.map(Timestamp::from_datetime),
            period_end: row.period_end.map(Timestamp::from_datetime),
            next_billing_date: row.next_billing_date.map(Timestamp::from_datetime),
            amount_paid: row.amount_paid,
            currency: row.currency,
            cancellation_date: row.cancellation_date.map(Timestamp::from_datetime),
            cancellation_reason: row.cancellation_reason,
            last_payment_date: row.last_payment_date.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            version: row.version,
        })
    }
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    match s {
        "pending" => Ok(SubscriptionStatus::Pending),
        "trial" => Ok(SubscriptionStatus::Trial),
        "active" => Ok(SubscriptionStatus::Active),
        "past_due" => Ok(SubscriptionStatus::PastDue),
        "cancelled" => Ok(SubscriptionStatus::Cancelled),
        "expired" => Ok(SubscriptionStatus::Expired),
        _ => Err(DomainError::database(format!("Invalid status value: {}", s))),
    }
}

fn parse_plan(s: &str) -> Result<Plan, DomainError> {
    match s {
        "trial" => Ok(Plan::Trial),
        "paid" => Ok(Plan::Paid),
        _ => Err(DomainError::database(format!("Invalid plan value: {}", s))),
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, account_id, provider_customer_id, provider_subscription_id,
                status, plan, trial_start, trial_end, period_start, period_end,
                next_billing_date, amount_paid, currency, cancellation_date,
                cancellation_reason, last_payment_date, created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                      $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.account_id.as_str())
        .bind(&record.provider_customer_id)
        .bind(&record.provider_subscription_id)
        .bind(record.status.as_str())
        .bind(record.plan.as_str())
        .bind(record.trial_start.map(|t| *t.as_datetime()))
        .bind(record.trial_end.map(|t| *t.as_datetime()))
        .bind(record.period_start.map(|t| *t.as_datetime()))
        .bind(record.period_end.map(|t| *t.as_datetime()))
        .bind(record.next_billing_date.map(|t| *t.as_datetime()))
        .bind(record.amount_paid)
        .bind(&record.currency)
        .bind(record.cancellation_date.map(|t| *t.as_datetime()))
        .bind(&record.cancellation_reason)
        .bind(record.last_payment_date.map(|t| *t.as_datetime()))
        .bind(*record.created_at.as_datetime())
        .bind(*record.updated_at.as_datetime())
        .bind(record.version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_account_id_key") {
                    return DomainError::validation(
                        "account_id",
                        "Account already has a subscription record",
                    );
                }
            }
            DomainError::database(format!("Failed to insert subscription: {}", e))
        })?;

        Ok(())
    }

    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                provider_customer_id = $3,
                provider_subscription_id = $4,
                status = $5,
                plan = $6,
                trial_start = $7,
                trial_end = $8,
                period_start = $9,
                period_end = $10,
                next_billing_date = $11,
                amount_paid = $12,
                currency = $13,
                cancellation_date = $14,
                cancellation_reason = $15,
                last_payment_date = $16,
                updated_at = $17,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.version)
        .bind(&record.provider_customer_id)
        .bind(&record.provider_subscription_id)
        .bind(record.status.as_str())
        .bind(record.plan.as_str())
        .bind(record.trial_start.map(|t| *t.as_datetime()))
        .bind(record.trial_end.map(|t| *t.as_datetime()))
        .bind(record.period_start.map(|t| *t.as_datetime()))
        .bind(record.period_end.map(|t| *t.as_datetime()))
        .bind(record.next_billing_date.map(|t| *t.as_datetime()))
        .bind(record.amount_paid)
        .bind(&record.currency)
        .bind(record.cancellation_date.map(|t| *t.as_datetime()))
        .bind(&record.cancellation_reason)
        .bind(record.last_payment_date.map(|t| *t.as_datetime()))
        .bind(*record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update subscription: {}", e)))?;

        if result.rows_affected() == 0 {
            // Distinguish a vanished row from a stale version.
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM subscriptions WHERE id = $1")
                    .bind(record.id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| DomainError::database(e.to_string()))?;

            return match exists {
                Some(_) => Err(DomainError::conflict(
                    "Subscription record changed since it was read",
                )),
                None => Err(DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    "Subscription record not found",
                )),
            };
        }

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(e.to_string()))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_by_account_id(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE account_id = $1", SELECT_COLUMNS))
                .bind(account_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(e.to_string()))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_by_provider_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE provider_subscription_id = $1",
            SELECT_COLUMNS
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(e.to_string()))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_by_provider_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE provider_customer_id = $1",
            SELECT_COLUMNS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(e.to_string()))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_trials_expired_before(
        &self,
        cutoff: Timestamp,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE status = 'trial' AND trial_end < $1 ORDER BY trial_end",
            SELECT_COLUMNS
        ))
        .bind(*cutoff.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(e.to_string()))?;

        rows.into_iter().map(SubscriptionRecord::try_from).collect()
    }

    async fn find_trials_ending_between(
        &self,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE status = 'trial' AND trial_end >= $1 AND trial_end < $2 ORDER BY trial_end",
            SELECT_COLUMNS
        ))
        .bind(*from.as_datetime())
        .bind(*until.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(e.to_string()))?;

        rows.into_iter().map(SubscriptionRecord::try_from).collect()
    }
}
