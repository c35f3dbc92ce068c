use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::models::{NewTransaction, TransactionRecord};

const TRANSACTION_COLUMNS: &str = "id, account_id, direction, amount, description, external_reference, transfer_id, status, sequence, created_at";

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: String,
    pub amount: i64,
    pub description: String,
    pub external_reference: Option<String>,
    pub transfer_id: Option<Uuid>,
    pub status: String,
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = String;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(TransactionRecord {
            id: row.id,
            account_id: row.account_id,
            direction: row.direction.parse()?,
            amount: row.amount,
            description: row.description,
            external_reference: row.external_reference,
            transfer_id: row.transfer_id,
            status: row.status.parse()?,
            sequence: row.sequence,
            created_at: row.created_at,
        })
    }
}

/// `SUM(BIGINT)` is `NUMERIC` in Postgres; kept unbounded so lifetime totals never overflow.
#[derive(Debug, FromRow)]
pub struct TotalsRow {
    pub credits: BigDecimal,
    pub debits: BigDecimal,
}

#[derive(Debug, FromRow)]
pub struct TransferTotalsRow {
    pub transfer_id: Uuid,
    pub debited_account_id: Uuid,
    pub debited: i64,
    pub credited: i64,
}

pub async fn insert(conn: &mut PgConnection, record: &NewTransaction) -> Result<TransactionRow, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "INSERT INTO transactions (id, account_id, direction, amount, description, external_reference, transfer_id, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {}",
        TRANSACTION_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(record.account_id)
    .bind(record.direction.as_str())
    .bind(record.amount)
    .bind(&record.description)
    .bind(&record.external_reference)
    .bind(record.transfer_id)
    .bind(record.status.as_str())
    .fetch_one(conn)
    .await
}

pub async fn fetch_by_external_reference(
    conn: &mut PgConnection,
    reference: &str,
) -> Result<Option<TransactionRow>, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions WHERE external_reference = $1",
        TRANSACTION_COLUMNS
    ))
    .bind(reference)
    .fetch_optional(conn)
    .await
}

/// Newest first, fetching one row beyond `limit` so the caller can tell whether more remain.
pub async fn fetch_page(
    conn: &mut PgConnection,
    account_id: Uuid,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<TransactionRow>, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions
         WHERE account_id = $1 AND ($2::BIGINT IS NULL OR sequence < $2)
         ORDER BY sequence DESC
         LIMIT $3",
        TRANSACTION_COLUMNS
    ))
    .bind(account_id)
    .bind(before)
    .bind(limit + 1)
    .fetch_all(conn)
    .await
}

pub async fn fetch_totals(conn: &mut PgConnection, account_id: Uuid) -> Result<TotalsRow, sqlx::Error> {
    sqlx::query_as::<_, TotalsRow>(
        "SELECT
             COALESCE(SUM(amount) FILTER (WHERE direction = 'credit'), 0)::NUMERIC AS credits,
             COALESCE(SUM(amount) FILTER (WHERE direction = 'debit'), 0)::NUMERIC AS debits
         FROM transactions
         WHERE account_id = $1 AND status = 'completed'",
    )
    .bind(account_id)
    .fetch_one(conn)
    .await
}

pub async fn fetch_transfer_legs(
    conn: &mut PgConnection,
    transfer_id: Uuid,
) -> Result<Vec<TransactionRow>, sqlx::Error> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions WHERE transfer_id = $1 ORDER BY sequence ASC",
        TRANSACTION_COLUMNS
    ))
    .bind(transfer_id)
    .fetch_all(conn)
    .await
}

pub async fn fetch_unbalanced_transfers(conn: &mut PgConnection) -> Result<Vec<TransferTotalsRow>, sqlx::Error> {
    sqlx::query_as::<_, TransferTotalsRow>(
        r#"
        SELECT
            transfer_id,
            (ARRAY_AGG(account_id ORDER BY sequence) FILTER (WHERE direction = 'debit'))[1] AS debited_account_id,
            COALESCE(SUM(amount) FILTER (WHERE direction = 'debit'), 0)::BIGINT AS debited,
            COALESCE(SUM(amount) FILTER (WHERE direction = 'credit'), 0)::BIGINT AS credited
        FROM transactions
        WHERE transfer_id IS NOT NULL AND status = 'completed'
        GROUP BY transfer_id
        HAVING COALESCE(SUM(amount) FILTER (WHERE direction = 'debit'), 0)
             > COALESCE(SUM(amount) FILTER (WHERE direction = 'credit'), 0)
        ORDER BY transfer_id
        "#,
    )
    .fetch_all(conn)
    .await
}
