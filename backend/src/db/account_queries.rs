use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::models::{Account, SubAccountPermissions};

const ACCOUNT_COLUMNS: &str = "id, owner_user_id, kind, status, balance, parent_account_id, label, permissions, created_at, updated_at";

#[derive(Debug, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub kind: String,
    pub status: String,
    pub balance: i64,
    pub parent_account_id: Option<Uuid>,
    pub label: Option<String>,
    pub permissions: Option<Json<SubAccountPermissions>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = String;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            owner_user_id: row.owner_user_id,
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            balance: row.balance,
            parent_account_id: row.parent_account_id,
            label: row.label,
            permissions: row.permissions.map(|p| p.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn fetch_one(conn: &mut PgConnection, id: Uuid) -> Result<Option<AccountRow>, sqlx::Error> {
    sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {} FROM accounts WHERE id = $1",
        ACCOUNT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_primary_for_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<AccountRow>, sqlx::Error> {
    sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {} FROM accounts WHERE owner_user_id = $1 AND kind = 'primary'",
        ACCOUNT_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_sub_accounts(
    conn: &mut PgConnection,
    owner_account_id: Uuid,
) -> Result<Vec<AccountRow>, sqlx::Error> {
    sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {} FROM accounts
         WHERE parent_account_id = $1 AND kind = 'sub'
         ORDER BY created_at ASC, id ASC",
        ACCOUNT_COLUMNS
    ))
    .bind(owner_account_id)
    .fetch_all(conn)
    .await
}

pub async fn fetch_all_ids(conn: &mut PgConnection) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM accounts ORDER BY id")
        .fetch_all(conn)
        .await
}

/// Row-level `FOR UPDATE` locks, taken in id order.
pub async fn lock_for_update(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(ids)
    .fetch_all(conn)
    .await
}

pub async fn insert(conn: &mut PgConnection, account: &Account) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO accounts (id, owner_user_id, kind, status, balance, parent_account_id, label, permissions, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(account.id)
    .bind(account.owner_user_id)
    .bind(account.kind.as_str())
    .bind(account.status.as_str())
    .bind(account.balance)
    .bind(account.parent_account_id)
    .bind(&account.label)
    .bind(account.permissions.map(Json))
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_balance(conn: &mut PgConnection, id: Uuid, balance: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE accounts SET balance = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(balance)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn update_metadata(conn: &mut PgConnection, account: &Account) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE accounts
         SET status = $2, label = $3, permissions = $4, updated_at = NOW()
         WHERE id = $1",
    )
    .bind(account.id)
    .bind(account.status.as_str())
    .bind(&account.label)
    .bind(account.permissions.map(Json))
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
