use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::MinorUnits;

pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

// Only `Completed` is written synchronously; the others are reserved for async payment flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Pending,
    Failed,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TransactionStatus::Completed),
            "pending" => Ok(TransactionStatus::Pending),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

// One balance mutation. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: Direction,
    pub amount: MinorUnits,
    pub description: String,
    pub external_reference: Option<String>,
    pub transfer_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Contribution of this record to the account balance.
    pub fn signed_amount(&self) -> MinorUnits {
        if self.status != TransactionStatus::Completed {
            return 0;
        }
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// A record as handed to the log; the log assigns id, sequence and timestamp.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: Uuid,
    pub direction: Direction,
    pub amount: MinorUnits,
    pub description: String,
    pub external_reference: Option<String>,
    pub transfer_id: Option<Uuid>,
    pub status: TransactionStatus,
}

impl NewTransaction {
    pub fn completed(account_id: Uuid, direction: Direction, amount: MinorUnits, description: &str) -> Self {
        Self {
            account_id,
            direction,
            amount,
            description: description.to_string(),
            external_reference: None,
            transfer_id: None,
            status: TransactionStatus::Completed,
        }
    }

    pub fn with_external_reference(mut self, reference: Option<&str>) -> Self {
        self.external_reference = reference.map(str::to_string);
        self
    }

    pub fn with_transfer_id(mut self, transfer_id: Option<Uuid>) -> Self {
        self.transfer_id = transfer_id;
        self
    }

    pub fn into_record(self, sequence: i64) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            account_id: self.account_id,
            direction: self.direction,
            amount: self.amount,
            description: self.description,
            external_reference: self.external_reference,
            transfer_id: self.transfer_id,
            status: self.status,
            sequence,
            created_at: Utc::now(),
        }
    }
}

/// Newest-first page request. `before` is the `sequence` cursor returned by the previous page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

impl PageRequest {
    pub fn first(limit: i64) -> Self {
        Self { before: None, limit: Some(limit) }
    }

    pub fn after_cursor(cursor: i64, limit: i64) -> Self {
        Self { before: Some(cursor), limit: Some(limit) }
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<i64>,
}

impl Page<TransactionRecord> {
    /// Build a page from up to `limit + 1` newest-first records; the extra one only signals more.
    pub fn from_overfetch(mut records: Vec<TransactionRecord>, limit: i64) -> Self {
        let limit = limit as usize;
        let has_more = records.len() > limit;
        records.truncate(limit);
        let next_cursor = if has_more {
            records.last().map(|r| r.sequence)
        } else {
            None
        };
        Self { items: records, next_cursor }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub amount: MinorUnits,
    pub description: String,
    pub external_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DebitRequest {
    pub amount: MinorUnits,
    pub description: String,
}
