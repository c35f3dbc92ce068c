pub mod account_queries;
pub mod transaction_queries;
