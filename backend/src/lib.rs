pub mod app;
pub mod config;
pub mod db;
pub mod errors;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use state::AppState;
