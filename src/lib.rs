pub mod absences;
pub mod api;
pub mod assistant;
pub mod bot;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod dates;
pub mod db;
pub mod error;
pub mod export;
pub mod interfaces;
pub mod ops;
pub mod providers;
pub mod reservations;
pub mod schema;
pub mod threads;
pub mod tools;

pub use crate::config::Config;
pub use crate::db::Database;
pub use crate::error::{BoxdeskError, Result};
