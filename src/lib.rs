pub mod config;
pub mod error;
pub mod handlers;
pub mod locale;
pub mod models;
pub mod repositories;
pub mod router;
pub mod services;
pub mod state;
