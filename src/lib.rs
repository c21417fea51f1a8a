pub mod auth;
pub mod configuration;
pub mod email_client;
pub mod error;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod telemetry;
pub mod validators;
