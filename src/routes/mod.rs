mod auth;
mod health_check;

pub use auth::{refresh, register, LiveAuthService};
pub use health_check::health_check;
