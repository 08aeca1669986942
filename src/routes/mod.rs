pub mod classify;
pub mod health;
pub mod history;
pub mod metrics;
