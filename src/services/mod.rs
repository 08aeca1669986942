pub mod acquire;
pub mod classifier;
pub mod controller;
pub mod history;
