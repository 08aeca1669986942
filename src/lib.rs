//! Livestock Breed Classification Core
//!
//! This library implements the classification submission pipeline (image
//! acquisition, async analysis against an external classifier service, progress
//! and cancellation) and the in-session classification history store with
//! filtering, sorting and export.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
