//! Core generation pipeline: routing, pricing, credit accounting,
//! streaming, and provider health.

pub mod cost;
pub mod health;
pub mod ledger;
pub mod providers;
pub mod router;
pub mod streaming;
pub mod types;
