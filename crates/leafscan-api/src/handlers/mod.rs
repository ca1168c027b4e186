//! HTTP request handlers.

pub mod checkout;
pub mod health;
pub mod profile;
pub mod scan;
pub mod usage;
pub mod webhook;

pub use health::{health, ready};
