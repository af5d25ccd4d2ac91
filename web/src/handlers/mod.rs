//! HTTP request handlers, one module per service role.

pub mod catalog;
pub mod gateway;
pub mod health;
pub mod notifications;
pub mod ratings;
pub mod subscriptions;

pub use health::health_check;
