//! Process wiring for the `tunestream` binary.
//!
//! One binary runs any of the five service roles, selected with
//! `TUNESTREAM_SERVICE`. [`config`] reads the environment, [`bootstrap`]
//! turns it into a router.

#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod config;

pub use bootstrap::{Service, build};
pub use config::{Config, ConfigError, ServiceRole};
