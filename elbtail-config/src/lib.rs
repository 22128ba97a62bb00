//! Configuration for the elbtail CLI.
//!
//! The configuration lives in a `config.yml` file within a config folder. Every section is
//! optional and falls back to its defaults. Values can be overridden from the command line or
//! the environment with [`OverridableConfig`].

#![warn(missing_docs)]

mod config;

pub use self::config::*;
