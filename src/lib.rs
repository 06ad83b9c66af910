//! Core library for the launch-sniper project.
//!
//! `dispatch` holds the buy pipeline and its collaborator traits; `chain`
//! implements those traits against a live node.

pub mod chain;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod models;
pub mod utils;
