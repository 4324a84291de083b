//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into review and statistics use-cases.
//! - Keep the coordinator and CLI decoupled from storage details.

pub mod review_service;
pub mod stats_service;
