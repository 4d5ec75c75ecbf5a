//! Case file ("fiche") workflow: permission matrix, lifecycle policy,
//! event-sourced case files and workshop sessions, with post-commit
//! notification and audit side effects.

pub mod config;
pub mod domain;
pub mod effects;
pub mod event_store;
pub mod guard;
pub mod service;
pub mod structured_logger;
