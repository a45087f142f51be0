//! Core data types for the Myko metrics service

pub mod event;
pub mod filter;
pub mod record;
