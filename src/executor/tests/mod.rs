//! Tests for the executor
//!
//! Organized by feature area

mod expression_tests;
mod helpers;
mod service_tests;
mod statement_tests;
