//! REST API endpoint tests.

mod health_tests;
mod session_tests;
