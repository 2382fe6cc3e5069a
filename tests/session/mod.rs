//! Session lifecycle tests against in-memory collaborators.

mod listener_tests;
mod manager_tests;
