pub mod common;

mod resource_state_tests;
mod summary_tests;
