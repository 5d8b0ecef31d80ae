extern crate self as twamm_sim;

pub mod error;
pub mod gas;
pub mod market;
pub mod precision;
pub mod report;
pub mod sim;
pub mod stats;
pub mod types;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
