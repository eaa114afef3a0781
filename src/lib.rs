pub mod api;
pub mod core;
pub mod market;
pub mod report;
