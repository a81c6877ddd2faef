pub mod app;
pub mod cli;
pub mod paths;
pub mod store;
