pub mod config;
pub mod duck;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod process;
