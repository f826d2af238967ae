mod app;
mod config;
mod logging;
mod profile;

pub use app::run_from_args;
