pub mod batch;
pub mod fetch;
pub mod setup;
pub mod ui;
pub mod watch;
