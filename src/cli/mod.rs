pub mod alloc;
pub mod dashboard;
pub mod export;
pub mod fx;
pub mod setup;
pub mod ui;
