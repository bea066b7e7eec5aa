//! Terminal user interface.

pub mod app;
pub mod events;
pub mod ui;

pub use app::App;
