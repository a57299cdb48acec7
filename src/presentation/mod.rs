// Presentation layer - HTTP surface over the dashboard view model
pub mod app_state;
pub mod handlers;
pub mod render;
