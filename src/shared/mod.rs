pub mod broker;
pub mod constants;
pub mod display;
pub mod events;
pub mod http;
pub mod models;
pub mod resolver;
pub mod ui;
