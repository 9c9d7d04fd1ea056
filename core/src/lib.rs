pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod session;
pub mod state;
pub mod view;
