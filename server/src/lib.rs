pub extern crate actix_web;

pub mod app;
pub mod auth;
pub mod config;
pub mod connection;
pub mod connection_handle;
pub mod course;
pub mod dispatch;
pub mod handlers;
pub mod hub;
pub mod pump;
pub mod server_state;
pub mod session;
