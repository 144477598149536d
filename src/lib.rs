pub mod api;
pub mod auth;
pub mod chain;
pub mod chess;
pub mod config;
pub mod constants;
pub mod error;
pub mod lobby;
pub mod models;
pub mod poller;
pub mod settler;
