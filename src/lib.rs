pub mod blob;
pub mod config;
pub mod database;
pub mod document;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;
