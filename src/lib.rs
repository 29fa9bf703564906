pub mod api;
pub mod collection;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod navigation;
pub mod push;
pub mod remote;
pub mod services;
pub mod state;
