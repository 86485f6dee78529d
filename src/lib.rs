pub mod application;
pub mod config;
pub mod context;
pub mod domain;
pub mod file_loader;
pub mod http_service;
pub mod infrastructure;
