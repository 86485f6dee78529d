pub mod error;
pub mod models;
pub mod ports;
pub mod registry;
pub mod shape;
