pub mod cache;
pub mod command;
pub mod controller;
pub mod engine;
pub mod memory;
pub mod models;
pub mod routes;
pub mod verification;
