pub mod client;
pub mod guilds;
pub mod models;
pub mod routes;
