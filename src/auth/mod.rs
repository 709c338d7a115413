pub mod oauth;
pub mod routes;
pub mod store;
pub mod token;
