pub mod access;
pub mod handlers;
pub mod routes;
