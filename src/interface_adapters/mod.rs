pub mod analytics;
pub mod clients;
pub mod handlers;
pub mod identity;
pub mod pg;
pub mod protocol;
pub mod routes;
pub mod state;
