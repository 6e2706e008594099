mod admin;
mod agents;
mod audit_logs;
mod auth_routes;
mod chunks;
mod documents;
pub mod dto;
mod folders;
pub mod response;
mod router;
mod search;
mod shares;
pub mod validation;
mod versions;

pub use router::{AppState, create_router};
