//! HTTP exposure of the orchestrator's control surface (spec §6).

pub mod models;
pub mod rest;

pub use rest::RestApiServer;
