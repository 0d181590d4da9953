//! groupgate web server.
//!
//! Signs users in against a Microsoft Entra tenant, derives roles from
//! their group membership and guards routes by those roles.

pub mod app;
pub mod auth;
pub mod config;
