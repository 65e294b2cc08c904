//! HTTP core of the forum: sessions, rate limiting, reactions and the access
//! gate in front of them.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod reactions;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod sweeper;

#[cfg(test)]
mod testutil;
