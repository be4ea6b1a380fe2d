//! Library crate for live-match-companion, exposing modules for binaries and tests.

pub mod cache;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod provider;
pub mod routes;
pub mod services;
pub mod state;
