//! Core domain: configuration, authentication, persistence and the shelf API

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod shelf;
