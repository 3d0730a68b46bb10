//! LeadGraph Core - Configuration and domain types
//!
//! This crate holds everything the Graph access layer and its consumers
//! share without talking to the network:
//! - **Configuration** - YAML-backed [`config::Config`] with validation and a builder
//! - **Domain types** - access tokens, Graph object ids, pages, lead forms,
//!   leads and permission sets
//!
//! Nothing in here performs I/O beyond reading the configuration file.

pub mod config;
pub mod domain;
