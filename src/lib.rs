//! Patient Portal API Library
//!
//! Backend-for-frontend for the patient portal: insurance profile storage,
//! auth-provider identity checks, marketplace plan quotes and an insurance
//! assistant chat backed by a hosted generative-text API.
//!
//! # Modules
//!
//! - `api`: Router assembly, middleware and OpenAPI document.
//! - `chat`: Chat orchestration (intent, plan summary, prompt, degradation).
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `generation`: Generative-text API client.
//! - `handlers`: HTTP request handlers and shared state.
//! - `identity`: Auth provider client.
//! - `marketplace`: Marketplace plan-quote client and normalization.
//! - `models`: Core data models.
//! - `profile_store`: Insurance profile persistence.
//! - `upstream`: Shared outbound HTTP helpers.

pub mod api;
pub mod chat;
pub mod config;
pub mod db;
pub mod errors;
pub mod generation;
pub mod handlers;
pub mod identity;
pub mod marketplace;
pub mod models;
pub mod profile_store;
pub mod upstream;
