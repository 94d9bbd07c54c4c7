//! Card Advisor Intake Library
//!
//! A scripted credit-card intake: a fixed seven-question dialog collects a
//! preference profile, one LLM request turns it into a single-card
//! recommendation, and each conversation is recorded in a relational store.
//!
//! # Modules
//!
//! - `api`: Router, middleware and API docs.
//! - `core`: Dialog, recommendation logic, models and errors.
//! - `integrations`: LLM client and conversation store backends.
//! - `obs`: Observability and logging.
//! - `config`: Configuration management.
//! - `conversation_store`: Conversation record persistence.
//! - `db`: Database connection and schema setup.
//! - `dialog`: Intake dialog state machine.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `llm_client`: Text-generation client.
//! - `models`: Core data models.
//! - `recommendation`: Prompt building, reply parsing and fallbacks.

pub mod api;
pub mod core;
pub mod integrations;
pub mod obs;

pub mod config;
pub mod conversation_store;
pub mod db;
pub mod dialog;
pub mod errors;
pub mod handlers;
pub mod llm_client;
pub mod models;
pub mod recommendation;
