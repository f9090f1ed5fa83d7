//! Owner & Address API Library
//!
//! Customers, suppliers and employees each own at most one postal address.
//! This library validates and normalizes address data, completes it from
//! external postal-code and CNPJ registries (cached, with provider
//! fallback) and saves an owner together with its address atomically.
//!
//! # Modules
//!
//! - `api`: HTTP handlers.
//! - `core`: Domain models, normalization, validation and the save orchestrator.
//! - `data`: Database access and owner stores.
//! - `integrations`: Postal and registry providers, lookup cache.
//! - `cache_validator`: Checksummed cache entries.
//! - `circuit_breaker`: Per-provider circuit breakers.
//! - `config`: Configuration management.
//! - `db`: Database connection pool and schema.
//! - `db_storage`: Store traits and the Postgres implementation.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `lookup_cache`: TTL cache for lookup results.
//! - `memory_storage`: In-process store.
//! - `models`: Core data models.
//! - `normalizer`: Postal code, text and state normalization.
//! - `orchestrator`: Owner save state machine.
//! - `postal`: Postal-code lookup.
//! - `registry`: CNPJ registry lookup.
//! - `resolver`: Address completion from postal codes.
//! - `tax_id`: CPF/CNPJ check digits.
//! - `validation`: Owner field rules.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod lookup_cache;
pub mod memory_storage;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod postal;
pub mod registry;
pub mod resolver;
pub mod tax_id;
pub mod validation;
