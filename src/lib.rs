//! Blockchain Queue Worker Library
//!
//! Consumes blockchain registry jobs from RabbitMQ, executes them through the
//! offchain registry API with capped exponential backoff, dead-letters jobs
//! that fail terminally, and reports settled transactions to the
//! orchestrator. It includes:
//!
//! - Environment driven configuration
//! - A self-healing broker connection with automatic consumption resume
//! - Exactly one acknowledgement decision per delivery
//! - Best-effort orchestrator webhooks and periodic statistics
//!
//! # Module Structure
//!
//! - `bootstrap`: Component wiring, startup gate, shutdown
//! - `config`: Configuration management
//! - `constants`: Defaults and API routes
//! - `jobs`: Job model, retry engine, statistics
//! - `logging`: Logger setup and job event lines
//! - `models`: Results, errors, webhook payloads
//! - `queue`: Broker seam, RabbitMQ session, consumer, dead-lettering
//! - `services`: Offchain API executor and orchestrator webhook
//! - `utils`: Common utilities and helper functions

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod queue;
pub mod services;
pub mod utils;
