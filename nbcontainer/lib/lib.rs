//! `nbcontainer` packages the environment of a running notebook kernel into a container image
//! and publishes it, annotated with the notebook's inputs, to a container registry.
//!
//! # Overview
//!
//! A client opens a WebSocket and sends one containerization request. The service then:
//! - validates the request and resolves the notebook inside the notebook root
//! - checks that the destination repository exists
//! - copies the kernel's environment into a staged container, batch by batch, and commits it
//! - pushes the image, re-publishes its manifest with annotations under `latest`
//!
//! Every step is reported back over the socket and appended to a status log next to the
//! notebook. Only one containerization runs at a time.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Service configuration and its defaults
//! - [`coordinator`] - Single-flight sessions tying the pipelines together
//! - [`kernel`] - Resolving kernels to their interpreter environments
//! - [`pipeline`] - The image creation and image upload pipelines
//! - [`plan`] - What gets copied, in which batches, and whether it fits on disk
//! - [`registry`] - The destination registry client
//! - [`request`] - Containerization requests and their validation
//! - [`runtime`] - The container engine adapter
//! - [`server`] - HTTP and WebSocket endpoints
//! - [`status`] - Status log entries and the per-notebook status log
//! - [`utils`] - Shared helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod kernel;
pub mod pipeline;
pub mod plan;
pub mod registry;
pub mod request;
pub mod runtime;
pub mod server;
pub mod status;
pub mod utils;

pub use error::*;
