//! kvstore - a JSON key-value HTTP service over Tarantool
//!
//! Layers, outermost first:
//! - `http_server`: routes, request validation, status mapping
//! - `storage`: the key-value contract and its error taxonomy
//! - `document`: JSON document <-> `[key, value]` tuple codec
//! - `backend`: the tuple engine connection (Tarantool IPROTO or in-memory)

pub mod backend;
pub mod cli;
pub mod config;
pub mod document;
pub mod http_server;
pub mod observability;
pub mod storage;
