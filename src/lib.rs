//! servctl: remote administration server.
//!
//! A session-oriented TCP command protocol (newline-delimited JSON
//! envelopes) backed by a flat-file account registry, plus a small web
//! console sharing the same credential predicates over HTTP. See the
//! `api` module for the protocol engine and `accounts` for the
//! credential/request stores.

pub mod accounts;
pub mod api;
pub mod config;
pub mod console;
pub mod files;
pub mod runner;
pub mod scripts;
pub mod telemetry;
