//! # mailsift core
//!
//! Runtime-agnostic logic for mailsift: message and sync models, body
//! normalization (markup extraction, boilerplate stripping, chunking), the
//! embedding and vector index traits, an in-memory index, and result ranking.
//!
//! This crate has no tokio, sqlx, network or filesystem dependencies. The
//! `mailsift` application crate wires these pieces to a real mailbox, real
//! embedding backends and durable storage.

pub mod chunk;
pub mod embedding;
pub mod html;
pub mod index;
pub mod models;
pub mod normalize;
pub mod rank;
