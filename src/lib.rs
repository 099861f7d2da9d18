//! Misrecognition correction for Japanese text produced by OCR.
//!
//! Photographed book pages come out of an OCR engine with a predictable
//! family of errors: visually confusable kanji, dropped sokuon and long-vowel
//! marks, missing particles, and mis-segmented compounds. This crate runs a
//! cascade of deterministic and statistical correctors over the raw text,
//! validates every accepted edit against a safety net, and falls back to a
//! cloud language model (with caching, a daily quota, and bounded retry) only
//! when local confidence stays low.

#![warn(missing_docs)]

pub use anyhow::{Error, Result};

pub mod cache;
pub mod confidence;
pub mod config;
pub mod detectors;
pub mod patterns;
pub mod pipeline;
pub mod quota;
pub mod remote;
pub mod suggestion;
pub mod text;
pub mod tokenizer;
pub mod validator;
