//! inbox-sweep: moves unnecessary Gmail inbox messages under a review label.

pub mod config;
pub mod error;
pub mod gmail;
pub mod llm;
pub mod logging;
pub mod normalizer;
pub mod pipeline;
pub mod retry;
