//! The document transformation stages.
//!
//! Each stage is a narrow struct over an open [`session::DocumentSession`]:
//!
//! * [`pages`] — boundary-page extraction
//! * [`geometry`] — block indexing and match predicates
//! * [`redact`] — opaque covering of matched blocks
//! * [`rewrite`] — text replacement, insertion, and header stamping
//! * [`images`] — image placement resolution, replacement, and extraction
//!
//! Stages never talk to each other; the orchestrator sequences them and
//! persists between structural mutations so every stage starts from a fresh
//! generation.

pub mod geometry;
pub mod images;
pub mod pages;
pub mod redact;
pub mod rewrite;
pub mod session;
