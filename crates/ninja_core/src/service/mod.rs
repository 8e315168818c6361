//! Use-case layer over sessions.
//!
//! # Responsibility
//! - Package the example unit-of-work operations behind one facade.
//! - Keep the CLI decoupled from session and storage details.

pub mod walkthrough;
