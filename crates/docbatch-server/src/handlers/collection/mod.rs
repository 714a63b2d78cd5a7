//! Cached collection access.
//!
//! A [`Collection`] routes point reads through the scope's loader for its
//! path and keeps that loader consistent with the writes it performs:
//!
//! - **Replace writes** prime the written document
//! - **Merges, field updates and deletes** clear the entry, so the next read
//!   goes to the backend
//! - **Collection reads and queries** prime every returned document
//!
//! Cache effects are applied only after the backend call succeeds.

mod handler;

pub use handler::Collection;

#[cfg(test)]
mod tests;
