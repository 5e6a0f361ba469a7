//! Built-in services.
//!
//! - [`blog`] - CRUD over a document store, with a server-streamed
//!   enumeration.
//! - [`calc`] - arithmetic demos exercising all four call shapes.

pub mod blog;
pub mod calc;
