//! # Domain Module
//!
//! Core domain types for validator registration: ids, artifacts,
//! invariants and errors.

pub mod cb58;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use value_objects::*;
