//! Contracts for the collaborators a run talks to.
//!
//! Applications implement these to plug in acquisition, the version store
//! and the review surface.

pub mod review;
pub mod source;
pub mod store;
