//! Collaborator traits for Metricflow.
//!
//! The control loop talks to the outside world only through these traits:
//! a reasoning gateway for judgment calls and metric backends for
//! computation. Both are async and object safe.

pub mod backend;
pub mod reasoning;

pub use backend::*;
pub use reasoning::*;
