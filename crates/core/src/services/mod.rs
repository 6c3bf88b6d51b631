//! Pipeline services: the collaborator contracts (detector, structural parser),
//! their built-in implementations, and the orchestrator that drives a pass.

pub mod backends;
pub mod deadline;
pub mod detect;
pub mod index;
pub mod ingest;
pub mod intake;
pub mod structure;
