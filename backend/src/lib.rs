// LeadFlow workflow automation backend
//
// Library half of the backend: the workflow and agent-schedule engines, their
// datastore ports and bindings, and the collaborators they send through. The
// binary in main.rs wires these together and runs the poll job.

pub mod agents;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod services;
pub mod store;
pub mod workflows;

pub use error::{EngineError, EngineResult, NormalizeError, StoreError, StoreResult};
