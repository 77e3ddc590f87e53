//! Domain layer: entities, ports, and domain-level errors. Pure and
//! infrastructure-free, following the teacher's hexagonal layout
//! (`src/domain/{models,ports,errors.rs}` in examples/odgrim-abathur-swarm).

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
