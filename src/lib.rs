//! AlertHub: multi-tenant alerting engine (rule scheduling, event
//! lifecycle, silencing, and notification dispatch), laid out as the
//! teacher's hexagonal `domain`/`application`/`adapters`/`infrastructure`
//! crate.

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
