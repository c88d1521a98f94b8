//! Fixture entities for the crate's own test suites. Each type carries the
//! hand-written descriptor and accessor implementations the engine expects
//! from generated code.

mod entities;

pub use entities::{Article, Attachment, Edge, Employee, Report, Track};
