//! Routine catalog for Mesmer
//!
//! A routine is a saved generation request plus a reference to its most
//! recent successful artifact. The store trait keeps the task runner
//! independent of the JSON-file backing.

pub mod routine;
pub mod store;

pub use routine::{slugify, NewRoutine, Routine, RoutineId, VoiceType};
pub use store::{JsonRoutineStore, RoutineStore};
