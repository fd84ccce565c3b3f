//! Durable order records.

mod orders;

pub use orders::{OrderRecordStore, PersistenceError, TursoOrderStore};
