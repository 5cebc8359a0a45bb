//! In-memory FHIR resource store.
//!
//! Implements [`fhirbase_storage::FhirStorage`] on top of a lock-free
//! [`papaya::HashMap`], keeping the full version history of every resource
//! so `vread` and `history` need no separate archive.
//!
//! # Example
//!
//! ```ignore
//! use fhirbase_memory::InMemoryStorage;
//! use fhirbase_storage::FhirStorage;
//!
//! let storage = InMemoryStorage::new();
//!
//! let patient = serde_json::json!({
//!     "resourceType": "Patient",
//!     "name": [{"family": "Smith"}]
//! });
//! let created = storage.create(&patient).await?;
//! ```

mod fhir_impl;
pub mod storage;

pub use fhir_impl::InMemoryFhirTransaction;
pub use fhirbase_storage::{FhirStorage, StoreError, StoredResource};
pub use storage::{HistoryRecord, InMemoryStorage};

/// Type alias for a shareable [`FhirStorage`] instance.
pub type DynFhirStorage = std::sync::Arc<dyn FhirStorage>;

/// Creates a new in-memory `FhirStorage` instance.
pub fn create_fhir_storage() -> DynFhirStorage {
    std::sync::Arc::new(InMemoryStorage::new())
}
