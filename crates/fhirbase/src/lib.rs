//! Per-tenant, in-memory, multi-version FHIR resource store.
//!
//! This crate is the seam that wires the storage, search, notification, and
//! configuration crates together into the interactions a FHIR server exposes
//! over its RESTful API: `Init`, `GetMetadata`, the instance/type/system CRUD
//! family, `TypeSearch`/`SystemSearch`, and `ProcessBundle`. Transport (HTTP
//! routing, serialization framing) is left to an embedder; [`router::route`]
//! only classifies an already-parsed verb/path/query into an [`router::Interaction`].
//!
//! A [`host::StoreHost`] owns one [`tenant::TenantStore`] per configured
//! route; most callers construct a host and never touch `TenantStore`
//! directly.

pub mod bundle;
pub mod capability;
pub mod host;
pub mod resolver;
pub mod router;
pub mod tenant;
pub mod types;

pub use host::StoreHost;
pub use router::{Interaction, RoutedInteraction, Verb};
pub use tenant::TenantStore;
pub use types::{operation_outcome, InteractionOutcome};
