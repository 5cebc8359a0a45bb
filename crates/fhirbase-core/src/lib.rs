pub mod error;
pub mod events;
pub mod fhir;
pub mod fhir_reference;
pub mod id;
pub mod resource;
pub mod time;

pub use error::{CoreError, Result};
pub use fhir::{FhirVersion, ResourceType};
pub use fhir_reference::{
    FhirReference, NormalizedRef, SegmentedReference, UnresolvableReference,
    normalize_reference_for_index, normalize_reference_string, parse_reference, ref_kind,
    segment_reference,
};
pub use id::{IdError, generate_id, validate_id};
pub use resource::{ResourceEnvelope, ResourceMeta, VersionId};
pub use time::{FhirDateTime, now_utc};
