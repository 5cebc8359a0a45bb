//! Search parameter parsing and in-memory evaluation.
//!
//! Resources live fully in-process ([`fhirbase_memory::InMemoryStorage`]),
//! so search here means walking a lightweight JSON path navigator over each
//! candidate resource rather than generating SQL. See [`evaluator`] for the
//! per-type matching rules and [`parser`] for how a query string resolves
//! into chained/composite/include directives against the [`registry`].

mod common;
pub mod engine;
pub mod evaluator;
pub mod loader;
pub mod parameters;
pub mod parser;
pub mod registry;

pub use common::register_common_parameters;
pub use engine::{EngineError, EntryMode, SearchConfig, SearchEngine, SearchEntry, SearchOutcome};
pub use evaluator::{NullResolver, ReferenceResolver};
pub use loader::{load_search_parameters, parse_search_parameter, LoaderError};
pub use parameters::{
    ElementTypeHint, SearchModifier, SearchParameter, SearchParameterType, SearchPrefix,
};
pub use parser::{
    ChainedParameter, IncludeDirective, ParsedParam, ParsedParameters, ParsedSearchParameter,
    ParsedValue, ResolvedSearch, SearchParameterParser, SearchValidationError,
};
pub use registry::SearchParameterRegistry;
