use serde::{Deserialize, Serialize};
use std::fmt;

/// FHIR R4B SearchParameter type enumeration
/// See: https://hl7.org/fhir/R4B/search.html#table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterType {
    Number,
    Date,
    String,
    Token,
    Reference,
    Composite,
    Quantity,
    Uri,
    Special,
}

/// Supported search modifiers (subset per FHIR R4B)
/// Applied as suffix to parameter name: `name:modifier`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    Exact,
    Contains,
    Text,
    In,
    NotIn,
    Below,
    Above,
    Not,
    Identifier,   // for reference parameters
    Type(String), // e.g., subject:Patient
    Missing,      // value should be boolean (handled during parsing)
}

/// Prefixes for number/date search values
/// e.g., `ge2020-01-01`, `lt5.0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Sa, // starts after
    Eb, // ends before
    Ap, // approximately
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchPrefix::Eq => "eq",
            SearchPrefix::Ne => "ne",
            SearchPrefix::Gt => "gt",
            SearchPrefix::Lt => "lt",
            SearchPrefix::Ge => "ge",
            SearchPrefix::Le => "le",
            SearchPrefix::Sa => "sa",
            SearchPrefix::Eb => "eb",
            SearchPrefix::Ap => "ap",
        };
        f.write_str(s)
    }
}

impl SearchPrefix {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "ge" => Some(Self::Ge),
            "le" => Some(Self::Le),
            "sa" => Some(Self::Sa),
            "eb" => Some(Self::Eb),
            "ap" => Some(Self::Ap),
            _ => None,
        }
    }
}

/// A hint about the runtime type of the element a FHIRPath expression
/// resolved to, used to build the evaluator routing key when a parameter's
/// expression can land on more than one element shape (e.g. `value[x]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementTypeHint {
    /// The element's FHIR type name as it appears in the resource's
    /// StructureDefinition, e.g. "HumanName", "CodeableConcept", "Period".
    Named(String),
    /// No disambiguation needed; the parameter's own `kind` is sufficient.
    None,
}

impl ElementTypeHint {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Named(name) => name.as_str(),
            Self::None => "",
        }
    }
}

/// A registered FHIR search parameter: the unit the parser resolves names
/// against and the evaluator walks expressions for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameter {
    /// The parameter's code, e.g. "name", "_id", "subject".
    pub code: String,
    /// Canonical URL of the SearchParameter resource this was loaded from.
    /// Framework parameters (`_id`, `_lastUpdated`, ...) use a synthetic
    /// `"urn:fhirbase:search-parameter:{code}"` URL so they still index
    /// cleanly by URL alongside loaded ones.
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SearchParameterType,
    /// Resource types this parameter applies to. `"Resource"` marks it as
    /// applicable to every resource type (a "common" parameter).
    pub base: Vec<String>,
    /// FHIRPath-like expression rooted at the resource, e.g.
    /// "Patient.name.family" or "Observation.value.ofType(Quantity)".
    pub expression: String,
    /// For reference/composite parameters, the resource types a reference
    /// may target.
    pub target_types: Vec<String>,
    /// Disambiguation hint for polymorphic elements (`value[x]` and friends).
    pub type_hint: ElementTypeHint,
    pub description: Option<String>,
}

impl SearchParameter {
    pub fn new(
        code: impl Into<String>,
        url: impl Into<String>,
        kind: SearchParameterType,
        base: Vec<String>,
    ) -> Self {
        Self {
            code: code.into(),
            url: url.into(),
            kind,
            base,
            expression: String::new(),
            target_types: Vec::new(),
            type_hint: ElementTypeHint::None,
            description: None,
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    pub fn with_target_types(mut self, types: Vec<String>) -> Self {
        self.target_types = types;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// A parameter is "common" when its base includes `Resource` or
    /// `DomainResource`, making it applicable to every resource type.
    pub fn is_common(&self) -> bool {
        self.base.iter().any(|b| b == "Resource" || b == "DomainResource")
    }

    pub fn applies_to(&self, resource_type: &str) -> bool {
        self.base.iter().any(|b| b == resource_type) || self.base.iter().any(|b| b == "Resource")
    }

    /// The set of modifiers this parameter's type accepts, per the FHIR R4B
    /// search modifier compatibility table.
    pub fn allowed_modifiers(&self) -> &'static [&'static str] {
        match self.kind {
            SearchParameterType::Number | SearchParameterType::Date | SearchParameterType::Quantity => {
                &["missing"]
            }
            SearchParameterType::Reference => &[
                "above",
                "below",
                "code-text",
                "identifier",
                "in",
                "missing",
                "not-in",
                "text",
                "text-advanced",
            ],
            SearchParameterType::String => &["contains", "exact", "missing", "text"],
            SearchParameterType::Token => &[
                "above",
                "below",
                "code-text",
                "in",
                "missing",
                "not",
                "not-in",
                "of-type",
                "text",
                "text-advanced",
            ],
            SearchParameterType::Uri => &[
                "above",
                "below",
                "contains",
                "in",
                "missing",
                "not",
                "not-in",
                "of-type",
                "text",
                "text-advanced",
            ],
            SearchParameterType::Composite | SearchParameterType::Special => &["missing"],
        }
    }

    /// Whether `modifier` (lowercase, e.g. "contains", or a resource type
    /// name for a reference type modifier) is valid for this parameter.
    pub fn accepts_modifier(&self, modifier: &SearchModifier) -> bool {
        match modifier {
            SearchModifier::Missing => true, // every type accepts :missing
            SearchModifier::Type(type_name) => {
                self.kind == SearchParameterType::Reference
                    && (self.target_types.is_empty() || self.target_types.iter().any(|t| t == type_name))
            }
            other => {
                let name = modifier_name(other);
                self.allowed_modifiers().contains(&name)
            }
        }
    }

    /// Whether a prefix (`eq`, `gt`, ...) is meaningful for this parameter's
    /// type. Only number/date/quantity carry prefix comparison semantics.
    pub fn accepts_prefix(&self) -> bool {
        matches!(
            self.kind,
            SearchParameterType::Number | SearchParameterType::Date | SearchParameterType::Quantity
        )
    }

    /// Builds the evaluator dispatch key for a resolved element, per
    /// `{paramType}[-{modifier}]-{elementInstanceType}`, all lowercase.
    pub fn routing_key(&self, modifier: Option<&SearchModifier>, element_type: &str) -> String {
        let param_type = kind_name(self.kind);
        let element_type = element_type.to_lowercase();
        match modifier {
            Some(m) if !matches!(m, SearchModifier::Missing) => {
                format!("{param_type}-{}-{element_type}", modifier_name(m))
            }
            _ => format!("{param_type}-{element_type}"),
        }
    }
}

fn kind_name(kind: SearchParameterType) -> &'static str {
    match kind {
        SearchParameterType::Number => "number",
        SearchParameterType::Date => "date",
        SearchParameterType::String => "string",
        SearchParameterType::Token => "token",
        SearchParameterType::Reference => "reference",
        SearchParameterType::Composite => "composite",
        SearchParameterType::Quantity => "quantity",
        SearchParameterType::Uri => "uri",
        SearchParameterType::Special => "special",
    }
}

impl SearchModifier {
    /// Parses a FHIR SearchParameter.modifier code, e.g. as it appears in a
    /// loaded SearchParameter resource's `modifier` array.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(Self::Exact),
            "contains" => Some(Self::Contains),
            "text" => Some(Self::Text),
            "in" => Some(Self::In),
            "not-in" => Some(Self::NotIn),
            "below" => Some(Self::Below),
            "above" => Some(Self::Above),
            "not" => Some(Self::Not),
            "identifier" => Some(Self::Identifier),
            "missing" => Some(Self::Missing),
            other if !other.is_empty() => Some(Self::Type(other.to_string())),
            _ => None,
        }
    }
}

impl SearchParameterType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "string" => Some(Self::String),
            "token" => Some(Self::Token),
            "reference" => Some(Self::Reference),
            "composite" => Some(Self::Composite),
            "quantity" => Some(Self::Quantity),
            "uri" => Some(Self::Uri),
            "special" => Some(Self::Special),
            _ => None,
        }
    }
}

fn modifier_name(modifier: &SearchModifier) -> &'static str {
    match modifier {
        SearchModifier::Exact => "exact",
        SearchModifier::Contains => "contains",
        SearchModifier::Text => "text",
        SearchModifier::In => "in",
        SearchModifier::NotIn => "not-in",
        SearchModifier::Below => "below",
        SearchModifier::Above => "above",
        SearchModifier::Not => "not",
        SearchModifier::Identifier => "identifier",
        SearchModifier::Type(_) => "type",
        SearchModifier::Missing => "missing",
    }
}
