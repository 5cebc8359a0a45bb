//! Classifies `(verb, path)` into one of the FHIR interaction codes.
//!
//! Pure and stateless: given the path already split from the query string,
//! no store access is needed to decide which interaction applies.

use std::fmt;

/// HTTP verb, restricted to what the FHIR REST interactions distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// One of the FHIR interaction codes from SPEC §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interaction {
    SystemCapabilities,
    SystemSearch,
    SystemBundle,
    SystemDeleteConditional,
    SystemOperation,
    TypeCreate,
    TypeConditionalCreate,
    TypeSearch,
    TypeDeleteConditional,
    TypeOperation,
    InstanceRead,
    InstanceUpdate,
    InstanceConditionalUpdate,
    InstancePatch,
    InstanceDelete,
    InstanceReadHistory,
    InstanceReadVersion,
    InstanceOperation,
    CompartmentSearch,
    CompartmentTypeSearch,
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A classified request: the interaction plus whatever path segments it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedInteraction {
    pub interaction: Interaction,
    pub resource_type: Option<String>,
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub operation: Option<String>,
    pub compartment: Option<String>,
    pub compartment_type: Option<String>,
}

impl RoutedInteraction {
    fn new(interaction: Interaction) -> Self {
        Self {
            interaction,
            resource_type: None,
            id: None,
            version_id: None,
            operation: None,
            compartment: None,
            compartment_type: None,
        }
    }
}

/// `[A-Za-z0-9\-\.]{1,64}` per SPEC §4.1.
fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 64
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

fn operation_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('$').filter(|name| is_identifier(name))
}

/// Classifies a request. `query` is only consulted to decide whether a
/// `DELETE`/`PUT` is conditional and whether `If-None-Exist` makes a create
/// conditional; pass `has_if_none_exist` from the request headers.
pub fn route(verb: Verb, path: &str, query: &str, has_if_none_exist: bool) -> Option<RoutedInteraction> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let has_query = !query.is_empty();

    match segments.as_slice() {
        [] => match verb {
            Verb::Get => Some(RoutedInteraction::new(Interaction::SystemSearch)),
            Verb::Post => Some(RoutedInteraction::new(Interaction::SystemBundle)),
            Verb::Delete if has_query => Some(RoutedInteraction::new(Interaction::SystemDeleteConditional)),
            _ => None,
        },

        ["metadata"] if verb == Verb::Get => Some(RoutedInteraction::new(Interaction::SystemCapabilities)),

        [op] if operation_name(op).is_some() && matches!(verb, Verb::Get | Verb::Post) => {
            let mut routed = RoutedInteraction::new(Interaction::SystemOperation);
            routed.operation = operation_name(op).map(str::to_string);
            Some(routed)
        }

        [rt] if is_identifier(rt) => {
            let mut routed = match verb {
                Verb::Post => RoutedInteraction::new(if has_if_none_exist {
                    Interaction::TypeConditionalCreate
                } else {
                    Interaction::TypeCreate
                }),
                Verb::Get => RoutedInteraction::new(Interaction::TypeSearch),
                Verb::Delete if has_query => RoutedInteraction::new(Interaction::TypeDeleteConditional),
                _ => return None,
            };
            routed.resource_type = Some(rt.to_string());
            Some(routed)
        }

        [rt, op] if is_identifier(rt) && operation_name(op).is_some() && matches!(verb, Verb::Get | Verb::Post) => {
            let mut routed = RoutedInteraction::new(Interaction::TypeOperation);
            routed.resource_type = Some(rt.to_string());
            routed.operation = operation_name(op).map(str::to_string);
            Some(routed)
        }

        [rt, id] if is_identifier(rt) && is_identifier(id) => {
            let mut routed = match verb {
                Verb::Get => RoutedInteraction::new(Interaction::InstanceRead),
                Verb::Put => RoutedInteraction::new(if has_query {
                    Interaction::InstanceConditionalUpdate
                } else {
                    Interaction::InstanceUpdate
                }),
                Verb::Patch => RoutedInteraction::new(Interaction::InstancePatch),
                Verb::Delete => RoutedInteraction::new(Interaction::InstanceDelete),
                _ => return None,
            };
            routed.resource_type = Some(rt.to_string());
            routed.id = Some(id.to_string());
            Some(routed)
        }

        [rt, id, "_history"] if is_identifier(rt) && is_identifier(id) && verb == Verb::Get => {
            let mut routed = RoutedInteraction::new(Interaction::InstanceReadHistory);
            routed.resource_type = Some(rt.to_string());
            routed.id = Some(id.to_string());
            Some(routed)
        }

        [rt, id, "_history", vid] if is_identifier(rt) && is_identifier(id) && is_identifier(vid) && verb == Verb::Get => {
            let mut routed = RoutedInteraction::new(Interaction::InstanceReadVersion);
            routed.resource_type = Some(rt.to_string());
            routed.id = Some(id.to_string());
            routed.version_id = Some(vid.to_string());
            Some(routed)
        }

        [rt, id, op] if is_identifier(rt) && is_identifier(id) && operation_name(op).is_some() && matches!(verb, Verb::Get | Verb::Post) => {
            let mut routed = RoutedInteraction::new(Interaction::InstanceOperation);
            routed.resource_type = Some(rt.to_string());
            routed.id = Some(id.to_string());
            routed.operation = operation_name(op).map(str::to_string);
            Some(routed)
        }

        [rt, id, compartment] if is_identifier(rt) && is_identifier(id) && is_identifier(compartment) && verb == Verb::Get => {
            let mut routed = RoutedInteraction::new(Interaction::CompartmentSearch);
            routed.resource_type = Some(rt.to_string());
            routed.id = Some(id.to_string());
            routed.compartment = Some(compartment.to_string());
            Some(routed)
        }

        [rt, id, compartment, rt2] if is_identifier(rt) && is_identifier(id) && is_identifier(compartment) && is_identifier(rt2) && verb == Verb::Get => {
            let mut routed = RoutedInteraction::new(Interaction::CompartmentTypeSearch);
            routed.resource_type = Some(rt.to_string());
            routed.id = Some(id.to_string());
            routed.compartment = Some(compartment.to_string());
            routed.compartment_type = Some(rt2.to_string());
            Some(routed)
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_system_capabilities() {
        let routed = route(Verb::Get, "/metadata", "", false).unwrap();
        assert_eq!(routed.interaction, Interaction::SystemCapabilities);
    }

    #[test]
    fn root_get_is_system_search() {
        let routed = route(Verb::Get, "/", "", false).unwrap();
        assert_eq!(routed.interaction, Interaction::SystemSearch);
    }

    #[test]
    fn root_post_is_system_bundle() {
        let routed = route(Verb::Post, "", "", false).unwrap();
        assert_eq!(routed.interaction, Interaction::SystemBundle);
    }

    #[test]
    fn type_post_without_if_none_exist_is_plain_create() {
        let routed = route(Verb::Post, "/Patient", "", false).unwrap();
        assert_eq!(routed.interaction, Interaction::TypeCreate);
        assert_eq!(routed.resource_type.as_deref(), Some("Patient"));
    }

    #[test]
    fn type_post_with_if_none_exist_is_conditional_create() {
        let routed = route(Verb::Post, "/Patient", "", true).unwrap();
        assert_eq!(routed.interaction, Interaction::TypeConditionalCreate);
    }

    #[test]
    fn type_get_is_type_search() {
        let routed = route(Verb::Get, "/Observation", "code=1234-5", false).unwrap();
        assert_eq!(routed.interaction, Interaction::TypeSearch);
    }

    #[test]
    fn instance_read_by_id() {
        let routed = route(Verb::Get, "/Patient/example", "", false).unwrap();
        assert_eq!(routed.interaction, Interaction::InstanceRead);
        assert_eq!(routed.resource_type.as_deref(), Some("Patient"));
        assert_eq!(routed.id.as_deref(), Some("example"));
    }

    #[test]
    fn instance_update_conditional_when_query_present() {
        let routed = route(Verb::Put, "/Patient/example", "identifier=123", false).unwrap();
        assert_eq!(routed.interaction, Interaction::InstanceConditionalUpdate);
    }

    #[test]
    fn instance_update_plain_without_query() {
        let routed = route(Verb::Put, "/Patient/example", "", false).unwrap();
        assert_eq!(routed.interaction, Interaction::InstanceUpdate);
    }

    #[test]
    fn instance_history_and_version() {
        let hist = route(Verb::Get, "/Patient/example/_history", "", false).unwrap();
        assert_eq!(hist.interaction, Interaction::InstanceReadHistory);

        let vread = route(Verb::Get, "/Patient/example/_history/2", "", false).unwrap();
        assert_eq!(vread.interaction, Interaction::InstanceReadVersion);
        assert_eq!(vread.version_id.as_deref(), Some("2"));
    }

    #[test]
    fn instance_operation_and_type_operation() {
        let type_op = route(Verb::Post, "/Patient/$everything", "", false).unwrap();
        assert_eq!(type_op.interaction, Interaction::TypeOperation);
        assert_eq!(type_op.operation.as_deref(), Some("everything"));

        let inst_op = route(Verb::Get, "/Patient/example/$everything", "", false).unwrap();
        assert_eq!(inst_op.interaction, Interaction::InstanceOperation);
    }

    #[test]
    fn system_operation_at_root() {
        let routed = route(Verb::Post, "/$validate", "", false).unwrap();
        assert_eq!(routed.interaction, Interaction::SystemOperation);
        assert_eq!(routed.operation.as_deref(), Some("validate"));
    }

    #[test]
    fn compartment_search_and_compartment_type_search() {
        let search = route(Verb::Get, "/Patient/example/Condition", "", false).unwrap();
        assert_eq!(search.interaction, Interaction::CompartmentTypeSearch);
        assert_eq!(search.compartment.as_deref(), Some("example"));

        // three segments with no fourth type is the plain compartment search
        let plain = route(Verb::Get, "/Patient/example/everything", "", false).unwrap();
        assert_eq!(plain.interaction, Interaction::CompartmentSearch);
    }

    #[test]
    fn delete_without_query_on_type_is_unmatched() {
        assert!(route(Verb::Delete, "/Patient", "", false).is_none());
    }

    #[test]
    fn invalid_identifier_fails_to_match() {
        assert!(route(Verb::Get, "/Pa tient/example", "", false).is_none());
    }
}
