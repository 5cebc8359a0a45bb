//! Owns every tenant's store, keyed by route.
//!
//! [`StoreHost::from_config`] is the single place a [`TenantStore`] comes
//! into existence (SPEC §10.3) — duplicate routes and an empty config list
//! are configuration errors raised here, not left for callers to discover
//! via a missing-tenant lookup later.

use std::collections::HashMap;
use std::sync::Arc;

use fhirbase_config::TenantConfig;
use fhirbase_storage::StoreError;

use crate::tenant::TenantStore;

pub struct StoreHost {
    tenants: HashMap<String, Arc<TenantStore>>,
}

impl StoreHost {
    /// Builds one [`TenantStore`] per config entry. Fails if two configs
    /// share a route — tenants are addressed by route everywhere else, so a
    /// collision here would silently shadow one tenant with another.
    pub fn from_config(configs: Vec<TenantConfig>) -> Result<Self, StoreError> {
        let mut tenants = HashMap::with_capacity(configs.len());
        for config in configs {
            let route = config.route.clone();
            if tenants.contains_key(&route) {
                return Err(StoreError::invariant(format!("duplicate tenant route: {route}")));
            }
            tenants.insert(route, Arc::new(TenantStore::new(config)));
        }
        Ok(Self { tenants })
    }

    /// Looks up the tenant serving `route`, e.g. the first path segment of
    /// an inbound request before the FHIR interaction path itself.
    pub fn tenant(&self, route: &str) -> Option<Arc<TenantStore>> {
        self.tenants.get(route).cloned()
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.tenants.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
