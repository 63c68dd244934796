//! The domain the sim procedures act on, and its validation oracle.
//!
//! Two views of the same resources are kept deliberately separate, the way
//! a catalog service and a storage layout are separate in a real system:
//! `catalog` is the persisted metadata (resource -> sub-resource names) and
//! `layout` is the backing storage (sub-resource -> row count). A procedure
//! that updates one and crashes before the other leaves them divergent,
//! which is precisely what the oracle checks for.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use faultline_harness::{DomainOracle, OracleViolation};

use crate::executor::SimInner;

#[derive(Debug, Default)]
pub struct SimDomain {
    catalog: BTreeMap<String, BTreeSet<String>>,
    layout: BTreeMap<String, BTreeMap<String, u64>>,
}

impl SimDomain {
    /// Create a resource with the given sub-resources in both the catalog
    /// and the layout. Setup helper; not a procedure.
    pub fn create_resource(&mut self, resource: &str, sub_resources: &[&str]) {
        let subs: BTreeSet<String> = sub_resources.iter().map(|s| s.to_string()).collect();
        let dirs: BTreeMap<String, u64> = subs.iter().map(|s| (s.clone(), 0)).collect();
        self.catalog.insert(resource.to_string(), subs);
        self.layout.insert(resource.to_string(), dirs);
    }

    /// Set the row count of every sub-resource directory to `rows`.
    /// Absolute assignment: replaying the write converges.
    pub fn set_rows(&mut self, resource: &str, rows: u64) {
        if let Some(dirs) = self.layout.get_mut(resource) {
            for count in dirs.values_mut() {
                *count = rows;
            }
        }
    }

    pub fn resource_in_catalog(&self, resource: &str) -> bool {
        self.catalog.contains_key(resource)
    }

    pub fn sub_resource_in_catalog(&self, resource: &str, sub: &str) -> bool {
        self.catalog
            .get(resource)
            .is_some_and(|subs| subs.contains(sub))
    }

    pub fn sub_resource_in_layout(&self, resource: &str, sub: &str) -> bool {
        self.layout
            .get(resource)
            .is_some_and(|dirs| dirs.contains_key(sub))
    }

    pub fn row_count(&self, resource: &str, sub: &str) -> Option<u64> {
        self.layout.get(resource).and_then(|dirs| dirs.get(sub)).copied()
    }

    pub(crate) fn remove_sub_from_catalog(&mut self, resource: &str, sub: &str) {
        if let Some(subs) = self.catalog.get_mut(resource) {
            subs.remove(sub);
        }
    }

    pub(crate) fn restore_sub_to_catalog(&mut self, resource: &str, sub: &str) {
        if let Some(subs) = self.catalog.get_mut(resource) {
            subs.insert(sub.to_string());
        }
    }

    /// Irreversible: the rows under the sub-resource directory are gone.
    pub(crate) fn remove_sub_from_layout(&mut self, resource: &str, sub: &str) {
        if let Some(dirs) = self.layout.get_mut(resource) {
            dirs.remove(sub);
        }
    }

    fn catalog_subs(&self, resource: &str) -> Option<&BTreeSet<String>> {
        self.catalog.get(resource)
    }

    fn layout_dirs(&self, resource: &str) -> Option<&BTreeMap<String, u64>> {
        self.layout.get(resource)
    }
}

/// Oracle over the sim domain. Checks metadata and layout independently so
/// a half-applied operation cannot pass.
pub struct SimOracle {
    inner: Arc<SimInner>,
}

impl SimOracle {
    pub(crate) fn new(inner: Arc<SimInner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DomainOracle for SimOracle {
    async fn verify_resource_present(
        &self,
        resource: &str,
        sub_resources: &[&str],
    ) -> Result<(), OracleViolation> {
        let expected: BTreeSet<String> = sub_resources.iter().map(|s| s.to_string()).collect();
        self.inner.with_domain(|domain| {
            let subs = domain.catalog_subs(resource).ok_or_else(|| {
                OracleViolation::new(format!("resource '{resource}' missing from catalog"))
            })?;
            if *subs != expected {
                return Err(OracleViolation::new(format!(
                    "catalog sub-resources of '{resource}' are {subs:?}, expected {expected:?}"
                )));
            }
            let dirs = domain.layout_dirs(resource).ok_or_else(|| {
                OracleViolation::new(format!("resource '{resource}' missing from layout"))
            })?;
            let dir_names: BTreeSet<String> = dirs.keys().cloned().collect();
            if dir_names != expected {
                return Err(OracleViolation::new(format!(
                    "layout directories of '{resource}' are {dir_names:?}, expected {expected:?}"
                )));
            }
            Ok(())
        })
    }

    async fn verify_resource_absent(&self, resource: &str) -> Result<(), OracleViolation> {
        self.inner.with_domain(|domain| {
            if domain.catalog_subs(resource).is_some() {
                return Err(OracleViolation::new(format!(
                    "resource '{resource}' still present in catalog"
                )));
            }
            if domain.layout_dirs(resource).is_some() {
                return Err(OracleViolation::new(format!(
                    "resource '{resource}' still present in layout"
                )));
            }
            Ok(())
        })
    }

    async fn verify_sub_resource_present(
        &self,
        resource: &str,
        sub_resource: &str,
    ) -> Result<(), OracleViolation> {
        self.inner.with_domain(|domain| {
            if !domain.sub_resource_in_catalog(resource, sub_resource) {
                return Err(OracleViolation::new(format!(
                    "sub-resource '{sub_resource}' missing from catalog of '{resource}'"
                )));
            }
            if !domain.sub_resource_in_layout(resource, sub_resource) {
                return Err(OracleViolation::new(format!(
                    "sub-resource '{sub_resource}' missing from layout of '{resource}'"
                )));
            }
            Ok(())
        })
    }

    async fn verify_sub_resource_absent(
        &self,
        resource: &str,
        sub_resource: &str,
    ) -> Result<(), OracleViolation> {
        self.inner.with_domain(|domain| {
            if domain.sub_resource_in_catalog(resource, sub_resource) {
                return Err(OracleViolation::new(format!(
                    "sub-resource '{sub_resource}' still in catalog of '{resource}'"
                )));
            }
            if domain.sub_resource_in_layout(resource, sub_resource) {
                return Err(OracleViolation::new(format!(
                    "sub-resource '{sub_resource}' still in layout of '{resource}'"
                )));
            }
            Ok(())
        })
    }
}
