//! Service descriptors
//!
//! A descriptor carries everything the registry needs to wire a service:
//! its local ids, the auto-activate flag, the ordered dependency list,
//! the tag set used by group operations, and the interface type tags
//! it advertises on top of its concrete type.

use crate::dependency::{Dependency, TypeTag};
use crate::identity::ServiceIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Local ids; the first one is the primary id
    pub ids: Vec<String>,
    /// Activate as soon as the service is registered
    #[serde(default)]
    pub auto_activate: bool,
    /// Ordered dependency list
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Tags used by group activation and deactivation
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Extra type tags the service can be looked up by
    #[serde(default)]
    pub provides: Vec<TypeTag>,
}

impl ServiceDescriptor {
    /// Descriptor with a single local id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            ids: vec![id.into()],
            ..Default::default()
        }
    }

    /// Add another local id
    pub fn alias(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn auto_activate(mut self, auto_activate: bool) -> Self {
        self.auto_activate = auto_activate;
        self
    }

    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Required single dependency on `local_id` from any origin
    pub fn requires(self, local_id: impl Into<String>) -> Self {
        self.depends_on(Dependency::required(ServiceIdentity::any(local_id)))
    }

    /// Optional single dependency on `local_id` from any origin
    pub fn wants(self, local_id: impl Into<String>) -> Self {
        self.depends_on(Dependency::optional(ServiceIdentity::any(local_id)))
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn provides(mut self, type_tag: impl Into<TypeTag>) -> Self {
        self.provides.push(type_tag.into());
        self
    }

    /// The first declared local id
    pub fn primary_id(&self) -> Option<&str> {
        self.ids.first().map(String::as_str)
    }
}
