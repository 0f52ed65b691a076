//! Dependency edge descriptors

use crate::identity::ServiceIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a service type, used to filter providers and lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(name: impl Into<String>) -> Self {
        TypeTag(name.into())
    }

    /// Tag of a concrete Rust type
    pub fn of<T: ?Sized>() -> Self {
        TypeTag(std::any::type_name::<T>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        TypeTag::new(name)
    }
}

/// How many providers a dependency binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// Exactly one provider
    #[default]
    Single,
    /// Any number of providers
    Multiple,
}

/// Immutable edge descriptor attached to a holder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    target: ServiceIdentity,
    #[serde(default, rename = "type")]
    required_type: Option<TypeTag>,
    #[serde(default)]
    cardinality: Cardinality,
    #[serde(default)]
    optional: bool,
}

impl Dependency {
    /// Required single dependency on `target`
    pub fn required(target: ServiceIdentity) -> Self {
        Self {
            target,
            required_type: None,
            cardinality: Cardinality::Single,
            optional: false,
        }
    }

    /// Optional single dependency on `target`
    pub fn optional(target: ServiceIdentity) -> Self {
        Self {
            optional: true,
            ..Self::required(target)
        }
    }

    /// Bind every assignable provider instead of exactly one
    pub fn multiple(mut self) -> Self {
        self.cardinality = Cardinality::Multiple;
        self
    }

    /// Only accept providers advertising this type
    pub fn with_type(mut self, required_type: impl Into<TypeTag>) -> Self {
        self.required_type = Some(required_type.into());
        self
    }

    /// Only accept providers of the concrete type `T`
    pub fn of_type<T: ?Sized>(self) -> Self {
        self.with_type(TypeTag::of::<T>())
    }

    pub fn target(&self) -> &ServiceIdentity {
        &self.target
    }

    pub fn required_type(&self) -> Option<&TypeTag> {
        self.required_type.as_ref()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_single(&self) -> bool {
        self.cardinality == Cardinality::Single
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Identity half of the binding rule
    pub fn is_satisfied_by(&self, identity: &ServiceIdentity) -> bool {
        identity.is_assignable_to(&self.target)
    }

    /// Full binding rule: identity assignable and type advertised
    pub fn accepts(&self, identity: &ServiceIdentity, provided: &[TypeTag]) -> bool {
        self.is_satisfied_by(identity)
            && self
                .required_type
                .as_ref()
                .map_or(true, |tag| provided.contains(tag))
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        if let Some(tag) = &self.required_type {
            write!(f, ": {}", tag)?;
        }
        if self.cardinality == Cardinality::Multiple {
            write!(f, "[]")?;
        }
        if self.optional {
            write!(f, "?")?;
        }
        Ok(())
    }
}
