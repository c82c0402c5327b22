use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons an entity id is rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("expected `<domain>.<object_id>`")]
    InvalidFormat,

    #[error("empty domain")]
    EmptyDomain,

    #[error("empty object id")]
    EmptyObjectId,

    #[error("domain may only hold a-z, 0-9 and single inner underscores")]
    InvalidDomainChars,

    #[error("object id may only hold a-z, 0-9 and inner underscores")]
    InvalidObjectIdChars,
}

/// `climate.living_room`: a domain and an object id
///
/// Both halves are lowercase ASCII letters, digits and underscores, never
/// starting or ending with an underscore. Domains additionally reject `__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

fn is_slug(part: &str) -> bool {
    !part.starts_with('_')
        && !part.ends_with('_')
        && part
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl EntityId {
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let (domain, object_id) = (domain.into(), object_id.into());

        match (domain.as_str(), object_id.as_str()) {
            ("", _) => Err(EntityIdError::EmptyDomain),
            (_, "") => Err(EntityIdError::EmptyObjectId),
            (d, _) if d.contains("__") || !is_slug(d) => Err(EntityIdError::InvalidDomainChars),
            (_, o) if !is_slug(o) => Err(EntityIdError::InvalidObjectIdChars),
            _ => Ok(Self { domain, object_id }),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}

/// Turn a display name into a valid object_id
///
/// Lowercases ASCII letters, turns every other run of characters into a
/// single underscore and trims underscores at both ends. Names with nothing
/// usable left become "unknown".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug.to_string()
    }
}

/// Generate an entity id for `domain` from a display name
///
/// When `exists` reports the slug as taken, `_2`, `_3`, ... are appended until
/// a free id is found.
pub fn generate_entity_id(
    domain: &str,
    name: &str,
    exists: impl Fn(&str) -> bool,
) -> Result<EntityId, EntityIdError> {
    let base = slugify(name);
    let mut candidate = EntityId::new(domain, base.clone())?;
    let mut suffix = 2;
    while exists(&candidate.to_string()) {
        candidate = EntityId::new(domain, format!("{}_{}", base, suffix))?;
        suffix += 1;
    }
    Ok(candidate)
}
