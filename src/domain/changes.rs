//! Content change descriptors.
//!
//! A [`ChangeDescriptor`] names what changed in the CMS: the kind of entity,
//! which instance, and whether it was written or removed. Descriptors are
//! built by the emitter, sent once, and rebuilt from the wire by the
//! invalidator; nothing keeps them around afterwards.

use std::fmt;

use revalidator_api_types::RevalidateRequest;

use super::error::DomainError;

pub use revalidator_api_types::ChangeOperation as Operation;

/// Kind of content that changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityType {
    Page,
    Post,
    Media,
    Category,
    Header,
    Footer,
    /// A collection or global the mapping does not know; kept verbatim.
    Unknown(String),
}

impl EntityType {
    /// Parse a collection or global name, accepting plural collection slugs.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "page" | "pages" => EntityType::Page,
            "post" | "posts" => EntityType::Post,
            "media" => EntityType::Media,
            "category" | "categories" => EntityType::Category,
            "header" => EntityType::Header,
            "footer" => EntityType::Footer,
            other => EntityType::Unknown(other.to_string()),
        }
    }

    /// Canonical name sent on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Page => "page",
            EntityType::Post => "post",
            EntityType::Media => "media",
            EntityType::Category => "category",
            EntityType::Header => "header",
            EntityType::Footer => "footer",
            EntityType::Unknown(name) => name.as_str(),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of communication from emitter to invalidator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDescriptor {
    entity_type: EntityType,
    entity_key: String,
    operation: Operation,
}

impl ChangeDescriptor {
    pub fn new(
        entity_type: EntityType,
        entity_key: impl Into<String>,
        operation: Operation,
    ) -> Result<Self, DomainError> {
        if entity_type.as_str().trim().is_empty() {
            return Err(DomainError::validation("collection", "must not be empty"));
        }

        let entity_key = entity_key.into();
        if entity_key.trim().is_empty() {
            return Err(DomainError::validation("slug", "must not be empty"));
        }

        Ok(Self {
            entity_type,
            entity_key,
            operation,
        })
    }

    /// Descriptor for a collection document, keyed by slug or falling back to id.
    pub fn for_document<D>(
        entity_type: EntityType,
        document: &D,
        operation: Operation,
    ) -> Result<Self, DomainError>
    where
        D: ContentRef + ?Sized,
    {
        Self::new(entity_type, entity_key_of(document), operation)
    }

    /// Descriptor for a singleton, keyed by its own name.
    pub fn for_global(entity_type: EntityType) -> Result<Self, DomainError> {
        let key = entity_type.as_str().to_string();
        Self::new(entity_type, key, Operation::Update)
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn entity_key(&self) -> &str {
        &self.entity_key
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl fmt::Display for ChangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({})",
            self.entity_type, self.entity_key, self.operation
        )
    }
}

impl TryFrom<RevalidateRequest> for ChangeDescriptor {
    type Error = DomainError;

    fn try_from(request: RevalidateRequest) -> Result<Self, Self::Error> {
        if request.collection.trim().is_empty() {
            return Err(DomainError::validation("collection", "must not be empty"));
        }
        Self::new(
            EntityType::parse(&request.collection),
            request.slug,
            request.operation,
        )
    }
}

impl From<&ChangeDescriptor> for RevalidateRequest {
    fn from(descriptor: &ChangeDescriptor) -> Self {
        RevalidateRequest {
            collection: descriptor.entity_type.as_str().to_string(),
            slug: descriptor.entity_key.clone(),
            operation: descriptor.operation,
        }
    }
}

/// Anything with an optional slug and a required identifier.
pub trait ContentRef {
    fn slug(&self) -> Option<&str>;
    fn id(&self) -> &str;
}

/// Plain content reference for callers that only carry the two fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDocument {
    pub id: String,
    pub slug: Option<String>,
}

impl ContentDocument {
    pub fn new(id: impl Into<String>, slug: Option<String>) -> Self {
        Self {
            id: id.into(),
            slug,
        }
    }
}

impl ContentRef for ContentDocument {
    fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn id(&self) -> &str {
        &self.id
    }
}

fn entity_key_of<D: ContentRef + ?Sized>(document: &D) -> String {
    document
        .slug()
        .map(str::trim)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| document.id())
        .to_string()
}
