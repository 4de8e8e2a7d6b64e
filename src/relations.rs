//! Typed references between resources.
//!
//! Entities point at each other through the relationship envelope
//! `{"data": {"type": ..., "id": ...}}`, with an array form for to-many
//! relationships. Decoding is best-effort like the rest of the field layer:
//! a malformed envelope or element reads as absent rather than failing.
//! Encoding always writes the envelope form, and writing an absent
//! reference deletes the field instead.

use crate::fields::CustomFields;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// The resource types a reference can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A user account. Identified by a bare id such as `john.doe`.
    #[serde(rename = "users")]
    User,
    /// A work item, identified as `project/local-id`.
    #[serde(rename = "workitems")]
    WorkItem,
    /// A live document, identified as `project/space/name`.
    #[serde(rename = "documents")]
    Document,
    /// A work item category.
    #[serde(rename = "categories")]
    Category,
    /// A plan (release or iteration).
    #[serde(rename = "plans")]
    Plan,
    /// A document collection.
    #[serde(rename = "collections")]
    Collection,
    /// A work item comment.
    #[serde(rename = "comments")]
    Comment,
    /// A work item attachment.
    #[serde(rename = "attachments")]
    Attachment,
    /// A project.
    #[serde(rename = "projects")]
    Project,
    /// A link between two work items.
    #[serde(rename = "linkedworkitems")]
    LinkedWorkItem,
}

impl ResourceKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "users",
            ResourceKind::WorkItem => "workitems",
            ResourceKind::Document => "documents",
            ResourceKind::Category => "categories",
            ResourceKind::Plan => "plans",
            ResourceKind::Collection => "collections",
            ResourceKind::Comment => "comments",
            ResourceKind::Attachment => "attachments",
            ResourceKind::Project => "projects",
            ResourceKind::LinkedWorkItem => "linkedworkitems",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(ResourceKind::User),
            "workitems" => Ok(ResourceKind::WorkItem),
            "documents" => Ok(ResourceKind::Document),
            "categories" => Ok(ResourceKind::Category),
            "plans" => Ok(ResourceKind::Plan),
            "collections" => Ok(ResourceKind::Collection),
            "comments" => Ok(ResourceKind::Comment),
            "attachments" => Ok(ResourceKind::Attachment),
            "projects" => Ok(ResourceKind::Project),
            "linkedworkitems" => Ok(ResourceKind::LinkedWorkItem),
            _ => Err(()),
        }
    }
}

/// A typed pointer at another resource.
///
/// Serializes as the wire form `{"type", "id", "revision"?}`. An empty id
/// never denotes a real resource; such references are treated as absent
/// throughout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// What the reference points at.
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// The identifier: a bare id for users, `project/local-id` for
    /// project-scoped resources.
    pub id: String,
    /// Pins the reference to a specific revision of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl ResourceRef {
    /// Creates a reference from a kind and full identifier.
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            revision: None,
        }
    }

    /// A reference to a user.
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::User, id)
    }

    /// A reference to a project-scoped resource, with the identifier
    /// assembled as `project/local-id`.
    pub fn scoped(kind: ResourceKind, project: &str, local_id: &str) -> Self {
        Self::new(kind, format!("{project}/{local_id}"))
    }

    /// Pins the reference to a revision.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// The project part of a `project/local-id` identifier.
    pub fn project(&self) -> Option<&str> {
        self.id.split_once('/').map(|(project, _)| project)
    }

    /// The local part of a `project/local-id` identifier, or the whole id
    /// for unscoped resources.
    pub fn local_id(&self) -> &str {
        self.id
            .split_once('/')
            .map_or(self.id.as_str(), |(_, local)| local)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Decodes one element of a relationship envelope. Requires a known string
/// `type` and a non-empty string `id`; anything else is absent.
fn decode_ref(value: &Value) -> Option<ResourceRef> {
    serde_json::from_value::<ResourceRef>(value.clone())
        .ok()
        .filter(|r| !r.id.is_empty())
}

impl CustomFields {
    /// Reads a to-one relationship field.
    ///
    /// The stored value must be a mapping with a `data` key. Object `data`
    /// decodes as the reference itself; list `data` yields its first
    /// decodable element. A bare string value, the legacy encoding some
    /// older projects still carry, is accepted here only and read as a user
    /// reference.
    pub fn get_relation(&self, key: &str) -> Option<ResourceRef> {
        match self.get_value(key)? {
            Value::String(id) if !id.is_empty() => Some(ResourceRef::user(id.as_str())),
            Value::Object(map) => match map.get("data")? {
                data @ Value::Object(_) => decode_ref(data),
                Value::Array(items) => items.iter().find_map(decode_ref),
                _ => None,
            },
            _ => None,
        }
    }

    /// Reads a to-many relationship field.
    ///
    /// Every decodable element of a `data` list, in original order, with
    /// malformed elements skipped. Object `data` yields a single-element
    /// list. The legacy bare-string encoding is not accepted here.
    pub fn get_relations(&self, key: &str) -> Vec<ResourceRef> {
        let Some(Value::Object(map)) = self.get_value(key) else {
            return Vec::new();
        };
        match map.get("data") {
            Some(data @ Value::Object(_)) => decode_ref(data).into_iter().collect(),
            Some(Value::Array(items)) => items.iter().filter_map(decode_ref).collect(),
            _ => Vec::new(),
        }
    }

    /// Writes a to-one relationship field.
    ///
    /// Always writes the envelope form, never the legacy bare string. An
    /// absent reference, or one with an empty id, deletes the field
    /// instead of storing a value that decodes as nothing.
    pub fn set_relation(&mut self, key: impl Into<String>, reference: Option<&ResourceRef>) {
        let key = key.into();
        match reference {
            Some(r) if !r.id.is_empty() => self.set(key, json!({ "data": r })),
            _ => {
                self.remove(&key);
            }
        }
    }

    /// Writes a to-many relationship field, skipping empty-id references.
    /// An empty list still writes the envelope with an empty `data` list.
    pub fn set_relations(&mut self, key: impl Into<String>, references: &[ResourceRef]) {
        let data: Vec<&ResourceRef> = references.iter().filter(|r| !r.id.is_empty()).collect();
        self.set(key.into(), json!({ "data": data }));
    }
}
