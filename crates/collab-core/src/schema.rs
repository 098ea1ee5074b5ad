use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Kind of value an attribute holds. Only `Markup` attributes are backlink sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Markup,
    String,
    Number,
    Boolean,
    Ref,
    Collection,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn markup(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Markup)
    }

    pub fn is_markup(&self) -> bool {
        self.kind == AttributeKind::Markup
    }
}

/// A workspace document as seen by the triggers: identity plus its attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub class: String,
    pub space: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, class: impl Into<String>, space: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            space: space.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Read an attribute as markup text. Missing and null attributes read as "".
    pub fn markup(&self, name: &str) -> String {
        match self.attributes.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Schema lookups the backlink triggers need from the host.
pub trait Hierarchy: Send + Sync {
    /// All attributes of `class`, inherited ones included.
    fn all_attributes(&self, class: &str) -> Vec<AttributeDescriptor>;

    /// True when `class` or one of its ancestors carries the collaborators mixin.
    fn has_collaborators(&self, class: &str) -> bool;

    fn markup_attributes(&self, class: &str) -> Vec<AttributeDescriptor> {
        self.all_attributes(class)
            .into_iter()
            .filter(AttributeDescriptor::is_markup)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct ClassEntry {
    extends: Option<String>,
    attributes: Vec<AttributeDescriptor>,
    collaborators: bool,
}

/// Registration-time class schema: class id → own attributes + parent link.
///
/// Classes are registered up front by the host; attribute lookups then walk the
/// `extends` chain instead of inspecting documents at runtime.
pub struct SchemaRegistry {
    classes: DashMap<String, ClassEntry>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
        }
    }

    /// Register (or re-parent) a class. Attributes already added are kept.
    pub fn register_class(&self, class: &str, extends: Option<&str>) {
        self.classes.entry(class.to_string()).or_default().extends =
            extends.map(str::to_string);
    }

    /// Add or replace an attribute on `class`, registering the class if needed.
    pub fn add_attribute(&self, class: &str, attribute: AttributeDescriptor) {
        let mut entry = self.classes.entry(class.to_string()).or_default();
        if let Some(existing) = entry
            .attributes
            .iter_mut()
            .find(|a| a.name == attribute.name)
        {
            *existing = attribute;
        } else {
            entry.attributes.push(attribute);
        }
    }

    pub fn enable_collaborators(&self, class: &str) {
        self.classes.entry(class.to_string()).or_default().collaborators = true;
    }

    /// Class chain from `class` up to its root. Stops on unknown classes and cycles.
    fn ancestry(&self, class: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                tracing::warn!("Class hierarchy cycle detected at {}", name);
                break;
            }
            let Some(entry) = self.classes.get(&name) else {
                break;
            };
            current = entry.extends.clone();
            chain.push(name);
        }
        chain
    }
}

impl Hierarchy for SchemaRegistry {
    fn all_attributes(&self, class: &str) -> Vec<AttributeDescriptor> {
        let mut result: Vec<AttributeDescriptor> = Vec::new();
        // Root first so derived classes override inherited attributes in place.
        for name in self.ancestry(class).iter().rev() {
            let Some(entry) = self.classes.get(name) else {
                continue;
            };
            for attr in &entry.attributes {
                if let Some(existing) = result.iter_mut().find(|a| a.name == attr.name) {
                    *existing = attr.clone();
                } else {
                    result.push(attr.clone());
                }
            }
        }
        result
    }

    fn has_collaborators(&self, class: &str) -> bool {
        self.ancestry(class).iter().any(|c| {
            self.classes
                .get(c)
                .map(|entry| entry.collaborators)
                .unwrap_or(false)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
