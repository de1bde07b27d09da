//! In-memory template store.

use dashmap::DashMap;
use uuid::Uuid;

use dispatch_core::templates::{MessageTemplate, TemplateStatus, TemplateStore};

/// Thread-safe template table. Only `active` templates are served; the
/// sequence engine treats a missing template as a skipped step, never an
/// engine error.
pub struct InMemoryTemplateStore {
    templates: DashMap<Uuid, MessageTemplate>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    pub fn insert(&self, template: MessageTemplate) -> Uuid {
        let id = template.id;
        self.templates.insert(id, template);
        id
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn get(&self, id: &Uuid) -> Option<MessageTemplate> {
        self.templates
            .get(id)
            .filter(|t| t.status == TemplateStatus::Active)
            .map(|t| t.clone())
    }
}
