//! Message templates and `{{variable}}` rendering.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Channel;

/// Lifecycle status of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Draft,
    Active,
    Archived,
}

/// A message template. Email templates carry a subject and an optional
/// plain-text alternative; SMS templates use `body` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: Uuid,
    pub name: String,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub text_body: Option<String>,
    pub status: TemplateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageTemplate {
    pub fn new(name: &str, channel: Channel, subject: Option<&str>, body: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            channel,
            subject: subject.map(str::to_string),
            body: body.to_string(),
            text_body: None,
            status: TemplateStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Replace every literal `{{key}}` in `template` with the map's value.
///
/// Placeholders with no matching key are left verbatim. That is deliberate:
/// a half-populated variable map must never turn into an error or an empty
/// string at render time.
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

/// Fetch-by-id template source consumed by the sequence engine.
pub trait TemplateStore: Send + Sync {
    fn get(&self, id: &Uuid) -> Option<MessageTemplate>;
}

pub type SharedTemplateStore = Arc<dyn TemplateStore>;
