//! Text view of a draft. Everything here is derived from the draft itself.
use serde_json::Value;
use std::fmt;

use crate::draft::{DraftCollection, DraftItem};
use crate::model::SubResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Edit,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRow {
    pub index: usize,
    pub badge: &'static str,
    pub title: String,
    pub subtitle: Option<String>,
    pub actions: [Action; 2],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftView {
    pub kind: SubResource,
    pub rows: Vec<DraftRow>,
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn hotel_subtitle(item: &DraftItem) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(dest) = text_of(item.fields.get("destination")) {
        parts.push(dest);
    }
    if let Some(days) = item.fields.get("days").and_then(Value::as_i64) {
        parts.push(if days == 1 { "1 day".to_string() } else { format!("{} days", days) });
    }
    if let Some(price) = text_of(item.fields.get("price")) {
        parts.push(price);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" · "))
    }
}

fn row(kind: SubResource, index: usize, item: &DraftItem) -> DraftRow {
    let (title_key, subtitle_key) = kind.display_fields();
    let title = text_of(item.fields.get(title_key)).unwrap_or_else(|| format!("#{}", index + 1));
    let subtitle = match kind {
        SubResource::Hotels => hotel_subtitle(item),
        SubResource::Gallery if item.fields.get("is_cover").and_then(Value::as_bool) == Some(true) => {
            Some(match subtitle_key.and_then(|k| text_of(item.fields.get(k))) {
                Some(caption) => format!("{} (cover)", caption),
                None => "(cover)".to_string(),
            })
        }
        _ => subtitle_key.and_then(|k| text_of(item.fields.get(k))),
    };
    DraftRow {
        index,
        badge: if item.is_existing() { "saved" } else { "new" },
        title,
        subtitle,
        actions: [Action::Edit, Action::Delete],
    }
}

pub fn render(draft: &DraftCollection) -> DraftView {
    DraftView {
        kind: draft.kind(),
        rows: draft
            .items()
            .iter()
            .enumerate()
            .map(|(i, item)| row(draft.kind(), i, item))
            .collect(),
    }
}

impl fmt::Display for DraftView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "No {} added yet", self.kind);
        }
        for r in &self.rows {
            write!(f, "[{}] {:<5} {}", r.index, r.badge, r.title)?;
            if let Some(sub) = &r.subtitle {
                write!(f, " - {}", sub)?;
            }
            let actions: Vec<_> = r.actions.iter().map(Action::as_str).collect();
            writeln!(f, "  ({})", actions.join(" | "))?;
        }
        Ok(())
    }
}
