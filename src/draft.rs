//! In-memory staging area for one sub-resource collection of a parent record.
//!
//! All mutations go through [`DraftCollection::apply`], a reducer over the
//! [`Command`] enum. The reducer is pure: it never talks to the server. When a
//! removal touches an item that already exists remotely it reports that
//! through [`Effect::RemovedExisting`] and leaves the decision of when to
//! delete it to the caller.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Fields, ParentRef, RemoteItem, SubResource};
use crate::validation::{validate_fields, ValidationError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("no draft item at index {index} (draft has {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One staged sub-resource.
///
/// The remote id is present exactly when the item exists on the server. It
/// is only set by [`DraftItem::existing`] and by reconciliation, so an
/// existing item can never lack an id and a local one can never carry one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    remote_id: Option<i64>,
    pub fields: Fields,
}

impl DraftItem {
    pub fn local(fields: Fields) -> Self {
        Self {
            remote_id: None,
            fields,
        }
    }

    pub fn existing(remote_id: i64, fields: Fields) -> Self {
        Self {
            remote_id: Some(remote_id),
            fields,
        }
    }

    pub fn remote_id(&self) -> Option<i64> {
        self.remote_id
    }

    pub fn is_existing(&self) -> bool {
        self.remote_id.is_some()
    }
}

/// User intent against a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    AddItem { fields: Fields },
    UpdateItem { index: usize, fields: Fields },
    RemoveItem { index: usize },
    Reorder { from: usize, to: usize },
}

/// Consequence of a command that the owner of the draft has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    RemovedExisting(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftCollection {
    kind: SubResource,
    parent: Option<ParentRef>,
    items: Vec<DraftItem>,
}

impl DraftCollection {
    /// Empty draft for a parent that does not exist on the server yet.
    pub fn new(kind: SubResource) -> Self {
        Self {
            kind,
            parent: None,
            items: Vec::new(),
        }
    }

    /// Draft populated from the server's current collection.
    pub fn from_remote(parent: ParentRef, kind: SubResource, remote: &[RemoteItem]) -> Self {
        let items = remote
            .iter()
            .map(|item| DraftItem::existing(item.id, item.editable_fields()))
            .collect();
        Self {
            kind,
            parent: Some(parent),
            items,
        }
    }

    pub fn kind(&self) -> SubResource {
        self.kind
    }

    pub fn parent(&self) -> Option<&ParentRef> {
        self.parent.as_ref()
    }

    pub(crate) fn bind_parent(&mut self, parent: ParentRef) {
        self.parent = Some(parent);
    }

    pub fn items(&self) -> &[DraftItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remote ids of every existing item, in draft order.
    pub fn remote_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.items.iter().filter_map(|item| item.remote_id)
    }

    fn check_index(&self, index: usize) -> Result<(), DraftError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(DraftError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<Effect, DraftError> {
        match command {
            Command::AddItem { fields } => {
                validate_fields(self.kind, &fields)?;
                self.items.push(DraftItem::local(fields));
                Ok(Effect::None)
            }
            Command::UpdateItem { index, fields } => {
                self.check_index(index)?;
                let mut merged = self.items[index].fields.clone();
                merged.extend(fields);
                validate_fields(self.kind, &merged)?;
                self.items[index].fields = merged;
                Ok(Effect::None)
            }
            Command::RemoveItem { index } => {
                self.check_index(index)?;
                let removed = self.items.remove(index);
                Ok(match removed.remote_id {
                    Some(id) => Effect::RemovedExisting(id),
                    None => Effect::None,
                })
            }
            Command::Reorder { from, to } => {
                self.check_index(from)?;
                self.check_index(to)?;
                let item = self.items.remove(from);
                self.items.insert(to, item);
                Ok(Effect::None)
            }
        }
    }

    /// Record the id the server assigned to a freshly created item.
    pub(crate) fn mark_created(&mut self, index: usize, remote_id: i64) {
        if let Some(item) = self.items.get_mut(index) {
            item.remote_id = Some(remote_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    fn hotel(name: &str) -> Fields {
        fields(json!({
            "name": name,
            "destination": "Mendoza",
            "image_url": "https://img/hotel.jpg",
            "price": "$30.000"
        }))
    }

    fn seeded() -> DraftCollection {
        let remote = vec![
            RemoteItem { id: 5, fields: hotel("Hotel A") },
            RemoteItem { id: 9, fields: hotel("Hotel C") },
        ];
        DraftCollection::from_remote(ParentRef::package(1), SubResource::Hotels, &remote)
    }

    #[test]
    fn from_remote_marks_items_existing() {
        let draft = seeded();
        assert_eq!(draft.len(), 2);
        assert!(draft.items().iter().all(DraftItem::is_existing));
        assert_eq!(draft.remote_ids().collect::<Vec<_>>(), vec![5, 9]);
    }

    #[test]
    fn only_existing_items_carry_an_id() {
        let local = DraftItem::local(hotel("Hotel B"));
        assert_eq!((local.remote_id(), local.is_existing()), (None, false));
        let existing = DraftItem::existing(7, hotel("Hotel A"));
        assert_eq!((existing.remote_id(), existing.is_existing()), (Some(7), true));
    }

    #[test]
    fn add_appends_local_item() {
        let mut draft = seeded();
        let effect = draft.apply(Command::AddItem { fields: hotel("Hotel B") }).unwrap();
        assert_eq!(effect, Effect::None);
        assert_eq!(draft.len(), 3);
        assert!(!draft.items()[2].is_existing());
        assert_eq!(draft.items()[2].remote_id(), None);
    }

    #[test]
    fn add_rejects_missing_required_field() {
        let mut draft = DraftCollection::new(SubResource::Hotels);
        let err = draft
            .apply(Command::AddItem { fields: fields(json!({ "name": "x" })) })
            .unwrap_err();
        assert!(matches!(err, DraftError::Validation(_)));
        assert!(draft.is_empty());
    }

    #[test]
    fn update_merges_fields_for_existing_and_new() {
        let mut draft = seeded();
        draft.apply(Command::AddItem { fields: hotel("Hotel B") }).unwrap();

        draft
            .apply(Command::UpdateItem { index: 0, fields: fields(json!({ "stars": 5 })) })
            .unwrap();
        draft
            .apply(Command::UpdateItem { index: 2, fields: fields(json!({ "name": "Hotel B2" })) })
            .unwrap();

        assert_eq!(draft.items()[0].fields.get("stars"), Some(&json!(5)));
        assert_eq!(draft.items()[0].fields.get("name"), Some(&json!("Hotel A")));
        assert_eq!(draft.items()[2].fields.get("name"), Some(&json!("Hotel B2")));
        assert_eq!(draft.items()[0].remote_id(), Some(5));
    }

    #[test]
    fn invalid_update_leaves_item_untouched() {
        let mut draft = seeded();
        let before = draft.items()[0].clone();
        let err = draft
            .apply(Command::UpdateItem { index: 0, fields: fields(json!({ "name": "" })) })
            .unwrap_err();
        assert!(matches!(err, DraftError::Validation(_)));
        assert_eq!(draft.items()[0], before);
    }

    #[test]
    fn remove_existing_reports_remote_id() {
        let mut draft = seeded();
        draft.apply(Command::AddItem { fields: hotel("Hotel B") }).unwrap();

        let effect = draft.apply(Command::RemoveItem { index: 1 }).unwrap();
        assert_eq!(effect, Effect::RemovedExisting(9));

        let effect = draft.apply(Command::RemoveItem { index: 1 }).unwrap();
        assert_eq!(effect, Effect::None);
        assert_eq!(draft.len(), 1);
    }

    #[test]
    fn remove_can_empty_the_draft() {
        let mut draft = seeded();
        draft.apply(Command::RemoveItem { index: 0 }).unwrap();
        draft.apply(Command::RemoveItem { index: 0 }).unwrap();
        assert!(draft.is_empty());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut draft = seeded();
        let err = draft.apply(Command::RemoveItem { index: 2 }).unwrap_err();
        assert_eq!(err, DraftError::IndexOutOfRange { index: 2, len: 2 });
        let err = draft.apply(Command::Reorder { from: 0, to: 7 }).unwrap_err();
        assert_eq!(err, DraftError::IndexOutOfRange { index: 7, len: 2 });
    }

    #[test]
    fn reorder_moves_item() {
        let mut draft = seeded();
        draft.apply(Command::AddItem { fields: hotel("Hotel B") }).unwrap();
        draft.apply(Command::Reorder { from: 2, to: 0 }).unwrap();
        let names: Vec<_> = draft
            .items()
            .iter()
            .map(|i| i.fields["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Hotel B", "Hotel A", "Hotel C"]);
    }

    #[test]
    fn commands_deserialize_from_yaml() {
        let raw = r#"
- op: add_item
  fields: { name: "Hotel B", destination: "Salta", image_url: "https://img/b.jpg", price: "$20.000" }
- op: update_item
  index: 0
  fields: { stars: 4 }
- op: remove_item
  index: 1
- op: reorder
  from: 0
  to: 1
"#;
        let cmds: Vec<Command> = serde_yaml::from_str(raw).unwrap();
        assert_eq!(cmds.len(), 4);
        assert!(matches!(cmds[2], Command::RemoveItem { index: 1 }));
        assert!(matches!(cmds[3], Command::Reorder { from: 0, to: 1 }));
    }
}
