//! Draft-and-commit editing of travel package sub-resources against the
//! agency's REST backend.
//!
//! Edits to a package's hotels, itinerary, gallery, features and info items
//! are staged in a [`draft::DraftCollection`] and reconciled with the server
//! in one best-effort pass ([`reconcile::reconcile`]) when the package form
//! is submitted.

pub mod api;
pub mod carousel;
pub mod config;
pub mod draft;
pub mod editor;
pub mod model;
pub mod reconcile;
pub mod render;
pub mod validation;
