use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Semantic attributes of a sub-resource; the shape depends on its kind.
pub type Fields = Map<String, Value>;

/// Keys owned by the server that never travel back in a create or update.
pub const SERVER_MANAGED_KEYS: [&str; 4] = ["id", "package_id", "created_at", "updated_at"];

/// Position key stamped on every item at save time.
pub const ORDER_KEY: &str = "order_index";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubResource {
    Hotels,
    Itinerary,
    Gallery,
    Features,
    Info,
}

impl SubResource {
    pub const ALL: [SubResource; 5] = [
        SubResource::Hotels,
        SubResource::Itinerary,
        SubResource::Gallery,
        SubResource::Features,
        SubResource::Info,
    ];

    /// URL path segment under `packages/{id}/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubResource::Hotels => "hotels",
            SubResource::Itinerary => "itinerary",
            SubResource::Gallery => "gallery",
            SubResource::Features => "features",
            SubResource::Info => "info",
        }
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            SubResource::Hotels => &["name", "destination", "image_url", "price"],
            SubResource::Itinerary => &["title", "description"],
            SubResource::Gallery => &["image_url"],
            SubResource::Features => &["text"],
            SubResource::Info => &["icon", "label", "value"],
        }
    }

    /// Field shown as the row title, then the field shown as its subtitle.
    pub fn display_fields(&self) -> (&'static str, Option<&'static str>) {
        match self {
            SubResource::Hotels => ("name", Some("destination")),
            SubResource::Itinerary => ("title", Some("description")),
            SubResource::Gallery => ("image_url", Some("caption")),
            SubResource::Features => ("text", None),
            SubResource::Info => ("label", Some("icon")),
        }
    }
}

impl fmt::Display for SubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubResource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubResource::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown sub-resource '{}'", s))
    }
}

/// Top-level record that owns sub-resource collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentRef {
    pub resource: String,
    pub id: i64,
}

impl ParentRef {
    pub fn package(id: i64) -> Self {
        Self {
            resource: "packages".into(),
            id,
        }
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.id)
    }
}

/// One sub-resource as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: i64,
    #[serde(flatten)]
    pub fields: Fields,
}

impl RemoteItem {
    /// Fields with server-managed keys removed, ready to be staged.
    pub fn editable_fields(&self) -> Fields {
        strip_server_keys(&self.fields)
    }
}

pub fn strip_server_keys(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter(|(k, _)| !SERVER_MANAGED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Editable attributes of a travel package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageForm {
    pub title: String,
    pub description: String,
    pub price: String,
    pub image: String,
    pub category: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_tag: Option<String>,
    #[serde(default)]
    pub promoted: bool,
    #[serde(default)]
    pub carousel_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,
    #[serde(flatten)]
    pub form: PackageForm,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sub_resource_parses_case_insensitively() {
        assert_eq!("Hotels".parse::<SubResource>().unwrap(), SubResource::Hotels);
        assert_eq!(" gallery ".parse::<SubResource>().unwrap(), SubResource::Gallery);
        assert!("rooms".parse::<SubResource>().is_err());
    }

    #[test]
    fn remote_item_keeps_unknown_fields() {
        let item: RemoteItem = serde_json::from_value(json!({
            "id": 9,
            "package_id": 3,
            "name": "Hotel Sol",
            "stars": 4,
            "created_at": "2024-01-01T00:00:00"
        }))
        .unwrap();
        assert_eq!(item.id, 9);
        let editable = item.editable_fields();
        assert_eq!(editable.get("name"), Some(&json!("Hotel Sol")));
        assert_eq!(editable.get("stars"), Some(&json!(4)));
        assert!(editable.get("package_id").is_none());
        assert!(editable.get("created_at").is_none());
    }

    #[test]
    fn package_flattens_form() {
        let pkg: Package = serde_json::from_value(json!({
            "id": 1,
            "title": "Buenos Aires",
            "description": "Tres dias",
            "price": "$45.000",
            "image": "https://img/a.jpg",
            "category": "nacional",
            "features": ["Desayuno"],
            "promoted": true,
            "carousel_order": 2,
            "created_at": null
        }))
        .unwrap();
        assert_eq!(pkg.form.title, "Buenos Aires");
        assert!(pkg.form.promoted);
        assert_eq!(pkg.form.carousel_order, 2);
        assert_eq!(pkg.form.duration, None);
    }

    #[test]
    fn parent_ref_display() {
        assert_eq!(ParentRef::package(12).to_string(), "packages/12");
    }
}
