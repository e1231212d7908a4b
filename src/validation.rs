//! Client-side checks run before any remote call is issued.
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::model::{Fields, PackageForm, SubResource};

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Z]{0,3}\s?\$|USD\s?)?\s?\d[\d.,]*$").expect("valid price regex"));

static IMAGE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:https?://\S+|/\S+)$").expect("valid image url regex"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    Missing(String),
    #[error("invalid price '{0}'")]
    Price(String),
    #[error("field 'days' must be a positive integer")]
    Days,
    #[error("invalid image url '{0}'")]
    ImageUrl(String),
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    }
}

fn check_price(raw: &str) -> Result<(), ValidationError> {
    if PRICE_RE.is_match(raw.trim()) {
        Ok(())
    } else {
        Err(ValidationError::Price(raw.to_string()))
    }
}

fn check_image_url(raw: &str) -> Result<(), ValidationError> {
    if IMAGE_URL_RE.is_match(raw.trim()) {
        Ok(())
    } else {
        Err(ValidationError::ImageUrl(raw.to_string()))
    }
}

/// Validate the staged fields of one sub-resource.
pub fn validate_fields(kind: SubResource, fields: &Fields) -> Result<(), ValidationError> {
    for name in kind.required_fields() {
        if is_blank(fields.get(*name)) {
            return Err(ValidationError::Missing((*name).to_string()));
        }
    }

    match fields.get("price") {
        Some(Value::String(p)) if !p.trim().is_empty() => check_price(p)?,
        Some(Value::Number(n)) if n.as_f64().map_or(true, |v| v < 0.0) => {
            return Err(ValidationError::Price(n.to_string()))
        }
        _ => {}
    }

    if let Some(days) = fields.get("days").filter(|v| !v.is_null()) {
        match days.as_i64() {
            Some(d) if d > 0 => {}
            _ => return Err(ValidationError::Days),
        }
    }

    if let Some(Value::String(url)) = fields.get("image_url") {
        check_image_url(url)?;
    }

    Ok(())
}

/// Validate the parent package form before it is created or updated.
pub fn validate_package(form: &PackageForm) -> Result<(), ValidationError> {
    let required = [
        ("title", &form.title),
        ("description", &form.description),
        ("price", &form.price),
        ("image", &form.image),
        ("category", &form.category),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::Missing(name.to_string()));
        }
    }
    check_price(&form.price)?;
    check_image_url(&form.image)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    fn hotel(extra: Value) -> Fields {
        let mut f = fields(json!({
            "name": "Llao Llao",
            "destination": "Bariloche",
            "image_url": "https://img/llao.jpg",
            "price": "$120.000"
        }));
        f.extend(fields(extra));
        f
    }

    #[test]
    fn hotel_requires_every_non_null_column() {
        validate_fields(SubResource::Hotels, &hotel(json!({ "days": 3 }))).unwrap();

        for key in ["name", "destination", "image_url", "price"] {
            let mut f = hotel(json!({}));
            f.remove(key);
            assert_eq!(
                validate_fields(SubResource::Hotels, &f),
                Err(ValidationError::Missing(key.into()))
            );
        }

        let err = validate_fields(SubResource::Hotels, &hotel(json!({ "name": "  " }))).unwrap_err();
        assert_eq!(err, ValidationError::Missing("name".into()));
    }

    #[test]
    fn info_requires_value() {
        let f = fields(json!({ "icon": "clock", "label": "Duracion" }));
        assert_eq!(
            validate_fields(SubResource::Info, &f),
            Err(ValidationError::Missing("value".into()))
        );
        let f = fields(json!({ "icon": "clock", "label": "Duracion", "value": "5 dias" }));
        validate_fields(SubResource::Info, &f).unwrap();
    }

    #[test]
    fn days_must_be_positive() {
        assert_eq!(
            validate_fields(SubResource::Hotels, &hotel(json!({ "days": 0 }))),
            Err(ValidationError::Days)
        );
        assert_eq!(
            validate_fields(SubResource::Hotels, &hotel(json!({ "days": "two" }))),
            Err(ValidationError::Days)
        );
    }

    #[test]
    fn price_formats() {
        assert!(check_price("$45.000").is_ok());
        assert!(check_price("USD 1,200").is_ok());
        assert!(check_price("ARS $ 99").is_ok());
        assert!(check_price("1500").is_ok());
        assert!(check_price("free").is_err());
        assert!(check_price("$").is_err());
    }

    #[test]
    fn image_urls_checked() {
        let ok = fields(json!({ "image_url": "https://cdn.example/a.jpg" }));
        validate_fields(SubResource::Gallery, &ok).unwrap();
        let local = fields(json!({ "image_url": "/static/img/a.jpg" }));
        validate_fields(SubResource::Gallery, &local).unwrap();
        let bad = fields(json!({ "image_url": "a.jpg" }));
        assert!(matches!(
            validate_fields(SubResource::Gallery, &bad),
            Err(ValidationError::ImageUrl(_))
        ));
        assert!(matches!(
            validate_fields(SubResource::Hotels, &hotel(json!({ "image_url": "llao.jpg" }))),
            Err(ValidationError::ImageUrl(_))
        ));
    }

    #[test]
    fn package_form_required_fields() {
        let mut form = PackageForm {
            title: "Salta".into(),
            description: "Norte".into(),
            price: "$80.000".into(),
            image: "https://img/salta.jpg".into(),
            category: "nacional".into(),
            ..Default::default()
        };
        validate_package(&form).unwrap();

        form.category = "".into();
        assert_eq!(
            validate_package(&form),
            Err(ValidationError::Missing("category".into()))
        );
    }
}
