//! Typed decoding of approved-product payloads.
//!
//! Product research arrives as loosely structured JSON. It is decoded once
//! here into [`ProductInsights`]; a field that is present but has a shape we
//! do not accept fails with [`SchemaMismatch`] instead of being guessed at.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaMismatch {
    #[error("product payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("product payload must be an object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("field `{field}` must be {expected}, found {found}")]
    UnexpectedShape {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Which accepted layout the competitors came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum CompetitorShape {
    /// `competitors: ["A", "B"]`
    List,
    /// `competitors: {direct: [...], niche: [...]}`
    Categorized,
    /// One of the alternative fields, e.g. `competitive_landscape`.
    Alternative(String),
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub title: String,
    pub description: Option<String>,
    pub display_text: String,
    pub full_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInsights {
    pub keywords: Vec<String>,
    pub pain_points: Vec<String>,
    pub capabilities: Vec<Capability>,
    pub usps: Vec<String>,
    pub competitors: Vec<String>,
    pub competitor_shape: CompetitorShape,
}

const CAPABILITY_FIELDS: [&str; 3] = ["capabilities", "features", "keyFeatures"];
const USP_FIELDS: [&str; 5] = [
    "usps",
    "unique_selling_propositions",
    "uniqueSellingPropositions",
    "selling_points",
    "value_propositions",
];
const COMPETITOR_CATEGORIES: [&str; 12] = [
    "direct",
    "niche",
    "broader",
    "primary",
    "secondary",
    "indirect",
    "Direct",
    "Niche",
    "Broader",
    "direct_competitors",
    "niche_competitors",
    "broader_competitors",
];
const ALTERNATIVE_COMPETITOR_FIELDS: [&str; 4] = [
    "competition",
    "competitive_landscape",
    "rivals",
    "competitive_analysis",
];
const PREVIEW_CHARS: usize = 50;

/// Decodes one `product_data` value. Payloads stored as JSON text are parsed
/// first.
pub fn decode_product(payload: &Value) -> Result<ProductInsights, SchemaMismatch> {
    let parsed;
    let payload = match payload {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw)
                .map_err(|err| SchemaMismatch::InvalidJson(err.to_string()))?;
            &parsed
        }
        other => other,
    };

    let object = payload.as_object().ok_or(SchemaMismatch::NotAnObject {
        found: kind(payload),
    })?;

    let keywords = string_list(object, "keywords")?;
    let pain_points = string_list(object, "painPoints")?;
    let usps = first_string_list(object, &USP_FIELDS)?;
    let capabilities = capabilities(object)?;
    let (competitors, competitor_shape) = competitors(object)?;

    Ok(ProductInsights {
        keywords,
        pain_points,
        capabilities,
        usps,
        competitors,
        competitor_shape,
    })
}

/// Merges decoded payloads, keeping first occurrences in order.
pub fn merge(items: Vec<ProductInsights>) -> ProductInsights {
    let mut merged = ProductInsights {
        keywords: Vec::new(),
        pain_points: Vec::new(),
        capabilities: Vec::new(),
        usps: Vec::new(),
        competitors: Vec::new(),
        competitor_shape: CompetitorShape::Absent,
    };
    for item in items {
        extend_unique(&mut merged.keywords, item.keywords);
        extend_unique(&mut merged.pain_points, item.pain_points);
        extend_unique(&mut merged.usps, item.usps);
        extend_unique(&mut merged.competitors, item.competitors);
        for capability in item.capabilities {
            if !merged
                .capabilities
                .iter()
                .any(|existing| existing.display_text == capability.display_text)
            {
                merged.capabilities.push(capability);
            }
        }
        if merged.competitor_shape == CompetitorShape::Absent {
            merged.competitor_shape = item.competitor_shape;
        }
    }
    merged
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(field: &str, expected: &'static str, found: &Value) -> SchemaMismatch {
    SchemaMismatch::UnexpectedShape {
        field: field.to_string(),
        expected,
        found: kind(found),
    }
}

fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|value| !value.is_null())
}

fn strings_in(field: &str, items: &[Value]) -> Result<Vec<String>, SchemaMismatch> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| Ok(text.to_string()))
            }
            other => Some(Err(mismatch(field, "an array of strings", other))),
        })
        .collect()
}

fn string_list(object: &Map<String, Value>, field: &str) -> Result<Vec<String>, SchemaMismatch> {
    match present(object, field) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => strings_in(field, items),
        Some(other) => Err(mismatch(field, "an array of strings", other)),
    }
}

fn first_string_list(
    object: &Map<String, Value>,
    fields: &[&str],
) -> Result<Vec<String>, SchemaMismatch> {
    match fields.iter().find(|field| present(object, field).is_some()) {
        Some(field) => string_list(object, field),
        None => Ok(Vec::new()),
    }
}

fn capabilities(object: &Map<String, Value>) -> Result<Vec<Capability>, SchemaMismatch> {
    let Some((field, value)) = CAPABILITY_FIELDS
        .iter()
        .find_map(|field| present(object, field).map(|value| (*field, value)))
    else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = value else {
        return Err(mismatch(field, "an array", value));
    };

    let mut capabilities = Vec::new();
    for item in items {
        let capability = match item {
            Value::String(text) => {
                let text = text.trim().to_string();
                Capability {
                    title: text.clone(),
                    description: None,
                    display_text: text.clone(),
                    full_text: text,
                }
            }
            Value::Object(entry) => {
                let title = first_text(entry, &["title", "name"]).unwrap_or_default();
                let description = first_text(entry, &["description", "content", "text"]);
                capability_from_parts(title, description)
            }
            other => return Err(mismatch(field, "strings or objects", other)),
        };
        if !capability.display_text.trim().is_empty() {
            capabilities.push(capability);
        }
    }
    Ok(capabilities)
}

fn capability_from_parts(title: String, description: Option<String>) -> Capability {
    let (display_text, full_text) = match description.as_deref() {
        Some(description) => {
            let preview: String = description.chars().take(PREVIEW_CHARS).collect();
            let ellipsis = if description.chars().count() > PREVIEW_CHARS {
                "..."
            } else {
                ""
            };
            (
                format!("{}: {}{}", title, preview, ellipsis),
                format!("{}\n{}", title, description),
            )
        }
        None => (title.clone(), title.clone()),
    };
    Capability {
        title,
        description,
        display_text,
        full_text,
    }
}

fn first_text(entry: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn competitors(
    object: &Map<String, Value>,
) -> Result<(Vec<String>, CompetitorShape), SchemaMismatch> {
    match present(object, "competitors") {
        Some(Value::Array(items)) => {
            return Ok((strings_in("competitors", items)?, CompetitorShape::List))
        }
        Some(Value::Object(categories)) => {
            return Ok((categorized(categories)?, CompetitorShape::Categorized))
        }
        Some(other) => return Err(mismatch("competitors", "an array or an object", other)),
        None => {}
    }

    for field in ALTERNATIVE_COMPETITOR_FIELDS {
        let Some(value) = present(object, field) else {
            continue;
        };
        let names = match value {
            Value::Array(items) => strings_in(field, items)?,
            Value::Object(groups) => {
                let mut names = Vec::new();
                for group in groups.values() {
                    if let Value::Array(items) = group {
                        names.extend(strings_in(field, items)?);
                    }
                }
                names
            }
            other => return Err(mismatch(field, "an array or an object", other)),
        };
        return Ok((names, CompetitorShape::Alternative(field.to_string())));
    }

    Ok((Vec::new(), CompetitorShape::Absent))
}

fn categorized(categories: &Map<String, Value>) -> Result<Vec<String>, SchemaMismatch> {
    let mut names = Vec::new();
    for category in COMPETITOR_CATEGORIES {
        let Some(entries) = categories.get(category) else {
            continue;
        };
        let Value::Array(entries) = entries else {
            return Err(mismatch(category, "an array", entries));
        };
        for entry in entries {
            match entry {
                Value::String(name) if !name.trim().is_empty() => {
                    names.push(name.trim().to_string())
                }
                Value::String(_) => {}
                Value::Object(fields) => {
                    let Some(company) = first_text(
                        fields,
                        &["company_name", "name", "company", "competitor", "title"],
                    ) else {
                        continue;
                    };
                    let product = first_text(fields, &["product_name", "product", "platform"]);
                    let label = match (product, first_text(fields, &["category", "description"])) {
                        (Some(product), _) => format!("{} ({})", company, product),
                        (None, Some(detail)) => format!("{} ({})", company, detail),
                        (None, None) => company,
                    };
                    names.push(label);
                }
                other => return Err(mismatch(category, "strings or objects", other)),
            }
        }
    }
    Ok(names)
}
