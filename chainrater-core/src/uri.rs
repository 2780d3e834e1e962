//! Validation for the URIs people rate. A URI is a schema from a fixed list followed by
//! a name of at least two characters, like `restaurant://chez-panisse`.

pub const VALID_SCHEMAS: [&str; 12] = [
    "restaurant://",
    "consumable://",
    "product://",
    "service://",
    "business://",
    "website://",
    "app://",
    "game://",
    "movie://",
    "book://",
    "music://",
    "person://",
];

const SEPARATOR: &str = "://";

fn split(uri: &str) -> Option<(&str, &str)> {
    let mut parts = uri.split(SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(schema), Some(name), None) => Some((schema, name)),
        _ => None,
    }
}

/// Whether the URI uses a known schema (case insensitive) and has a name of at least two
/// characters.
pub fn validate(uri: &str) -> bool {
    let lower = uri.to_lowercase();
    if !VALID_SCHEMAS.iter().any(|schema| lower.starts_with(schema)) {
        return false;
    }
    matches!(split(uri), Some((_, name)) if name.chars().count() >= 2)
}

/// Lower-case the schema, leaving the name alone.
pub fn format_uri(uri: &str) -> String {
    match split(uri) {
        Some((schema, name)) => format!("{}{SEPARATOR}{name}", schema.to_lowercase()),
        None => uri.to_string(),
    }
}

pub fn display_name(uri: &str) -> &str {
    split(uri).map_or(uri, |(_, name)| name)
}

pub fn schema(uri: &str) -> &str {
    split(uri).map_or("", |(schema, _)| schema)
}
