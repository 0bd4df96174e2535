use crate::error::{Error, Result};

/// A parsed column tag: `column` or `column,json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub column: String,
    pub json: bool,
}

/// Parse a raw column tag.
///
/// The first segment is the column name and must not be empty. Remaining
/// segments are modifiers; `json` is the only one recognised.
pub fn parse_tag(raw: &str) -> Result<Tag> {
    let mut segments = raw.split(',').map(str::trim);

    let column = segments.next().unwrap_or_default();
    if column.is_empty() {
        return Err(invalid(raw, "column name is empty"));
    }

    let mut json = false;
    for modifier in segments {
        match modifier {
            "json" => json = true,
            "" => return Err(invalid(raw, "empty modifier")),
            _ => return Err(invalid(raw, "unknown modifier")),
        }
    }

    Ok(Tag {
        column: column.to_string(),
        json,
    })
}

fn invalid(raw: &str, reason: &'static str) -> Error {
    Error::InvalidTag {
        tag: raw.to_string(),
        reason,
    }
}
