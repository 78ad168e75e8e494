//! FHIR reference parsing for values discovered in server responses.
//!
//! Handles relative (`Patient/123`), versioned (`Patient/123/_history/2`) and
//! absolute references under the server base URL. Contained (`#id`), URN and
//! foreign-server references cannot be followed by the harness.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FhirReference {
    pub resource_type: String,
    pub id: String,
    pub version: Option<String>,
}

impl FhirReference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version: None,
        }
    }

    /// `Type/id`, dropping any version.
    pub fn to_relative(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

impl fmt::Display for FhirReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_relative())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvableReference {
    Contained(String),
    Urn(String),
    External(String),
    Invalid(String),
}

impl fmt::Display for UnresolvableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contained(id) => write!(f, "contained reference: #{id}"),
            Self::Urn(urn) => write!(f, "URN reference: {urn}"),
            Self::External(url) => write!(f, "external reference: {url}"),
            Self::Invalid(reason) => write!(f, "invalid reference: {reason}"),
        }
    }
}

impl std::error::Error for UnresolvableReference {}

/// Parse `reference` into type, id and optional version.
///
/// Absolute URLs are accepted only when they start with `base_url`.
pub fn parse_reference(
    reference: &str,
    base_url: Option<&str>,
) -> Result<FhirReference, UnresolvableReference> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(UnresolvableReference::Invalid("empty reference".into()));
    }
    if let Some(id) = reference.strip_prefix('#') {
        return Err(UnresolvableReference::Contained(id.to_string()));
    }
    if reference.starts_with("urn:") {
        return Err(UnresolvableReference::Urn(reference.to_string()));
    }

    let path = if reference.contains("://") {
        let Some(base) = base_url else {
            return Err(UnresolvableReference::External(reference.to_string()));
        };
        match reference.strip_prefix(base.trim_end_matches('/')) {
            Some(suffix) => suffix.trim_start_matches('/'),
            None => return Err(UnresolvableReference::External(reference.to_string())),
        }
    } else {
        reference
    };

    let parts: Vec<&str> = path.split('/').collect();
    let (resource_type, id) = match parts.as_slice() {
        [resource_type, id, ..] => (*resource_type, *id),
        _ => {
            return Err(UnresolvableReference::Invalid(format!(
                "reference must contain at least Type/id: {reference}"
            )));
        }
    };

    if !resource_type
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
    {
        return Err(UnresolvableReference::Invalid(format!(
            "resource type must start with uppercase letter: {resource_type}"
        )));
    }
    if id.is_empty() {
        return Err(UnresolvableReference::Invalid(
            "resource id cannot be empty".into(),
        ));
    }

    let version = match parts.as_slice() {
        [_, _, "_history", version, ..] => Some((*version).to_string()),
        _ => None,
    };

    Ok(FhirReference {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        version,
    })
}

/// Whether two reference strings point at the same resource.
///
/// Absolute references under `base_url` compare like relative ones. A bare id
/// on either side matches any reference ending in that id; otherwise the
/// resource types must agree as well.
pub fn same_target(left: &str, right: &str, base_url: Option<&str>) -> bool {
    let (left_type, left_id) = target_of(left, base_url);
    let (right_type, right_id) = target_of(right, base_url);
    let types_agree = match (left_type, right_type) {
        (Some(l), Some(r)) => l == r,
        _ => true,
    };
    !left_id.is_empty() && left_id == right_id && types_agree
}

/// Type and id of `reference`. References [`parse_reference`] rejects, such as
/// ones on a foreign server, fall back to their last `Type/id` segments; the
/// type is `None` for a bare id.
fn target_of(reference: &str, base_url: Option<&str>) -> (Option<String>, String) {
    if let Ok(parsed) = parse_reference(reference, base_url) {
        return (Some(parsed.resource_type), parsed.id);
    }
    let mut segments = reference.trim().trim_end_matches('/').rsplit('/');
    let id = segments.next().unwrap_or_default().to_string();
    let resource_type = segments
        .next()
        .filter(|t| t.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
        .map(str::to_string);
    (resource_type, id)
}
