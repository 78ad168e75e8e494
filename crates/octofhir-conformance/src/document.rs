//! Generic accessors over FHIR JSON documents.
//!
//! The engine never interprets domain semantics beyond a `resourceType`
//! discriminator and dotted-path navigation. Paths treat arrays transparently
//! and match polymorphic fields by prefix, so `effective` resolves
//! `effectiveDateTime` as well as `effectivePeriod`.

use serde_json::Value;

/// A value usable as a search parameter, with its coding system when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchValue {
    pub system: Option<String>,
    pub value: String,
}

impl SearchValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            system: None,
            value: value.into(),
        }
    }

    pub fn with_system(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            value: value.into(),
        }
    }
}

pub fn resource_type(document: &Value) -> Option<&str> {
    document.get("resourceType").and_then(Value::as_str)
}

pub fn id(document: &Value) -> Option<&str> {
    document.get("id").and_then(Value::as_str)
}

/// `Type/id` label for messages; falls back to `Type/?`.
pub fn label(document: &Value) -> String {
    format!(
        "{}/{}",
        resource_type(document).unwrap_or("Resource"),
        id(document).unwrap_or("?")
    )
}

/// Resolve a dotted path, flattening arrays along the way.
///
/// A leading segment equal to the document's own `resourceType` is ignored.
pub fn resolve<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let prefixed = matches!(
        (segments.first(), resource_type(document)),
        (Some(first), Some(rt)) if *first == rt
    );
    if prefixed {
        segments.remove(0);
    }

    let mut results = Vec::new();
    navigate(document, &segments, &mut results);
    results
}

pub fn resolve_first<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    resolve(document, path).into_iter().next()
}

/// Datatype suffixes a `[x]` element can carry.
const CHOICE_TYPES: &[&str] = &[
    "Base64Binary",
    "Boolean",
    "Canonical",
    "Code",
    "Date",
    "DateTime",
    "Decimal",
    "Id",
    "Instant",
    "Integer",
    "Integer64",
    "Markdown",
    "Oid",
    "PositiveInt",
    "String",
    "Time",
    "UnsignedInt",
    "Uri",
    "Url",
    "Uuid",
    "Address",
    "Age",
    "Annotation",
    "Attachment",
    "CodeableConcept",
    "CodeableReference",
    "Coding",
    "ContactPoint",
    "Count",
    "Distance",
    "Duration",
    "HumanName",
    "Identifier",
    "Money",
    "Period",
    "Quantity",
    "Range",
    "Ratio",
    "RatioRange",
    "Reference",
    "SampledData",
    "Signature",
    "Timing",
    "ContactDetail",
    "DataRequirement",
    "Expression",
    "ParameterDefinition",
    "RelatedArtifact",
    "TriggerDefinition",
    "UsageContext",
    "Dosage",
    "Meta",
];

fn navigate<'a>(value: &'a Value, segments: &[&str], results: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = segments.split_first() else {
        match value {
            Value::Array(items) => results.extend(items.iter()),
            Value::Null => {}
            other => results.push(other),
        }
        return;
    };

    match value {
        Value::Object(obj) => {
            if let Some(child) = obj.get(*segment) {
                navigate(child, rest, results);
            } else {
                // Polymorphic fields: `value` matches `valueQuantity`, `valueString`, ...
                for (key, child) in obj {
                    if key
                        .strip_prefix(*segment)
                        .is_some_and(|suffix| CHOICE_TYPES.contains(&suffix))
                    {
                        navigate(child, rest, results);
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                navigate(item, segments, results);
            }
        }
        _ => {}
    }
}

/// All values an element could be searched by, most specific first.
pub fn candidates(element: &Value) -> Vec<SearchValue> {
    match element {
        Value::String(s) if !s.is_empty() => vec![SearchValue::new(s.as_str())],
        Value::Number(n) => vec![SearchValue::new(n.to_string())],
        Value::Bool(b) => vec![SearchValue::new(b.to_string())],
        Value::Object(_) => object_candidates(element),
        _ => Vec::new(),
    }
}

fn object_candidates(element: &Value) -> Vec<SearchValue> {
    let text = |key: &str| {
        element
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    let system = text("system").map(str::to_string);

    // Reference
    if let Some(reference) = text("reference") {
        return vec![SearchValue::new(reference)];
    }

    // CodeableConcept
    if let Some(codings) = element.get("coding").and_then(Value::as_array) {
        return codings.iter().flat_map(object_candidates).collect();
    }

    // Coding, code-bearing Quantity
    if let Some(code) = text("code") {
        return vec![SearchValue {
            system,
            value: code.to_string(),
        }];
    }

    // Identifier
    if let Some(value) = text("value") {
        return vec![SearchValue {
            system,
            value: value.to_string(),
        }];
    }

    // Period
    if element.get("start").is_some() || element.get("end").is_some() {
        return ["start", "end"]
            .iter()
            .filter_map(|k| text(*k))
            .map(SearchValue::new)
            .collect();
    }

    // HumanName
    if element.get("family").is_some() || element.get("given").is_some() {
        let mut values: Vec<SearchValue> = text("family").map(SearchValue::new).into_iter().collect();
        if let Some(given) = element.get("given").and_then(Value::as_array) {
            values.extend(
                given
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(SearchValue::new),
            );
        }
        values.extend(text("text").map(SearchValue::new));
        return values;
    }

    // Address, or anything else carrying a narrative text
    ["text", "city", "state", "postalCode", "country"]
        .iter()
        .filter_map(|k| text(*k))
        .map(SearchValue::new)
        .collect()
}

/// The single value a search would use for `element`: the first candidate in document order.
pub fn search_value(element: &Value) -> Option<SearchValue> {
    candidates(element).into_iter().next()
}

/// Resolve `path` on `document` and pick the first searchable value.
pub fn resolve_search_value(document: &Value, path: &str) -> Option<SearchValue> {
    resolve(document, path).into_iter().find_map(search_value)
}

// ============================================================================
// Bundle helpers
// ============================================================================

/// `entry[].resource` documents of a Bundle, optionally restricted to one type.
pub fn bundle_resources<'a>(bundle: &'a Value, resource_type: Option<&str>) -> Vec<&'a Value> {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("resource"))
                .filter(|r| resource_type.is_none_or(|rt| self::resource_type(r) == Some(rt)))
                .collect()
        })
        .unwrap_or_default()
}

/// URL of the `next` link of a paged Bundle.
pub fn next_link(bundle: &Value) -> Option<&str> {
    bundle
        .get("link")
        .and_then(Value::as_array)?
        .iter()
        .find(|l| l.get("relation").and_then(Value::as_str) == Some("next"))
        .and_then(|l| l.get("url"))
        .and_then(Value::as_str)
}

/// `diagnostics` (or `details.text`) of every issue in an OperationOutcome.
pub fn outcome_messages(outcome: &Value) -> Vec<String> {
    outcome
        .get("issue")
        .and_then(Value::as_array)
        .map(|issues| {
            issues
                .iter()
                .filter_map(|i| {
                    i.get("diagnostics")
                        .and_then(Value::as_str)
                        .or_else(|| i.pointer("/details/text").and_then(Value::as_str))
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation() -> Value {
        json!({
            "resourceType": "Observation",
            "id": "obs-1",
            "status": "final",
            "subject": { "reference": "Patient/85" },
            "code": {
                "coding": [
                    { "system": "http://loinc.org", "code": "2708-6" },
                    { "system": "http://loinc.org", "code": "59408-5" }
                ]
            },
            "effectiveDateTime": "2024-03-01T10:00:00Z",
            "component": [
                { "code": { "coding": [{ "code": "8480-6" }] } },
                { "code": { "coding": [{ "code": "8462-4" }] } }
            ]
        })
    }

    #[test]
    fn test_resolve_simple_and_prefixed() {
        let obs = observation();
        assert_eq!(resolve(&obs, "status"), vec![&json!("final")]);
        assert_eq!(resolve(&obs, "Observation.status"), vec![&json!("final")]);
        assert!(resolve(&obs, "missing.path").is_empty());
    }

    #[test]
    fn test_resolve_flattens_arrays() {
        let obs = observation();
        let codes = resolve(&obs, "component.code.coding.code");
        assert_eq!(codes, vec![&json!("8480-6"), &json!("8462-4")]);
    }

    #[test]
    fn test_resolve_polymorphic() {
        let obs = observation();
        assert_eq!(
            resolve_first(&obs, "effective"),
            Some(&json!("2024-03-01T10:00:00Z"))
        );
    }

    #[test]
    fn test_choice_suffix_must_be_a_datatype() {
        let condition = json!({
            "resourceType": "Condition",
            "id": "c1",
            "statusReason": { "text": "entered by mistake" },
            "dateAsserted": "2024-01-01",
            "onsetPeriod": { "start": "2023-12-01" }
        });

        assert!(resolve(&condition, "status").is_empty());
        assert!(resolve(&condition, "date").is_empty());
        assert!(resolve_search_value(&condition, "status").is_none());
        assert_eq!(
            resolve_search_value(&condition, "onset"),
            Some(SearchValue::new("2023-12-01"))
        );
    }

    #[test]
    fn test_search_value_picks_first_coding() {
        let obs = observation();
        let value = resolve_search_value(&obs, "code").unwrap();
        assert_eq!(value, SearchValue::with_system("http://loinc.org", "2708-6"));
    }

    #[test]
    fn test_search_value_shapes() {
        assert_eq!(
            search_value(&json!({"reference": "Patient/85"})),
            Some(SearchValue::new("Patient/85"))
        );
        assert_eq!(
            search_value(&json!({"system": "urn:mrn", "value": "1032702"})),
            Some(SearchValue::with_system("urn:mrn", "1032702"))
        );
        assert_eq!(
            search_value(&json!({"start": "2020-01-01"})),
            Some(SearchValue::new("2020-01-01"))
        );
        assert_eq!(
            search_value(&json!({"family": "Shaw", "given": ["Amy"]})),
            Some(SearchValue::new("Shaw"))
        );
        assert_eq!(
            search_value(&json!({"given": ["Amy"]})),
            Some(SearchValue::new("Amy"))
        );
        assert_eq!(
            search_value(&json!({"city": "Boston", "state": "MA"})),
            Some(SearchValue::new("Boston"))
        );
        assert_eq!(search_value(&json!(true)), Some(SearchValue::new("true")));
        assert_eq!(search_value(&json!({})), None);
    }

    #[test]
    fn test_bundle_resources_filters_type() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                { "resource": { "resourceType": "Observation", "id": "1" } },
                { "resource": { "resourceType": "OperationOutcome" } },
                { "resource": { "resourceType": "Observation", "id": "2" } }
            ]
        });

        assert_eq!(bundle_resources(&bundle, Some("Observation")).len(), 2);
        assert_eq!(bundle_resources(&bundle, None).len(), 3);
        assert!(bundle_resources(&json!({"resourceType": "Bundle"}), None).is_empty());
    }

    #[test]
    fn test_next_link() {
        let bundle = json!({
            "resourceType": "Bundle",
            "link": [
                { "relation": "self", "url": "http://x/Observation?patient=85" },
                { "relation": "next", "url": "http://x/Observation?page=2" }
            ]
        });
        assert_eq!(next_link(&bundle), Some("http://x/Observation?page=2"));
        assert_eq!(next_link(&json!({})), None);
    }

    #[test]
    fn test_outcome_messages() {
        let oo = json!({
            "resourceType": "OperationOutcome",
            "issue": [
                { "severity": "error", "code": "required", "diagnostics": "status is required" },
                { "severity": "error", "code": "invalid", "details": { "text": "bad code" } }
            ]
        });
        assert_eq!(outcome_messages(&oo), vec!["status is required", "bad code"]);
    }

    #[test]
    fn test_label() {
        assert_eq!(label(&observation()), "Observation/obs-1");
        assert_eq!(label(&json!({})), "Resource/?");
    }
}
