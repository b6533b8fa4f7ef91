//! Security scheme to authentication descriptor
//!
//! Only one scheme is mapped. Credential values stay empty for an
//! administrator to fill in.

use quarry::source::{ApiKeyLocation, AuthDescriptor, AuthType};
use serde_json::{Map, Value};

use super::document::SpecVersion;

fn schemes(doc: &Value, version: SpecVersion) -> Option<&Map<String, Value>> {
    let pointer = match version {
        SpecVersion::OpenApi3 => "/components/securitySchemes",
        SpecVersion::Swagger2 => "/securityDefinitions",
    };
    doc.pointer(pointer)?.as_object()
}

/// Name of the scheme in force: the operation's requirement, then the
/// document's, then the first defined scheme.
fn chosen_scheme<'a>(doc: &'a Value, op: &'a Value, defined: &'a Map<String, Value>) -> Option<&'a str> {
    let required = op
        .get("security")
        .or_else(|| doc.get("security"))
        .and_then(Value::as_array)
        .and_then(|reqs| reqs.iter().find_map(|r| r.as_object()?.keys().next()));
    match required {
        Some(name) => Some(name.as_str()),
        None => defined.keys().next().map(String::as_str),
    }
}

pub fn map_security(
    doc: &Value,
    version: SpecVersion,
    op: &Value,
    warnings: &mut Vec<String>,
) -> AuthDescriptor {
    let Some(defined) = schemes(doc, version) else {
        return AuthDescriptor::default();
    };
    // An explicit empty requirement list opts the operation out
    if op.get("security").and_then(Value::as_array).is_some_and(|s| s.is_empty()) {
        return AuthDescriptor::default();
    }
    let Some(name) = chosen_scheme(doc, op, defined) else {
        return AuthDescriptor::default();
    };
    if defined.len() > 1 {
        warnings.push(format!("Several security schemes defined, using '{}'", name));
    }
    let Some(scheme) = defined.get(name) else {
        warnings.push(format!("Security scheme '{}' is not defined", name));
        return AuthDescriptor::default();
    };

    let kind = scheme.get("type").and_then(Value::as_str).unwrap_or("");
    let http_scheme = scheme
        .get("scheme")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase);

    let mut auth = AuthDescriptor::default();
    match (kind, http_scheme.as_deref()) {
        ("http", Some("bearer")) => auth.auth_type = AuthType::Bearer,
        ("http", Some("basic")) | ("basic", _) => auth.auth_type = AuthType::Basic,
        ("apiKey", _) => {
            let placement = scheme.get("in").and_then(Value::as_str).unwrap_or("header");
            let location = match placement {
                "header" => ApiKeyLocation::Header,
                "query" => ApiKeyLocation::Query,
                other => {
                    warnings.push(format!("API key in {} is not supported", other));
                    return auth;
                }
            };
            auth.auth_type = AuthType::ApiKey;
            auth.api_key_location = location;
            auth.api_key_header = scheme.get("name").and_then(Value::as_str).map(str::to_string);
        }
        ("oauth2", _) | ("openIdConnect", _) => {
            warnings.push(format!(
                "Security scheme '{}' ({}) imported as bearer token auth",
                name, kind
            ));
            auth.auth_type = AuthType::Bearer;
        }
        _ => warnings.push(format!("Unsupported security scheme '{}'", name)),
    }
    auth
}
