//! Building the outgoing HTTP request for an API source

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

use crate::credentials::CredentialProvider;
use crate::query::display_string;
use crate::source::{ApiKeyLocation, ApiSource, AuthType, HttpMethod, ParamLocation};
use crate::{Error, Result};

const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
const DEFAULT_API_KEY_PARAM: &str = "api_key";

fn path_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[^{}/]+\}").expect("path token pattern is valid"))
}

/// A fully resolved request, ready to send
#[derive(Clone)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
    }
}

// Header values may carry decrypted secrets
impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("PreparedRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &header_names)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Resolve declared parameters, placement and auth into a request.
pub fn prepare_request(
    api: &ApiSource,
    params: &Map<String, Value>,
    credentials: &dyn CredentialProvider,
) -> Result<PreparedRequest> {
    let mut endpoint = api.endpoint.clone();
    let mut query: Vec<(String, Value)> = Vec::new();
    let mut param_headers: Vec<(String, String)> = Vec::new();
    let mut body = Map::new();

    for def in &api.parameters {
        let value = params
            .get(&def.name)
            .filter(|v| !v.is_null())
            .or(def.default.as_ref())
            .cloned();
        let Some(value) = value else {
            if def.required {
                return Err(Error::InvalidRequest(format!(
                    "Missing required parameter: {}",
                    def.name
                )));
            }
            continue;
        };

        match def.location {
            ParamLocation::Path => {
                let token = format!("{{{}}}", def.name);
                let segment = encode_path_segment(&scalar_string(&value))?;
                endpoint = endpoint.replace(&token, &segment);
            }
            ParamLocation::Query => query.push((def.name.clone(), value)),
            ParamLocation::Header => param_headers.push((def.name.clone(), scalar_string(&value))),
            ParamLocation::Body => {
                body.insert(def.name.clone(), value);
            }
        }
    }

    for (name, value) in params {
        if value.is_null() || api.parameters.iter().any(|d| &d.name == name) {
            continue;
        }
        match api.method {
            HttpMethod::Get => query.push((name.clone(), value.clone())),
            HttpMethod::Post => {
                body.insert(name.clone(), value.clone());
            }
        }
    }

    if let Some(token) = path_token_pattern().find(&endpoint) {
        return Err(Error::InvalidRequest(format!(
            "Unresolved path parameter {} in endpoint",
            token.as_str()
        )));
    }

    let mut url = Url::parse(&endpoint)
        .map_err(|e| Error::InvalidRequest(format!("Invalid endpoint URL: {}", e)))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &query {
            match value {
                Value::Array(items) => {
                    for item in items {
                        pairs.append_pair(name, &scalar_string(item));
                    }
                }
                other => {
                    pairs.append_pair(name, &scalar_string(other));
                }
            }
        }
    }

    let mut request = PreparedRequest {
        method: api.method,
        url,
        headers: Vec::new(),
        body: None,
    };
    for (name, value) in &api.headers {
        request.set_header(name, value.clone());
    }
    for (name, value) in param_headers {
        request.set_header(&name, value);
    }
    if api.method == HttpMethod::Post && !body.is_empty() {
        request.set_header("Content-Type", "application/json".to_string());
        request.body = Some(Value::Object(body));
    }

    apply_auth(&mut request, api, credentials)?;
    Ok(request)
}

fn apply_auth(
    request: &mut PreparedRequest,
    api: &ApiSource,
    credentials: &dyn CredentialProvider,
) -> Result<()> {
    let auth = &api.auth;
    let secret = |value: &Option<String>, what: &str| -> Result<String> {
        let stored = value.as_deref().ok_or_else(|| {
            Error::Credentials(format!("{:?} auth requires a {}", auth.auth_type, what))
        })?;
        credentials.decrypt(stored)
    };

    match auth.auth_type {
        AuthType::None => {}
        AuthType::Bearer => {
            let token = secret(&auth.credentials.token, "token")?;
            request.set_header("Authorization", format!("Bearer {}", token));
        }
        AuthType::Basic => {
            let username = secret(&auth.credentials.username, "username")?;
            let password = secret(&auth.credentials.password, "password")?;
            let encoded = STANDARD.encode(format!("{}:{}", username, password));
            request.set_header("Authorization", format!("Basic {}", encoded));
        }
        AuthType::ApiKey => {
            let key = secret(&auth.credentials.api_key, "api key")?;
            match auth.api_key_location {
                ApiKeyLocation::Header => {
                    let name = auth.api_key_header.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER);
                    request.set_header(name, key);
                }
                ApiKeyLocation::Query => {
                    let name = auth.api_key_header.as_deref().unwrap_or(DEFAULT_API_KEY_PARAM);
                    request.url.query_pairs_mut().append_pair(name, &key);
                }
            }
        }
    }
    Ok(())
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => display_string(other),
    }
}

/// Percent-encode a value as a single URL path segment.
fn encode_path_segment(raw: &str) -> Result<String> {
    let mut scratch = Url::parse("http://segment/")
        .map_err(|e| Error::Request(format!("Path encoder base: {}", e)))?;
    scratch
        .path_segments_mut()
        .map_err(|_| Error::Request("Path encoder base cannot hold segments".to_string()))?
        .pop_if_empty()
        .push(raw);
    Ok(scratch.path().trim_start_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{AesGcmCredentials, PlaintextCredentials};
    use crate::source::{AuthDescriptor, ParameterDef};
    use serde_json::json;

    fn bag(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_query_arrays_repeated() {
        let mut api = ApiSource::new("https://api.test/claims");
        api.parameters.push(ParameterDef::new("status", ParamLocation::Query));

        let req = prepare_request(&api, &bag(json!({"status": ["open", "new"]})), &PlaintextCredentials)
            .unwrap();
        assert_eq!(req.url.as_str(), "https://api.test/claims?status=open&status=new");
    }

    #[test]
    fn test_path_substitution_encoded() {
        let mut api = ApiSource::new("https://api.test/users/{id}/claims");
        api.parameters.push(ParameterDef::new("id", ParamLocation::Path));

        let req = prepare_request(&api, &bag(json!({"id": "a b/c"})), &PlaintextCredentials).unwrap();
        assert_eq!(req.url.path(), "/users/a%20b%2Fc/claims");
    }

    #[test]
    fn test_path_segment_reserved_characters() {
        assert_eq!(encode_path_segment("50%?x#y").unwrap(), "50%25%3Fx%23y");
        assert_eq!(encode_path_segment("{id}").unwrap(), "%7Bid%7D");
        assert_eq!(encode_path_segment("héllo").unwrap(), "h%C3%A9llo");
    }

    #[test]
    fn test_unresolved_path_token_rejected() {
        let api = ApiSource::new("https://api.test/users/{id}");
        let err = prepare_request(&api, &Map::new(), &PlaintextCredentials).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_required_and_default() {
        let mut api = ApiSource::new("https://api.test/x");
        let mut required = ParameterDef::new("year", ParamLocation::Query);
        required.required = true;
        api.parameters.push(required.clone());

        let err = prepare_request(&api, &Map::new(), &PlaintextCredentials).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        api.parameters[0].default = Some(json!(2024));
        let req = prepare_request(&api, &Map::new(), &PlaintextCredentials).unwrap();
        assert_eq!(req.url.query(), Some("year=2024"));
    }

    #[test]
    fn test_post_body_and_undeclared() {
        let mut api = ApiSource::new("https://api.test/search");
        api.method = HttpMethod::Post;
        api.parameters.push(ParameterDef::new("q", ParamLocation::Body));
        api.parameters.push(ParameterDef::new("page", ParamLocation::Query));

        let req = prepare_request(
            &api,
            &bag(json!({"q": "leave", "page": 2, "extra": true})),
            &PlaintextCredentials,
        )
        .unwrap();
        assert_eq!(req.url.query(), Some("page=2"));
        assert_eq!(req.body, Some(json!({"q": "leave", "extra": true})));
        assert_eq!(req.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_bearer_decrypts_and_overrides_static() {
        let (creds, _) = AesGcmCredentials::generate("k");
        let mut api = ApiSource::new("https://api.test/x");
        api.headers.insert("Authorization".into(), "static".into());
        api.headers.insert("Accept".into(), "application/json".into());
        api.auth = AuthDescriptor {
            auth_type: AuthType::Bearer,
            ..Default::default()
        };
        api.auth.credentials.token = Some(creds.encrypt("tok-123").unwrap());

        let req = prepare_request(&api, &Map::new(), &creds).unwrap();
        assert_eq!(req.header("authorization"), Some("Bearer tok-123"));
        assert_eq!(req.header("accept"), Some("application/json"));
        assert!(!format!("{:?}", req).contains("tok-123"));
    }

    #[test]
    fn test_basic_auth() {
        let mut api = ApiSource::new("https://api.test/x");
        api.auth.auth_type = AuthType::Basic;
        api.auth.credentials.username = Some("user".into());
        api.auth.credentials.password = Some("pass".into());

        let req = prepare_request(&api, &Map::new(), &PlaintextCredentials).unwrap();
        assert_eq!(req.header("Authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn test_api_key_header_and_query() {
        let mut api = ApiSource::new("https://api.test/x");
        api.auth.auth_type = AuthType::ApiKey;
        api.auth.credentials.api_key = Some("k1".into());

        let req = prepare_request(&api, &Map::new(), &PlaintextCredentials).unwrap();
        assert_eq!(req.header("X-API-Key"), Some("k1"));

        api.auth.api_key_location = ApiKeyLocation::Query;
        let req = prepare_request(&api, &Map::new(), &PlaintextCredentials).unwrap();
        assert_eq!(req.url.query(), Some("api_key=k1"));
    }

    #[test]
    fn test_missing_secret_is_credentials_error() {
        let mut api = ApiSource::new("https://api.test/x");
        api.auth.auth_type = AuthType::Bearer;
        let err = prepare_request(&api, &Map::new(), &PlaintextCredentials).unwrap_err();
        assert!(matches!(err, Error::Credentials(_)));
    }
}
