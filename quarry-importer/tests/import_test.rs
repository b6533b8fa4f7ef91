use quarry::source::{
    ApiKeyLocation, AuthType, ConfigMethod, FieldType, HttpMethod, ParamLocation, ParamType,
    SourceKind, SourceStatus,
};
use quarry_importer::{import_str, list_operations, parse_document, parse_operation, ImportError};
use serde_json::{json, Value};

fn claims_api() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {"title": "Claims API", "description": "Insurance claims"},
        "servers": [{"url": "https://api.example.com/v1/"}],
        "components": {
            "schemas": {
                "Claim": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer"},
                        "amount": {"type": "number"},
                        "filed_at": {"type": "string", "format": "date-time"},
                        "department": {"type": "string"}
                    }
                },
                "ClaimList": {
                    "type": "object",
                    "properties": {
                        "data": {"type": "array", "items": {"$ref": "#/components/schemas/Claim"}},
                        "total": {"type": "integer"}
                    }
                },
                "NewClaim": {
                    "type": "object",
                    "required": ["amount"],
                    "properties": {
                        "amount": {"type": "number"},
                        "note": {"type": "string"}
                    }
                }
            },
            "securitySchemes": {"token": {"type": "http", "scheme": "bearer"}}
        },
        "security": [{"token": []}],
        "paths": {
            "/claims": {
                "get": {
                    "summary": "List claims",
                    "parameters": [
                        {"name": "status", "in": "query",
                         "schema": {"type": "string", "enum": ["open", "closed"]}},
                        {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 20}},
                        {"name": "X-Tenant", "in": "header", "required": true, "schema": {"type": "string"}},
                        {"name": "session", "in": "cookie", "schema": {"type": "string"}}
                    ],
                    "responses": {"200": {
                        "description": "ok",
                        "content": {"application/json": {
                            "schema": {"$ref": "#/components/schemas/ClaimList"}
                        }}
                    }}
                },
                "post": {
                    "summary": "Search claims",
                    "requestBody": {"content": {"application/json": {
                        "schema": {"$ref": "#/components/schemas/NewClaim"}
                    }}},
                    "responses": {"201": {
                        "description": "created",
                        "content": {"application/json": {
                            "schema": {"type": "array", "items": {"$ref": "#/components/schemas/Claim"}}
                        }}
                    }}
                }
            },
            "/claims/{id}": {
                "get": {
                    "summary": "One claim",
                    "parameters": [{"name": "id", "in": "path", "schema": {"type": "integer"}}],
                    "responses": {"200": {"description": "ok"}}
                }
            }
        }
    })
}

const PET_STORE: &str = r##"
swagger: "2.0"
info:
  title: Pet Store
host: pets.test
basePath: /api
schemes: [http]
securityDefinitions:
  key:
    type: apiKey
    in: header
    name: X-Api-Key
paths:
  /pets:
    get:
      summary: List pets
      parameters:
        - name: species
          in: query
          type: string
          enum: [cat, dog]
      responses:
        "200":
          description: ok
          schema:
            type: object
            properties:
              results:
                type: array
                items:
                  $ref: "#/definitions/Pet"
              count:
                type: integer
definitions:
  Pet:
    type: object
    properties:
      name:
        type: string
      born:
        type: string
        format: date
"##;

#[test]
fn test_openapi3_selected_operation() {
    let endpoint = parse_document(&claims_api()).unwrap();
    assert_eq!(endpoint.title, "Claims API");
    assert_eq!(endpoint.operation.path, "/claims");
    assert_eq!(endpoint.operation.method, HttpMethod::Get);

    let api = &endpoint.api;
    assert_eq!(api.endpoint, "https://api.example.com/v1/claims");
    assert_eq!(api.method, HttpMethod::Get);
    assert_eq!(api.config_method, ConfigMethod::Openapi);
    assert!(api.openapi_spec.is_some());

    let names: Vec<&str> = api.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["status", "limit", "X-Tenant"]);
    assert_eq!(api.parameters[1].param_type, ParamType::Integer);
    assert_eq!(api.parameters[1].default, Some(json!(20)));
    assert_eq!(api.parameters[2].location, ParamLocation::Header);
    assert!(api.parameters[2].required);
    assert!(endpoint
        .warnings
        .iter()
        .any(|w| w == "Dropped cookie parameter 'session'"));

    let structure = &api.response_structure;
    assert_eq!(structure.data_path, "$.data");
    assert!(structure.is_array);
    assert_eq!(structure.total_path.as_deref(), Some("$.total"));
    let fields: Vec<(&str, FieldType)> = structure
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.field_type))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("id", FieldType::Integer),
            ("amount", FieldType::Number),
            ("filed_at", FieldType::Date),
            ("department", FieldType::String),
        ]
    );

    assert_eq!(api.auth.auth_type, AuthType::Bearer);
    assert!(api.auth.credentials.token.is_none());
}

#[test]
fn test_into_source_is_untested_api_source() {
    let endpoint = parse_document(&claims_api()).unwrap();
    let source = endpoint.into_source("claims", vec!["it".to_string()]);
    assert_eq!(source.name, "claims");
    assert_eq!(source.description, "List claims");
    assert_eq!(source.status, SourceStatus::Untested);
    assert!(source.is_queryable_by(&["it".to_string()]));
    assert!(matches!(source.kind, SourceKind::Api(_)));
}

#[test]
fn test_parse_chosen_post_operation() {
    let endpoint = parse_operation(&claims_api(), "/claims", "POST").unwrap();
    let api = &endpoint.api;
    assert_eq!(api.method, HttpMethod::Post);
    assert!(api.parameters.iter().all(|p| p.location == ParamLocation::Body));
    let amount = api.parameters.iter().find(|p| p.name == "amount").unwrap();
    assert!(amount.required);
    assert_eq!(api.response_structure.data_path, "$");
    assert!(api.response_structure.is_array);
}

#[test]
fn test_parse_operation_errors() {
    let doc = claims_api();
    assert!(matches!(
        parse_operation(&doc, "/claims", "delete"),
        Err(ImportError::UnsupportedMethod(_))
    ));
    assert!(matches!(
        parse_operation(&doc, "/nope", "get"),
        Err(ImportError::OperationNotFound { .. })
    ));
}

#[test]
fn test_path_parameter_always_required() {
    let endpoint = parse_operation(&claims_api(), "/claims/{id}", "get").unwrap();
    let id = &endpoint.api.parameters[0];
    assert_eq!(id.location, ParamLocation::Path);
    assert!(id.required);
    assert!(endpoint
        .warnings
        .iter()
        .any(|w| w == "Success response has no JSON schema"));
}

#[test]
fn test_list_operations() {
    let ops = list_operations(&claims_api());
    let listed: Vec<(String, HttpMethod)> = ops.into_iter().map(|o| (o.path, o.method)).collect();
    assert_eq!(
        listed,
        vec![
            ("/claims".to_string(), HttpMethod::Get),
            ("/claims".to_string(), HttpMethod::Post),
            ("/claims/{id}".to_string(), HttpMethod::Get),
        ]
    );
}

#[test]
fn test_swagger_yaml_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.yaml");
    std::fs::write(&path, PET_STORE).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let endpoint = import_str(&text).unwrap();
    let api = &endpoint.api;
    assert_eq!(api.endpoint, "http://pets.test/api/pets");
    assert_eq!(api.parameters[0].name, "species");
    assert_eq!(
        api.parameters[0].allowed_values,
        Some(vec![json!("cat"), json!("dog")])
    );
    assert_eq!(api.response_structure.data_path, "$.results");
    assert_eq!(api.response_structure.total_path.as_deref(), Some("$.count"));
    assert_eq!(api.response_structure.fields[1].field_type, FieldType::Date);
    assert_eq!(api.auth.auth_type, AuthType::ApiKey);
    assert_eq!(api.auth.api_key_location, ApiKeyLocation::Header);
    assert_eq!(api.auth.api_key_header.as_deref(), Some("X-Api-Key"));
    assert!(endpoint
        .warnings
        .iter()
        .any(|w| w.starts_with("Missing API description")));
}

#[test]
fn test_invalid_document_reports_every_error() {
    let doc = json!({"openapi": "3.0.0", "info": {}, "paths": {}});
    match parse_document(&doc) {
        Err(ImportError::Invalid(report)) => {
            let paths: Vec<&str> = report.errors.iter().map(|e| e.path.as_str()).collect();
            assert_eq!(paths, vec!["/info/title", "/servers", "/paths"]);
            assert_eq!(report.warnings.len(), 1);
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_unparseable_text() {
    assert!(matches!(import_str("- just\n- a list"), Err(ImportError::Parse(_))));
}
