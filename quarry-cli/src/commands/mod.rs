pub mod cache;
pub mod import_openapi;
pub mod inspect;
pub mod query;

pub use cache::run_cache_clear;
pub use import_openapi::run_import_openapi;
pub use inspect::run_inspect;
pub use query::run_query;

/// Split a comma-separated category list
pub fn split_categories(raw: &str) -> Vec<String> {
    quarry::api::parse_categories(raw)
}
