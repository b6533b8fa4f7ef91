pub mod server;

pub use server::{
    parse_categories, request_context, ApiServer, AppState, CATEGORY_HEADER, REQUEST_ID_HEADER,
};
