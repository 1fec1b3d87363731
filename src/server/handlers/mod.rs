//! HTTP request handlers for the web server.

mod convert;
mod pages;
mod static_files;

pub use convert::{api_convert, convert_form};
pub use pages::{api_conversions, download, index, not_found, preview};
pub use static_files::{serve_css, serve_js};
