//! Static asset constants (CSS and JavaScript).

/// Stylesheet for the web interface.
pub const CSS: &str = include_str!("styles.css");

/// Alert handling for `?error=` / `?success=` redirects.
pub const JS: &str = include_str!("scripts.js");
