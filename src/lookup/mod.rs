pub mod resolve;

pub use resolve::*;

/// Sanitize a string for safe terminal display by removing control characters.
///
/// Reply payloads come straight off the wire, so anything echoed back to the
/// terminal goes through here first.
pub(crate) fn sanitize_display(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control())
        .collect()
}
