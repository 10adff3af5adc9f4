/// Whether a navigation to `url` should be observed at all. Browser-internal
/// pages and inline documents produce no network facts worth keeping.
pub fn should_monitor(url: &str, ignored_schemes: &[String]) -> bool {
    if url.is_empty() {
        return false;
    }
    !ignored_schemes
        .iter()
        .any(|scheme| url.starts_with(scheme.as_str()))
}
