//! Lazily-compiled static regex patterns.
//!
//! Regex literals go through [`static_regex!`] so an invalid pattern produces
//! a descriptive panic (with the pattern text) instead of a bare `.unwrap()`.

/// Declare a module-private function returning `&'static regex::Regex`,
/// backed by a `std::sync::OnceLock`. Compiled on first access, cached
/// forever. The calling module must have `use regex::Regex;` in scope.
macro_rules! static_regex {
    (fn $fname:ident, $pattern:expr) => {
        fn $fname() -> &'static Regex {
            static STORE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
            STORE.get_or_init(|| {
                Regex::new($pattern).expect(concat!("BUG: invalid static regex: ", $pattern))
            })
        }
    };
}
pub(crate) use static_regex;
