//! Assembly of the generated CMake script.
//!
//! Text is appended to numbered sections; the script is the concatenation of
//! all sections in ascending order, each in insertion order.

use std::collections::BTreeMap;

/// Section holding directives that must precede all rule bodies.
pub const FRONT_MATTER_SECTION: i32 = 0;

/// Section for rule bodies.
pub const DEFAULT_SECTION: i32 = 50;

#[derive(Debug, Default)]
pub struct CMakeBuilder {
    sections: BTreeMap<i32, String>,
}

impl CMakeBuilder {
    pub fn new() -> Self {
        CMakeBuilder::default()
    }

    /// Append text to `section`.
    pub fn addtext(&mut self, text: impl AsRef<str>, section: i32) {
        self.sections
            .entry(section)
            .or_default()
            .push_str(text.as_ref());
    }

    pub fn as_text(&self) -> String {
        self.sections.values().map(String::as_str).collect()
    }
}
