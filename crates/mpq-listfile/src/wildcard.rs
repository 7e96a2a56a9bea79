//! Wildcard masks for listfile enumeration
//!
//! Masks understand `*` (any run of characters, separators included) and `?`
//! (exactly one character). Matching ignores ASCII case and treats `/` and
//! `\` as the same separator. Every other character, brackets and braces
//! included, matches itself.

use crate::error::{ListfileError, ListfileResult};
use globset::{GlobBuilder, GlobMatcher};

/// A compiled, case-insensitive name mask
#[derive(Debug, Clone)]
pub struct WildcardMask {
    source: Option<String>,
    matcher: Option<GlobMatcher>,
}

impl WildcardMask {
    /// Compile a mask. `None`, `""` and `"*"` accept every name.
    pub fn new(mask: Option<&str>) -> ListfileResult<Self> {
        let source = mask.map(str::to_string);
        let matcher = match mask {
            None | Some("" | "*") => None,
            Some(pattern) => {
                let glob = GlobBuilder::new(&escape_mask(pattern))
                    .case_insensitive(true)
                    .literal_separator(false)
                    .backslash_escape(false)
                    .build()
                    .map_err(|e| ListfileError::InvalidMask {
                        mask: pattern.to_string(),
                        reason: e.to_string(),
                    })?;
                Some(glob.compile_matcher())
            }
        };

        Ok(Self { source, matcher })
    }

    /// Mask that accepts every name
    pub const fn any() -> Self {
        Self {
            source: None,
            matcher: None,
        }
    }

    /// The mask string this was compiled from
    pub fn as_str(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Check a name against the mask
    pub fn matches(&self, name: &str) -> bool {
        self.matcher
            .as_ref()
            .is_none_or(|m| m.is_match(name.replace('\\', "/")))
    }
}

/// Rewrite a mask so only `*` and `?` are special
fn escape_mask(mask: &str) -> String {
    let mut out = String::with_capacity(mask.len() + 8);
    for ch in mask.chars() {
        match ch {
            '\\' => out.push('/'),
            '[' | ']' | '{' | '}' => {
                out.push('[');
                out.push(ch);
                out.push(']');
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(pattern: &str) -> WildcardMask {
        WildcardMask::new(Some(pattern)).expect("Test operation should succeed")
    }

    #[test]
    fn test_match_all() {
        assert!(WildcardMask::any().matches("anything.bin"));
        assert!(mask("*").matches("Units\\Human\\Footman.mdx"));
        assert!(mask("").matches("x"));
    }

    #[test]
    fn test_extension_case_insensitive() {
        let m = mask("*.txt");
        assert!(m.matches("a.txt"));
        assert!(m.matches("c.TXT"));
        assert!(!m.matches("b.bin"));
    }

    #[test]
    fn test_star_crosses_separators() {
        let m = mask("Units\\*.mdx");
        assert!(m.matches("Units\\Human\\Footman.mdx"));
        assert!(m.matches("units/orc/grunt.MDX"));
        assert!(!m.matches("Doodads\\Tree.mdx"));
    }

    #[test]
    fn test_question_mark() {
        let m = mask("file?.dat");
        assert!(m.matches("file1.dat"));
        assert!(!m.matches("file12.dat"));
    }

    #[test]
    fn test_brackets_are_literal() {
        let m = mask("(listfile)*");
        assert!(m.matches("(listfile)"));
        let m = mask("[x]*");
        assert!(m.matches("[x]name"));
        assert!(!m.matches("xname"));
    }
}
