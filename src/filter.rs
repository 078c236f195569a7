// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Name filtering for the traversal driver: an optional regex pattern
//! plus the show-hidden toggle, replacing `xfsr-ls.c`'s `regexec`/
//! `name[0]=='.'` checks.

use regex::{Regex, RegexBuilder};

use crate::error::Result;

/// Decides whether a directory entry name should be emitted.
pub struct Filter {
    pattern: Option<Regex>,
    show_hidden: bool,
}

impl Filter {
    /// Compiles `pattern` (if given) with the requested case sensitivity.
    pub fn new(pattern: Option<&str>, case_insensitive: bool, show_hidden: bool) -> Result<Filter> {
        let pattern = pattern
            .map(|p| RegexBuilder::new(p).case_insensitive(case_insensitive).build())
            .transpose()
            .map_err(|_| crate::error::Error::Unsupported("invalid filter pattern"))?;
        Ok(Filter { pattern, show_hidden })
    }

    /// An always-match filter with no pattern and hidden files shown.
    pub fn accept_all() -> Filter {
        Filter { pattern: None, show_hidden: true }
    }

    /// True iff `name` should be emitted under this filter's rules.
    pub fn matches(&self, name: &str) -> bool {
        if !self.show_hidden && name.starts_with('.') {
            return false;
        }
        match &self.pattern {
            Some(re) => re.is_match(name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_files_excluded_unless_shown() {
        let hide = Filter::new(None, false, false).unwrap();
        assert!(!hide.matches(".hidden"));
        assert!(hide.matches("visible"));

        let show = Filter::new(None, false, true).unwrap();
        assert!(show.matches(".hidden"));
    }

    #[test]
    fn pattern_restricts_matches() {
        let f = Filter::new(Some(r"^data_\d+$"), false, true).unwrap();
        assert!(f.matches("data_42"));
        assert!(!f.matches("notes.txt"));
    }

    #[test]
    fn case_insensitive_pattern() {
        let f = Filter::new(Some("readme"), true, true).unwrap();
        assert!(f.matches("README.md"));
    }
}
