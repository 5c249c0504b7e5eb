//! Ordered regex fallbacks
//!
//! A [`Patterns`] list holds alternative expressions for one value. They are
//! compiled on first use and tried in order; the first one that matches and
//! whose capture parses wins.

use regex::{Captures, Regex};
use std::str::FromStr;
use std::sync::OnceLock;

pub struct Patterns {
    sources: &'static [&'static str],
    compiled: OnceLock<Vec<Regex>>,
}

impl Patterns {
    pub const fn new(sources: &'static [&'static str]) -> Self {
        Self {
            sources,
            compiled: OnceLock::new(),
        }
    }

    fn compiled(&self) -> &[Regex] {
        self.compiled.get_or_init(|| {
            self.sources
                .iter()
                .filter_map(|source| Regex::new(source).ok())
                .collect()
        })
    }

    /// Captures of the first pattern that matches anywhere in `text`
    pub fn captures<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        self.compiled().iter().find_map(|re| re.captures(text))
    }

    /// First capture group of the first matching pattern
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.compiled()
            .iter()
            .find_map(|re| re.captures(text)?.get(1))
            .map(|m| m.as_str())
    }

    /// First capture group that parses as `T`, trying patterns in order
    pub fn parse<T: FromStr>(&self, text: &str) -> Option<T> {
        self.compiled().iter().find_map(|re| {
            re.captures(text)?
                .get(1)
                .and_then(|m| m.as_str().trim().parse().ok())
        })
    }

    /// Non-overlapping matches of every pattern
    pub fn count(&self, text: &str) -> usize {
        self.compiled()
            .iter()
            .map(|re| re.find_iter(text).count())
            .sum()
    }

    #[cfg(test)]
    pub fn all_compile(&self) -> bool {
        self.compiled().len() == self.sources.len()
    }
}
