//! Title filtering and pagination for the browser.

use std::ops::Range;

use regex::Regex;

use crate::catalog::Item;

/// A filter over item titles.
#[derive(Debug, Clone, Default)]
pub enum TitleFilter {
    /// Matches every title.
    #[default]
    All,
    /// Matches titles the regex finds a match in.
    Regex(Regex),
    /// Fallback for patterns that fail to compile: literal substring match
    /// ignoring case. Holds the lowercased needle.
    Substring(String),
}

impl TitleFilter {
    /// Builds a filter from user input.
    ///
    /// An empty pattern matches everything. Patterns that are not valid
    /// regular expressions are matched literally, ignoring case.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        if pattern.is_empty() {
            return Self::All;
        }
        match Regex::new(pattern) {
            Ok(re) => Self::Regex(re),
            Err(e) => {
                log::debug!("Pattern {pattern:?} is not a regex ({e}), using substring match");
                Self::Substring(pattern.to_lowercase())
            }
        }
    }

    /// Returns true if `title` passes the filter.
    #[must_use]
    pub fn matches(&self, title: &str) -> bool {
        match self {
            Self::All => true,
            Self::Regex(re) => re.is_match(title),
            Self::Substring(needle) => title.to_lowercase().contains(needle.as_str()),
        }
    }

    /// Returns true if this filter lets everything through.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Returns the items whose titles pass `filter`, in catalog order.
#[must_use]
pub fn filter_items<'a>(items: &'a [Item], filter: &TitleFilter) -> Vec<&'a Item> {
    items.iter().filter(|i| filter.matches(&i.title)).collect()
}

/// Index range of `page` (zero-based) when `len` items are split into pages
/// of `page_size`. Out-of-range pages yield an empty range at the end.
#[must_use]
pub fn paginate(len: usize, page: usize, page_size: usize) -> Range<usize> {
    let size = page_size.max(1);
    let start = page.saturating_mul(size).min(len);
    let end = start.saturating_add(size).min(len);
    start..end
}

/// Number of pages needed for `len` items; at least one.
#[must_use]
pub const fn page_count(len: usize, page_size: usize) -> usize {
    let size = if page_size == 0 { 1 } else { page_size };
    if len == 0 { 1 } else { len.div_ceil(size) }
}
