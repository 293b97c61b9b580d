//! Page range selection: `"1-3,5"` → `[1, 2, 3, 5]`.
//!
//! The grammar is comma-separated terms, each either a single page number
//! or an inclusive `start-end` range. Parsing is lenient: a term that does
//! not parse is skipped and out-of-bounds members are dropped one by one,
//! so a partially valid specification still selects what it can. An empty
//! result is the caller's signal to reject the request.

use std::collections::BTreeSet;

/// Parse a page specification into sorted, deduplicated 1-based page numbers
/// within `[1, max]`.
///
/// ```rust
/// use tfda_review::pages::parse_page_range;
///
/// assert_eq!(parse_page_range("1-3,5,2", 5), vec![1, 2, 3, 5]);
/// assert_eq!(parse_page_range("2-4", 3), vec![2, 3]);
/// assert!(parse_page_range("abc", 5).is_empty());
/// ```
pub fn parse_page_range(spec: &str, max: usize) -> Vec<usize> {
    let mut pages = BTreeSet::new();
    let max = max as i64;

    for term in spec.split(',') {
        match term.split_once('-') {
            Some((start, end)) => {
                let (Ok(start), Ok(end)) = (start.trim().parse::<i64>(), end.trim().parse::<i64>())
                else {
                    continue;
                };
                // Only the members in [1, max] survive; iterate just that window.
                for page in start.max(1)..=end.min(max) {
                    pages.insert(page as usize);
                }
            }
            None => {
                if let Ok(page) = term.trim().parse::<i64>() {
                    if (1..=max).contains(&page) {
                        pages.insert(page as usize);
                    }
                }
            }
        }
    }

    pages.into_iter().collect()
}

/// Initial range offered after a document is loaded: the first `window`
/// pages, e.g. `"1-5"`.
pub fn default_range(page_count: usize, window: usize) -> String {
    match page_count {
        0 => String::new(),
        1 => "1".to_string(),
        n => format!("1-{}", n.min(window.max(1))),
    }
}
