//! Listing pagination.

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a, T> {
    /// 1-based page number.
    pub index: usize,
    /// Number of pages in the listing.
    pub total: usize,
    pub items: &'a [T],
}

impl<T> Page<'_, T> {
    pub fn prev(&self) -> Option<usize> {
        (self.index > 1).then(|| self.index - 1)
    }

    pub fn next(&self) -> Option<usize> {
        (self.index < self.total).then(|| self.index + 1)
    }
}

/// Split `items` into contiguous pages of `per_page` items.
///
/// The last page may be shorter. `per_page == 0` yields a single page
/// holding everything, and an empty input yields one empty page, so every
/// listing has at least its first page.
pub fn paginate<T>(items: &[T], per_page: usize) -> Vec<Page<'_, T>> {
    if per_page == 0 || items.is_empty() {
        return vec![Page {
            index: 1,
            total: 1,
            items,
        }];
    }
    let total = items.len().div_ceil(per_page);
    items
        .chunks(per_page)
        .enumerate()
        .map(|(i, chunk)| Page {
            index: i + 1,
            total,
            items: chunk,
        })
        .collect()
}
