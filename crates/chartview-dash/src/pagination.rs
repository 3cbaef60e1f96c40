use serde::Serialize;
use std::ops::Range;

/// Charts shown per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 12;

/// The visible window of one page over `total_items` items.
///
/// `page_index` is always within `[0, max(0, page_count - 1)]`; construction clamps rather
/// than fails, and navigation saturates at either end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    page_index: usize,
    page_size: usize,
    total_items: usize,
}

impl PageWindow {
    pub fn new(total_items: usize, page_size: usize, page_index: usize) -> Self {
        let page_size = page_size.max(1);
        let last = last_index(total_items, page_size);
        Self {
            page_index: page_index.min(last),
            page_size,
            total_items,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// `ceil(total_items / page_size)`; zero when there is nothing to show.
    pub fn page_count(&self) -> usize {
        self.total_items.div_ceil(self.page_size)
    }

    pub fn is_first(&self) -> bool {
        self.page_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.page_index == last_index(self.total_items, self.page_size)
    }

    pub fn next(&self) -> Self {
        Self::new(self.total_items, self.page_size, self.page_index.saturating_add(1))
    }

    pub fn previous(&self) -> Self {
        Self::new(self.total_items, self.page_size, self.page_index.saturating_sub(1))
    }

    /// Item indices shown on this page.
    pub fn range(&self) -> Range<usize> {
        let start = (self.page_index * self.page_size).min(self.total_items);
        let end = (start + self.page_size).min(self.total_items);
        start..end
    }

    /// 1-based page indicator, e.g., `Page 6 of 6`.
    pub fn label(&self) -> String {
        format!("Page {} of {}", self.page_index + 1, self.page_count().max(1))
    }
}

fn last_index(total_items: usize, page_size: usize) -> usize {
    total_items.div_ceil(page_size).saturating_sub(1)
}

/// Window `items` at `page_index`, returning the clamped window and its visible slice.
pub fn window<T>(items: &[T], page_size: usize, page_index: usize) -> (PageWindow, &[T]) {
    let window = PageWindow::new(items.len(), page_size, page_index);
    let visible = &items[window.range()];
    (window, visible)
}
