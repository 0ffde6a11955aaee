//! Ranked lists that show a fixed number of rows until expanded.

/// One row of a top-N listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedListItem {
    /// 1-based position in the list.
    pub rank: usize,
    pub label: String,
    pub sublabel: Option<String>,
    pub count: u64,
}

impl RankedListItem {
    pub fn count_text(&self) -> String {
        format!("{} plays", self.count)
    }
}

/// The toggle affordance under a truncated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    More,
    Less,
}

impl Toggle {
    pub fn label(self) -> &'static str {
        match self {
            Toggle::More => "More",
            Toggle::Less => "Less",
        }
    }
}

/// What a list looks like right now: the rows to draw and the toggle, if any.
#[derive(Debug, PartialEq)]
pub struct RenderedList<'a, T> {
    pub rows: &'a [T],
    pub toggle: Option<Toggle>,
}

/// A list that shows at most `limit` items while collapsed.
///
/// The expansion flag belongs to the presentation, not the data: replacing
/// the items always collapses the list again.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandableCollection<T> {
    items: Vec<T>,
    limit: usize,
    expanded: bool,
}

impl<T> ExpandableCollection<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::new(),
            limit,
            expanded: false,
        }
    }

    pub fn render(items: Vec<T>, limit: usize) -> Self {
        let mut list = Self::new(limit);
        list.replace(items);
        list
    }

    /// New data from a refresh.  Collapses the list.
    pub fn replace(&mut self, items: Vec<T>) {
        self.items = items;
        self.expanded = false;
    }

    /// Flip between the truncated and full views.  Lists that fit within
    /// the limit have no toggle and stay as they are.
    pub fn toggle(&mut self) -> bool {
        if self.items.len() > self.limit {
            self.expanded = !self.expanded;
        }
        self.expanded
    }

    pub fn visible(&self) -> &[T] {
        if self.expanded {
            &self.items
        } else {
            &self.items[..self.items.len().min(self.limit)]
        }
    }

    pub fn toggle_control(&self) -> Option<Toggle> {
        if self.items.len() <= self.limit {
            None
        } else if self.expanded {
            Some(Toggle::Less)
        } else {
            Some(Toggle::More)
        }
    }

    pub fn view(&self) -> RenderedList<'_, T> {
        RenderedList {
            rows: self.visible(),
            toggle: self.toggle_control(),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
