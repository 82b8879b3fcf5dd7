//! Site tree: pages as nodes, URL path nesting as edges.
//!
//! The [`SiteTree`] is the structural backbone of the simulation. It is
//! built once from a flat list of URL paths, then shared read-only between
//! workers, which use it to pick entry pages and next pages for visitors.
//!
//! Pages live in a flat arena indexed by [`PageId`]. Parent links are plain
//! indices, so the back-reference is a lookup relation rather than an owning
//! pointer. Pages are only ever appended, which means a child's index is
//! always greater than its parent's: every descent strictly increases the
//! index and therefore terminates.

use rand::Rng;

/// Path of the root page.
pub const ROOT_PATH: &str = "/";

/// Index of a page within a [`SiteTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(usize);

impl PageId {
    /// The root page of every tree.
    pub const ROOT: Self = Self(0);

    /// Return the arena index of this page.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for PageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// A single page of the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Canonical URL path (e.g. `/blog/2024/hello`).
    path: String,
    /// Owning page, `None` for the root.
    parent: Option<PageId>,
    /// Child pages in insertion order.
    children: Vec<PageId>,
}

impl Page {
    fn new(path: String, parent: Option<PageId>) -> Self {
        Self {
            path,
            parent,
            children: Vec::new(),
        }
    }

    /// The page's URL path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The page's parent, or `None` for the root.
    pub const fn parent(&self) -> Option<PageId> {
        self.parent
    }

    /// The page's children in insertion order.
    pub fn children(&self) -> &[PageId] {
        &self.children
    }

    /// Whether the page has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The page tree of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteTree {
    /// All pages; index 0 is the root.
    pages: Vec<Page>,
}

impl Default for SiteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteTree {
    /// Create a tree containing only the root page.
    pub fn new() -> Self {
        Self {
            pages: vec![Page::new(ROOT_PATH.to_owned(), None)],
        }
    }

    /// Build a tree from a list of URL paths.
    ///
    /// Each path is split into `/`-delimited segments and inserted as a
    /// chain under the root. Intermediate pages are created for every
    /// prefix, so `/a/b/c` yields `/a`, `/a/b` and `/a/b/c`. Prefixes that
    /// already exist are reused.
    pub fn build_from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for path in paths {
            tree.insert_path(path.as_ref());
        }
        tree
    }

    /// Insert a single path, returning the page it resolves to.
    ///
    /// Empty segments are ignored, so `/a//b/` is the same page as `/a/b`.
    /// A path with no segments resolves to the root.
    pub fn insert_path(&mut self, path: &str) -> PageId {
        let mut current = PageId::ROOT;
        let mut prefix = String::with_capacity(path.len());

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);

            current = match self.child_with_path(current, &prefix) {
                Some(existing) => existing,
                None => self.append_child(current, prefix.clone()),
            };
        }

        current
    }

    fn child_with_path(&self, parent: PageId, path: &str) -> Option<PageId> {
        self.page(parent)?
            .children
            .iter()
            .copied()
            .find(|&child| self.path(child) == Some(path))
    }

    fn append_child(&mut self, parent: PageId, path: String) -> PageId {
        let id = PageId(self.pages.len());
        self.pages.push(Page::new(path, Some(parent)));
        if let Some(parent_page) = self.pages.get_mut(parent.0) {
            parent_page.children.push(id);
        }
        id
    }

    /// The root page.
    pub const fn root(&self) -> PageId {
        PageId::ROOT
    }

    /// Look up a page by ID.
    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.get(id.0)
    }

    /// Look up a page's URL path by ID.
    pub fn path(&self, id: PageId) -> Option<&str> {
        self.page(id).map(Page::path)
    }

    /// Find the first page with the given path.
    pub fn find(&self, path: &str) -> Option<PageId> {
        self.pages
            .iter()
            .position(|page| page.path == path)
            .map(PageId)
    }

    /// Number of pages, including the root.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Always `false`: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// IDs of every page without children.
    pub fn leaves(&self) -> impl Iterator<Item = PageId> + '_ {
        self.pages
            .iter()
            .enumerate()
            .filter(|(_, page)| page.is_leaf())
            .map(|(idx, _)| PageId(idx))
    }

    /// Number of pages without children.
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    // -------------------------------------------------------------------
    // Randomized traversal
    // -------------------------------------------------------------------

    /// A uniformly random direct child of `id`, or `id` itself if it has no
    /// children.
    pub fn random_child<R: Rng + ?Sized>(&self, id: PageId, rng: &mut R) -> PageId {
        let Some(page) = self.page(id) else {
            return id;
        };
        if page.children.is_empty() {
            return id;
        }
        let idx = rng.random_range(0..page.children.len());
        page.children.get(idx).copied().unwrap_or(id)
    }

    /// Descend through uniformly random children from `start` until a page
    /// with no children is reached. Returns `start` if it is already a leaf.
    pub fn random_leaf<R: Rng + ?Sized>(&self, start: PageId, rng: &mut R) -> PageId {
        let mut current = start;
        loop {
            let next = self.random_child(current, rng);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// The page a visitor on `id` navigates to next: a random child when
    /// there are children, otherwise the parent. `None` only for a childless
    /// root.
    pub fn random_next<R: Rng + ?Sized>(&self, id: PageId, rng: &mut R) -> Option<PageId> {
        let page = self.page(id)?;
        if page.is_leaf() {
            page.parent
        } else {
            Some(self.random_child(id, rng))
        }
    }
}
