//! View configuration: tunables (spec.md §6), registered name, and the
//! caller-supplied schema/config version used to trigger repopulation.

/// Soft per-page capacity target (spec.md's `MAX`).
pub const DEFAULT_PAGE_MAX: usize = 50;

/// Configuration for one registered ordered view.
#[derive(Clone, Debug)]
pub struct Config {
    /// The view's registered name; backing tables are named
    /// `map_<name>` / `page_<name>`.
    pub name: String,
    /// Soft per-page capacity target. Pages may transiently exceed this
    /// during a transaction up to `hard_trigger`.
    pub page_max: usize,
    /// In-transaction page size that forces an immediate split.
    pub hard_trigger: usize,
    /// Target size used by the inline `splitOversizedPage` triggered during
    /// insert once a page crosses `hard_trigger` (spec.md §4.H), distinct
    /// from the pre-commit Compactor pass, which always targets `page_max`.
    pub inline_split_target: usize,
    /// Bounded LRU capacity for the page cache.
    pub page_cache_capacity: usize,
    /// Bounded LRU capacity for the rowid→pageId cache.
    pub map_cache_capacity: usize,
    /// User-supplied config version (spec.md §6). A mismatch against the
    /// persisted `version` registry key triggers a full repopulation.
    pub version: i64,
}

impl Config {
    /// Builds a config for `name` with spec.md's default tunables
    /// (`MAX = 50`, hard trigger `32·MAX`, split target `16·MAX`).
    pub fn new(name: impl Into<String>, version: i64) -> Self {
        let page_max = DEFAULT_PAGE_MAX;
        Self {
            name: name.into(),
            page_max,
            hard_trigger: 32 * page_max,
            inline_split_target: 16 * page_max,
            page_cache_capacity: 256,
            map_cache_capacity: 4096,
            version,
        }
    }

    /// Table name for the rowid→pageId map.
    pub fn map_table(&self) -> String {
        format!("map_{}", self.name)
    }

    /// Table name for the page/metadata table.
    pub fn page_table(&self) -> String {
        format!("page_{}", self.name)
    }

    /// Table name for the shared registry side-table entry for this view.
    pub fn registry_table(&self) -> String {
        format!("registry_{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tunables_match_spec() {
        let cfg = Config::new("contacts", 1);
        assert_eq!(cfg.page_max, 50);
        assert_eq!(cfg.hard_trigger, 1600);
        assert_eq!(cfg.inline_split_target, 800);
        assert_eq!(cfg.map_table(), "map_contacts");
        assert_eq!(cfg.page_table(), "page_contacts");
    }
}
