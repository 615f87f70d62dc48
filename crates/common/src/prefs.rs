//! Typed user preferences stored in the profile's [`KvStore`].

use std::sync::Arc;

use {
    serde::{Deserialize, Serialize},
    tracing::warn,
};

use crate::{
    keys,
    storage::{KvStore, StorageError},
};

pub const PAGE_SIZES: [usize; 4] = [10, 25, 50, 100];
pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    Auto,
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Auto => "auto",
        }
    }
}

/// Which incidents the incidents table shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    /// Everything except closed incidents.
    #[default]
    Open,
    /// Open incidents that are not on hold.
    Active,
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentsFilter {
    #[serde(default)]
    pub state: StateFilter,
    /// Only show incidents modified within this many days.
    #[serde(default)]
    pub days_back: Option<u32>,
    /// Only show incidents of these types; empty means all.
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KvStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn page_size(&self) -> usize {
        self.store
            .get(keys::TABLE_PAGE_SIZE)
            .ok()
            .flatten()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| PAGE_SIZES.contains(n))
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Store a page size, snapping unknown values to the default.
    pub fn set_page_size(&self, size: usize) -> Result<usize, StorageError> {
        let size = if PAGE_SIZES.contains(&size) {
            size
        } else {
            DEFAULT_PAGE_SIZE
        };
        self.store.set(keys::TABLE_PAGE_SIZE, &size.to_string())?;
        Ok(size)
    }

    pub fn incidents_filter(&self) -> IncidentsFilter {
        let Some(raw) = self.store.get(keys::INCIDENTS_TABLE_FILTER).ok().flatten() else {
            return IncidentsFilter::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable incidents table filter");
            IncidentsFilter::default()
        })
    }

    pub fn set_incidents_filter(&self, filter: &IncidentsFilter) -> Result<(), StorageError> {
        let raw = serde_json::to_string(filter).unwrap_or_default();
        self.store.set(keys::INCIDENTS_TABLE_FILTER, &raw)
    }

    pub fn theme(&self) -> Theme {
        self.store
            .get(keys::THEME)
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), StorageError> {
        self.store.set(keys::THEME, theme.as_str())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::storage::MemoryKvStore, rstest::rstest};

    fn prefs() -> Preferences {
        Preferences::new(Arc::new(MemoryKvStore::new()))
    }

    #[rstest]
    #[case(10, 10)]
    #[case(100, 100)]
    #[case(7, DEFAULT_PAGE_SIZE)]
    fn page_size_snaps_to_known_values(#[case] requested: usize, #[case] stored: usize) {
        let p = prefs();
        assert_eq!(p.set_page_size(requested).unwrap(), stored);
        assert_eq!(p.page_size(), stored);
    }

    #[test]
    fn garbage_page_size_reads_as_default() {
        let store = Arc::new(MemoryKvStore::new());
        store.set(keys::TABLE_PAGE_SIZE, "lots").unwrap();
        assert_eq!(Preferences::new(store).page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn incidents_filter_persists() {
        let p = prefs();
        assert_eq!(p.incidents_filter(), IncidentsFilter::default());
        let filter = IncidentsFilter {
            state: StateFilter::All,
            days_back: Some(2),
            types: vec!["Medical".into()],
        };
        p.set_incidents_filter(&filter).unwrap();
        assert_eq!(p.incidents_filter(), filter);
    }

    #[test]
    fn theme_defaults_to_auto() {
        let p = prefs();
        assert_eq!(p.theme(), Theme::Auto);
        p.set_theme(Theme::Dark).unwrap();
        assert_eq!(p.theme(), Theme::Dark);
    }
}
