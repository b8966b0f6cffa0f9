use std::marker::PhantomData;

use super::model::{BookmarkEntry, Document, Identified, SearchHistoryEntry, Settings, VisitHistoryEntry};
use super::{CollectionKind, Store, StoreError};

pub enum VisitHistory {}
pub enum Bookmarks {}
pub enum SearchHistory {}

impl CollectionKind for VisitHistory {
    type Item = VisitHistoryEntry;
    const KEY: &'static str = super::model::KEY_VISIT_HISTORY;

    fn items(doc: &Document) -> &Vec<VisitHistoryEntry> {
        &doc.visit_history
    }
    fn items_mut(doc: &mut Document) -> &mut Vec<VisitHistoryEntry> {
        &mut doc.visit_history
    }
}

impl CollectionKind for Bookmarks {
    type Item = BookmarkEntry;
    const KEY: &'static str = super::model::KEY_BOOKMARK;

    fn items(doc: &Document) -> &Vec<BookmarkEntry> {
        &doc.bookmark
    }
    fn items_mut(doc: &mut Document) -> &mut Vec<BookmarkEntry> {
        &mut doc.bookmark
    }
}

impl CollectionKind for SearchHistory {
    type Item = SearchHistoryEntry;
    const KEY: &'static str = super::model::KEY_SEARCH_HISTORY;

    fn items(doc: &Document) -> &Vec<SearchHistoryEntry> {
        &doc.search_history
    }
    fn items_mut(doc: &mut Document) -> &mut Vec<SearchHistoryEntry> {
        &mut doc.search_history
    }
}

/// Id-addressed view over visit-history or bookmarks.
///
/// Ids are not unique in the file; every lookup takes the first match, so a
/// later duplicate is only reachable through `all()`.
pub struct IdCollection<'a, C> {
    store: &'a Store,
    _kind: PhantomData<C>,
}

impl<'a, C> IdCollection<'a, C>
where
    C: CollectionKind,
    C::Item: Identified,
{
    pub fn all(&self) -> Vec<C::Item> {
        self.store.get_all::<C>()
    }

    pub fn find_by_id(&self, id: &str) -> Option<C::Item> {
        self.store
            .with_collection::<C, _>(|items| items.iter().find(|e| e.id() == id).cloned())
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.store
            .with_collection::<C, _>(|items| position(items, id))
    }

    /// Appends without checking for an existing entry with the same id.
    pub fn add(&self, entry: C::Item) -> Result<(), StoreError> {
        self.store.append::<C>(entry)
    }

    pub fn update(&self, entry: C::Item, id: &str) -> Result<(), StoreError> {
        self.store.with_collection::<C, _>(|items| {
            let idx = position(items, id).ok_or_else(|| not_found::<C>(id))?;
            items[idx] = entry;
            Ok(())
        })
    }

    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.store.with_collection::<C, _>(|items| {
            let idx = position(items, id).ok_or_else(|| not_found::<C>(id))?;
            items.remove(idx);
            Ok(())
        })
    }
}

fn not_found<C: CollectionKind>(id: &str) -> StoreError {
    tracing::debug!(collection = C::KEY, id, "id not found");
    StoreError::NotFound(id.to_string())
}

fn position<T: Identified>(items: &[T], id: &str) -> Option<usize> {
    items.iter().position(|e| e.id() == id)
}

/// Positional view over search-history.
pub struct SearchHistoryView<'a> {
    store: &'a Store,
}

impl SearchHistoryView<'_> {
    pub fn all(&self) -> Vec<SearchHistoryEntry> {
        self.store.get_all::<SearchHistory>()
    }

    pub fn get(&self, index: usize) -> Option<SearchHistoryEntry> {
        self.store
            .with_collection::<SearchHistory, _>(|items| items.get(index).cloned())
    }

    pub fn add(&self, entry: SearchHistoryEntry) -> Result<(), StoreError> {
        self.store.append::<SearchHistory>(entry)
    }

    pub fn set(&self, index: usize, entry: SearchHistoryEntry) -> Result<(), StoreError> {
        self.store.replace_at::<SearchHistory>(index, entry)
    }

    pub fn remove(&self, index: usize) -> Result<(), StoreError> {
        self.store.remove_at::<SearchHistory>(index)
    }
}

pub struct SettingsView<'a> {
    store: &'a Store,
}

impl SettingsView<'_> {
    pub fn get(&self) -> Settings {
        self.store.with_document(|doc| doc.settings.clone())
    }

    /// Replaces the whole record; no field-level merge.
    pub fn set(&self, settings: Settings) -> Result<(), StoreError> {
        self.store.with_document(|doc| doc.settings = settings);
        Ok(())
    }
}

impl Store {
    pub fn visit_history(&self) -> IdCollection<'_, VisitHistory> {
        IdCollection { store: self, _kind: PhantomData }
    }

    pub fn bookmarks(&self) -> IdCollection<'_, Bookmarks> {
        IdCollection { store: self, _kind: PhantomData }
    }

    pub fn search_history(&self) -> SearchHistoryView<'_> {
        SearchHistoryView { store: self }
    }

    pub fn settings(&self) -> SettingsView<'_> {
        SettingsView { store: self }
    }
}
