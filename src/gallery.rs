//! Gallery — browse and delete past readings.
//!
//! A read-only projection over the shared [`ReadingStore`]; deletion goes
//! through [`ReadingStore::delete_at`] so memory and storage stay in step.

use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::info;

use crate::store::{ReadingRecord, SharedStore, StorageError};

pub const EMPTY_TITLE: &str = "No Past Readings Yet";
pub const EMPTY_HINT: &str = "Your palm reading history will appear here after you get your first reading.";

/// Preview length, roughly three lines of a gallery card.
pub const PREVIEW_CHARS: usize = 160;

const DISPLAY_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    /// Zero-based position in the store; pass back to [`GalleryView::delete`].
    pub index: usize,
    /// `Palm Reading <n>`, one-based.
    pub title: String,
    pub timestamp: String,
    pub display_date: String,
    pub preview: String,
    pub text: String,
    pub image: String,
}

impl GalleryEntry {
    fn from_record(index: usize, record: &ReadingRecord) -> Self {
        Self {
            index,
            title: format!("Palm Reading {}", index + 1),
            timestamp: record.timestamp.clone(),
            display_date: display_date(&record.timestamp),
            preview: preview(&record.text),
            text: record.text.clone(),
            image: record.image.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryPage {
    Empty { title: &'static str, hint: &'static str },
    Entries(Vec<GalleryEntry>),
}

pub struct GalleryView {
    store: SharedStore,
}

impl GalleryView {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn page(&self) -> GalleryPage {
        let store = self.store.lock().await;
        if store.is_empty() {
            return GalleryPage::Empty { title: EMPTY_TITLE, hint: EMPTY_HINT };
        }
        GalleryPage::Entries(
            store
                .records()
                .iter()
                .enumerate()
                .map(|(i, r)| GalleryEntry::from_record(i, r))
                .collect(),
        )
    }

    pub async fn entry(&self, index: usize) -> Option<GalleryEntry> {
        let store = self.store.lock().await;
        store.records().get(index).map(|r| GalleryEntry::from_record(index, r))
    }

    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfRange`] for a bad position, or the
    /// write error if the updated collection could not be persisted.
    pub async fn delete(&self, index: usize) -> Result<(), StorageError> {
        let mut store = self.store.lock().await;
        store.delete_at(index).await?;
        info!(index, remaining = store.len(), "gallery: reading deleted");
        Ok(())
    }
}

/// Render a stored timestamp for display. Unparseable values are shown as-is.
#[must_use]
pub fn display_date(timestamp: &str) -> String {
    OffsetDateTime::parse(timestamp, &Rfc3339)
        .ok()
        .and_then(|t| t.to_offset(time::UtcOffset::UTC).format(DISPLAY_FORMAT).ok())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Collapse whitespace and cut to [`PREVIEW_CHARS`] characters.
#[must_use]
pub fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
#[path = "gallery_test.rs"]
mod tests;
