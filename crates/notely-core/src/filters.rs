//! Note list search and ordering helpers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::Note;

/// Display order for note lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Title,
    TitleDesc,
}

impl SortOrder {
    pub const ALL: [Self; 4] = [Self::Newest, Self::Oldest, Self::Title, Self::TitleDesc];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Title => "title",
            Self::TitleDesc => "title-desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|order| order.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown sort order '{value}' (expected newest, oldest, title or title-desc)"
                ))
            })
    }
}

/// Filter notes by case-insensitive text query over title and body.
#[must_use]
pub fn filter_notes(notes: &[Note], search_query: &str) -> Vec<Note> {
    let normalized_query = normalize_query(search_query);
    notes
        .iter()
        .filter(|note| note_matches_query(note, &normalized_query))
        .cloned()
        .collect()
}

/// Sort in place. Ties keep their incoming order.
pub fn sort_notes(notes: &mut [Note], order: SortOrder) {
    match order {
        SortOrder::Newest => notes.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Oldest => notes.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortOrder::Title => notes.sort_by(compare_titles),
        SortOrder::TitleDesc => notes.sort_by(|a, b| compare_titles(b, a)),
    }
}

/// Filter then sort.
#[must_use]
pub fn query_notes(notes: &[Note], search_query: &str, order: SortOrder) -> Vec<Note> {
    let mut matched = filter_notes(notes, search_query);
    sort_notes(&mut matched, order);
    matched
}

pub(crate) fn normalize_query(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn note_matches_query(note: &Note, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    note.title.to_lowercase().contains(query) || note.body.to_lowercase().contains(query)
}

fn compare_titles(a: &Note, b: &Note) -> Ordering {
    a.title.to_lowercase().cmp(&b.title.to_lowercase())
}
