//! Filterable, searchable view over the objects of one listing.

use super::object::ObjectDescriptor;
use regex::{Regex, RegexBuilder};
use std::{
    collections::{BTreeSet, HashSet},
    slice,
    sync::Arc,
};
use thiserror::Error;

/// Column headers produced by [`ObjectCollection::as_table`].
pub const TABLE_HEADERS: [&str; 4] = ["Account", "Container", "File", "Extension"];

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid search pattern `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Headers plus rows, ready for a table renderer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// An ordered set of descriptors, in listing order.
///
/// Every operation returns a new collection and leaves the receiver intact.
/// Descriptors are shared between collections, so narrowing a large listing
/// only copies pointers.
#[derive(Clone, Debug, Default)]
pub struct ObjectCollection {
    items: Vec<Arc<ObjectDescriptor>>,
}

impl ObjectCollection {
    pub fn new(items: Vec<ObjectDescriptor>) -> Self {
        Self {
            items: items.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate descriptors in collection order. Each call starts over.
    pub fn iter(&self) -> slice::Iter<'_, Arc<ObjectDescriptor>> {
        self.items.iter()
    }

    fn filtered(&self, keep: impl Fn(&ObjectDescriptor) -> bool) -> Self {
        Self {
            items: self.items.iter().filter(|d| keep(d)).cloned().collect(),
        }
    }

    /// Keep descriptors whose extension is in `exts` (exact, case-sensitive).
    pub fn include_extensions<I, S>(&self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let exts: HashSet<String> = exts.into_iter().map(Into::into).collect();
        self.filtered(|d| exts.contains(d.extension()))
    }

    /// Keep descriptors whose extension is not in `exts`.
    pub fn exclude_extensions<I, S>(&self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let exts: HashSet<String> = exts.into_iter().map(Into::into).collect();
        self.filtered(|d| !exts.contains(d.extension()))
    }

    /// Case-insensitive search over object names.
    ///
    /// Plain queries match by substring. Regex queries are wrapped as
    /// `^.*(query).*$`, so an unanchored pattern matches anywhere in the
    /// name. Anchors inside the query keep their meaning: `\.pdf$` matches
    /// `report.pdf` but not `archive.pdf.bak`.
    pub fn search(&self, query: &str, use_regex: bool) -> Result<Self, PatternError> {
        if use_regex {
            let re = search_regex(query)?;
            Ok(self.filtered(|d| re.is_match(&d.name().to_lowercase())))
        } else {
            let needle = query.to_lowercase();
            Ok(self.filtered(|d| d.name().to_lowercase().contains(&needle)))
        }
    }

    /// Distinct extensions present in the collection.
    pub fn all_extensions(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .map(|d| d.extension().to_string())
            .collect()
    }

    /// [`Self::all_extensions`] as one-element rows.
    pub fn extension_rows(&self) -> Vec<Vec<String>> {
        self.all_extensions()
            .into_iter()
            .map(|ext| vec![ext])
            .collect()
    }

    pub fn as_table(&self) -> Table {
        Table {
            headers: TABLE_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: self
                .items
                .iter()
                .map(|d| {
                    vec![
                        d.account().to_string(),
                        d.container().to_string(),
                        d.name().to_string(),
                        d.extension().to_string(),
                    ]
                })
                .collect(),
        }
    }
}

fn search_regex(query: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(&format!("^.*({query}).*$"))
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::InvalidRegex {
            pattern: query.to_string(),
            source,
        })
}

impl<'a> IntoIterator for &'a ObjectCollection {
    type Item = &'a Arc<ObjectDescriptor>;
    type IntoIter = slice::Iter<'a, Arc<ObjectDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for ObjectCollection {
    type Item = Arc<ObjectDescriptor>;
    type IntoIter = std::vec::IntoIter<Arc<ObjectDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl FromIterator<ObjectDescriptor> for ObjectCollection {
    fn from_iter<T: IntoIterator<Item = ObjectDescriptor>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
