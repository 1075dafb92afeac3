//! Immutable catalog of content descriptors.

use std::collections::HashMap;

use super::params::Placeholder;
use super::{ContentError, queries};

/// A named, parameterized query definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    key: String,
    title: String,
    query_template: String,
}

impl ContentDescriptor {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        query_template: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            query_template: query_template.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn query_template(&self) -> &str {
        &self.query_template
    }

    /// Placeholders referenced by the template, in composite-key order.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        Placeholder::ALL
            .into_iter()
            .filter(|p| self.query_template.contains(p.token()))
            .collect()
    }
}

/// Read-only lookup table from content key to [`ContentDescriptor`].
///
/// Built once by the composition root and shared by reference; there is no
/// mutation API.
///
/// # Examples
///
/// ```
/// use epicache::content::{ContentCatalog, ContentError};
///
/// let catalog = ContentCatalog::builtin();
/// assert_eq!(catalog.resolve("country_evolution").unwrap().title(), "Country evolution");
/// assert!(matches!(
///     catalog.resolve("nonexistent_key"),
///     Err(ContentError::UnknownContentKey(_))
/// ));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContentCatalog {
    descriptors: Vec<ContentDescriptor>,
    index: HashMap<String, usize>,
}

impl ContentCatalog {
    /// Builds a catalog from `descriptors`, preserving their order.
    ///
    /// # Errors
    ///
    /// [`ContentError::DuplicateContentKey`] if two descriptors share a key.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, ContentError>
    where
        I: IntoIterator<Item = ContentDescriptor>,
    {
        let mut catalog = Self::default();
        for descriptor in descriptors {
            if catalog.index.contains_key(descriptor.key()) {
                return Err(ContentError::DuplicateContentKey(descriptor.key));
            }
            catalog
                .index
                .insert(descriptor.key.clone(), catalog.descriptors.len());
            catalog.descriptors.push(descriptor);
        }
        Ok(catalog)
    }

    /// The epidemiological content served by the API.
    pub fn builtin() -> Self {
        let entries = [
            ("countries_ranking", "Top 5 countries by total cases", queries::COUNTRIES_RANKING),
            ("countries", "List of countries", queries::COUNTRIES),
            ("country_latest_date", "Latest date available", queries::COUNTRY_LATEST_DATE),
            (
                "country_latest_date_total_confirmed",
                "Latest cases",
                queries::COUNTRY_LATEST_DATE_TOTAL_CONFIRMED,
            ),
            (
                "country_latest_date_total_dead",
                "Latest dead",
                queries::COUNTRY_LATEST_DATE_TOTAL_DEAD,
            ),
            (
                "country_latest_date_total",
                "Latest cases and dead",
                queries::COUNTRY_LATEST_DATE_TOTAL,
            ),
            (
                "country_latest_date_total_by_territory",
                "Latest cases and dead by territory",
                queries::COUNTRY_LATEST_DATE_TOTAL_BY_TERRITORY,
            ),
            ("country_territories", "Territories in country", queries::COUNTRY_TERRITORIES),
            ("country_summary", "Country summary", queries::COUNTRY_SUMMARY),
            ("country_evolution", "Country evolution", queries::COUNTRY_EVOLUTION),
            ("country_closest_date", "Closest date available", queries::COUNTRY_CLOSEST_DATE),
            (
                "country_closest_date_total",
                "Closest date cases and dead",
                queries::COUNTRY_CLOSEST_DATE_TOTAL,
            ),
            (
                "country_closest_date_total_by_territory",
                "Closest date cases and dead by territory",
                queries::COUNTRY_CLOSEST_DATE_TOTAL_BY_TERRITORY,
            ),
            ("country_list_summary", "Country list summary", queries::COUNTRY_LIST_SUMMARY),
        ];

        let descriptors = entries
            .into_iter()
            .map(|(key, title, sql)| ContentDescriptor::new(key, title, sql));

        // Literal keys; uniqueness is covered by `builtin_registers_every_key`.
        Self::from_descriptors(descriptors).unwrap_or_default()
    }

    /// Looks up the descriptor for `key`.
    ///
    /// # Errors
    ///
    /// [`ContentError::UnknownContentKey`] if `key` is not registered.
    pub fn resolve(&self, key: &str) -> Result<&ContentDescriptor, ContentError> {
        self.index
            .get(key)
            .map(|&i| &self.descriptors[i])
            .ok_or_else(|| ContentError::UnknownContentKey(key.to_owned()))
    }

    /// Registered keys, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(ContentDescriptor::key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
