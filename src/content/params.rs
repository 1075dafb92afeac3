//! Runtime parameters for a content request.
//!
//! [`ContentParams`] is the typed replacement for free-form keyword arguments:
//! one optional slot per recognised parameter. It drives two independent
//! derivations:
//!
//! - [`ContentParams::composite_key`]: the normalized cache identity.
//! - [`ContentParams::render`]: the concrete query text, with raw values substituted.

use std::fmt;

use super::ContentError;

/// Separator between composite-key segments.
const KEY_SEPARATOR: char = '@';

/// Separator between list elements inside one composite-key segment.
const LIST_KEY_SEPARATOR: &str = ",";

/// A named placeholder that may appear in a query template.
///
/// Variants are declared in composite-key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Country,
    CountryList,
    StartDate,
}

impl Placeholder {
    /// All placeholders, in the fixed order their values are appended to a composite key.
    pub const ALL: [Placeholder; 3] = [Self::Country, Self::CountryList, Self::StartDate];

    /// Parameter name as accepted by [`ContentParams::from_pairs`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::CountryList => "country_list",
            Self::StartDate => "start_date",
        }
    }

    /// Token written in query templates, e.g. `<country>`.
    pub fn token(self) -> &'static str {
        match self {
            Self::Country => "<country>",
            Self::CountryList => "<country_list>",
            Self::StartDate => "<start_date>",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameter bundle for one content request.
///
/// Blank strings and empty lists are treated as "not supplied", so they take
/// part in neither the composite key nor query substitution.
///
/// # Examples
///
/// ```
/// use epicache::content::ContentParams;
///
/// let a = ContentParams::new().country("France");
/// let b = ContentParams::new().country("FRANCE");
/// assert_eq!(a.composite_key("country_evolution"), b.composite_key("country_evolution"));
/// assert_eq!(a.composite_key("country_evolution"), "country_evolution@france");
///
/// assert_eq!(ContentParams::new().composite_key("countries"), "countries");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentParams {
    country: Option<String>,
    country_list: Option<Vec<String>>,
    start_date: Option<String>,
}

impl ContentParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `country` parameter. Blank values clear it.
    #[must_use]
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = non_blank(country.into());
        self
    }

    /// Sets the `country_list` parameter.
    ///
    /// Elements are whitespace-trimmed and blank elements dropped; a list with
    /// no remaining elements clears the parameter.
    #[must_use]
    pub fn country_list<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<String> = countries
            .into_iter()
            .filter_map(|c| {
                let c: String = c.into();
                non_blank(c.trim().to_owned())
            })
            .collect();
        self.country_list = if list.is_empty() { None } else { Some(list) };
        self
    }

    /// Sets the `start_date` parameter (expected `YYYY-MM-DD`, validated upstream).
    #[must_use]
    pub fn start_date(mut self, start_date: impl Into<String>) -> Self {
        self.start_date = non_blank(start_date.into());
        self
    }

    /// Builds a bundle from loosely-typed `(name, value)` pairs.
    ///
    /// `country_list` is given as one comma-separated string, optionally wrapped
    /// in `[...]` or `(...)`. Unrecognised names are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |params, (name, value)| match name {
                "country" => params.country(value),
                "country_list" => params.country_list(strip_enclosing(value).split(',')),
                "start_date" => params.start_date(value),
                _ => params,
            })
    }

    pub fn get_country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn get_country_list(&self) -> Option<&[String]> {
        self.country_list.as_deref()
    }

    pub fn get_start_date(&self) -> Option<&str> {
        self.start_date.as_deref()
    }

    /// Returns `true` if no parameter is supplied.
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.country_list.is_none() && self.start_date.is_none()
    }

    /// Derives the cache identity for `key` under these parameters.
    ///
    /// `key@country@list@start_date`, with absent parameters omitted and values
    /// lower-cased, then percent-encoded (`new zealand` becomes `new%20zealand`).
    /// Pure: no dependency on time or cache state.
    pub fn composite_key(&self, key: &str) -> String {
        let mut composite = key.to_owned();
        for placeholder in Placeholder::ALL {
            if let Some(segment) = self.key_segment(placeholder) {
                composite.push(KEY_SEPARATOR);
                composite.push_str(&segment);
            }
        }
        composite
    }

    fn key_segment(&self, placeholder: Placeholder) -> Option<String> {
        match placeholder {
            Placeholder::Country => self.country.as_deref().map(normalize_segment),
            Placeholder::CountryList => self.country_list.as_ref().map(|list| {
                list.iter()
                    .map(|c| normalize_segment(c))
                    .collect::<Vec<_>>()
                    .join(LIST_KEY_SEPARATOR)
            }),
            Placeholder::StartDate => self.start_date.as_deref().map(normalize_segment),
        }
    }

    /// Raw substitution value for `placeholder`, if supplied.
    ///
    /// Lists render as a quoted literal list: `'Spain', 'Italy'`.
    pub fn substitution(&self, placeholder: Placeholder) -> Option<String> {
        match placeholder {
            Placeholder::Country => self.country.clone(),
            Placeholder::CountryList => self.country_list.as_ref().map(|list| {
                list.iter()
                    .map(|c| format!("'{c}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            }),
            Placeholder::StartDate => self.start_date.clone(),
        }
    }

    /// Substitutes parameter values into `template`.
    ///
    /// Single left-to-right pass: substituted text is never rescanned, so a value
    /// that happens to contain a placeholder token is emitted verbatim. No
    /// escaping is performed.
    ///
    /// # Errors
    ///
    /// [`ContentError::MissingParameter`] if the template contains a placeholder
    /// whose parameter was not supplied. `key` is only used for the error.
    pub fn render(&self, key: &str, template: &str) -> Result<String, ContentError> {
        let values: Vec<(Placeholder, Option<String>)> = Placeholder::ALL
            .iter()
            .map(|&p| (p, self.substitution(p)))
            .collect();

        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find('<') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            match values.iter().find(|(p, _)| tail.starts_with(p.token())) {
                Some((placeholder, Some(value))) => {
                    out.push_str(value);
                    rest = &tail[placeholder.token().len()..];
                }
                Some((placeholder, None)) => {
                    return Err(ContentError::MissingParameter {
                        key: key.to_owned(),
                        placeholder: placeholder.name(),
                    });
                }
                None => {
                    out.push('<');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);

        Ok(out)
    }
}

// Lower-cased and percent-encoded, so `@` and `,` inside a value cannot be
// mistaken for separators.
fn normalize_segment(value: &str) -> String {
    urlencoding::encode(&value.to_lowercase()).into_owned()
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

// Drop one enclosing bracket pair, e.g. `[Spain, Italy]` → `Spain, Italy`.
fn strip_enclosing(value: &str) -> &str {
    let trimmed = value.trim();
    for (open, close) in [('[', ']'), ('(', ')'), ('{', '}')] {
        if let Some(inner) = trimmed
            .strip_prefix(open)
            .and_then(|s| s.strip_suffix(close))
        {
            return inner;
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_parameters_yields_bare_key() {
        assert_eq!(ContentParams::new().composite_key("countries"), "countries");
    }

    #[test]
    fn country_is_case_normalized() {
        let keys: Vec<String> = ["France", "FRANCE", "france"]
            .into_iter()
            .map(|c| ContentParams::new().country(c).composite_key("country_evolution"))
            .collect();
        assert!(keys.iter().all(|k| k == "country_evolution@france"));
    }

    #[test]
    fn segments_follow_fixed_order_regardless_of_input_order() {
        let a = ContentParams::from_pairs([
            ("start_date", "2021-03-01"),
            ("country", "Spain"),
            ("country_list", "Italy,France"),
        ]);
        let b = ContentParams::new()
            .country_list(["ITALY", "france"])
            .country("spain")
            .start_date("2021-03-01");
        assert_eq!(a.composite_key("k"), "k@spain@italy,france@2021-03-01");
        assert_eq!(a.composite_key("k"), b.composite_key("k"));
    }

    #[test]
    fn blank_values_do_not_participate() {
        let params = ContentParams::new()
            .country("  ")
            .country_list(Vec::<String>::new())
            .start_date("");
        assert!(params.is_empty());
        assert_eq!(params.composite_key("countries"), "countries");

        let params = ContentParams::new().country_list([" ", ""]);
        assert!(params.get_country_list().is_none());
    }

    #[test]
    fn list_brackets_are_stripped() {
        let a = ContentParams::from_pairs([("country_list", "[Spain, Italy]")]);
        let b = ContentParams::from_pairs([("country_list", "Spain,Italy")]);
        assert_eq!(a.get_country_list(), Some(&["Spain".to_owned(), "Italy".to_owned()][..]));
        assert_eq!(a.composite_key("k"), b.composite_key("k"));
    }

    #[test]
    fn unrecognised_pairs_are_ignored() {
        let params = ContentParams::from_pairs([("region", "Europe"), ("country", "Chile")]);
        assert_eq!(params, ContentParams::new().country("Chile"));
    }

    #[test]
    fn render_substitutes_raw_values() {
        let params = ContentParams::new().country("United Kingdom").start_date("2021-01-31");
        let sql = params
            .render(
                "k",
                "WHERE country_region='<country>' AND d<=\"<start_date>\" OR country_region='<country>'",
            )
            .unwrap();
        assert_eq!(
            sql,
            "WHERE country_region='United Kingdom' AND d<=\"2021-01-31\" OR country_region='United Kingdom'"
        );
    }

    #[test]
    fn render_country_list_as_quoted_literal() {
        let params = ContentParams::new().country_list(["Spain", "Italy"]);
        let sql = params.render("k", "WHERE c IN (<country_list>)").unwrap();
        assert_eq!(sql, "WHERE c IN ('Spain', 'Italy')");
    }

    #[test]
    fn render_leaves_unrelated_angle_brackets_alone() {
        let params = ContentParams::new();
        let sql = params
            .render("k", "SELECT a FROM t WHERE DATE_DIFF(x, y, YEAR)<1 AND b <> c")
            .unwrap();
        assert_eq!(sql, "SELECT a FROM t WHERE DATE_DIFF(x, y, YEAR)<1 AND b <> c");
    }

    #[test]
    fn render_does_not_rescan_substituted_values() {
        let params = ContentParams::new().country("<start_date>");
        let sql = params.render("k", "'<country>'").unwrap();
        assert_eq!(sql, "'<start_date>'");
    }

    #[test]
    fn render_reports_missing_parameter() {
        let err = ContentParams::new()
            .country("Spain")
            .render("country_closest_date", "'<country>' AND \"<start_date>\"")
            .unwrap_err();
        assert_eq!(
            err,
            ContentError::MissingParameter {
                key: "country_closest_date".to_owned(),
                placeholder: "start_date",
            }
        );
    }

    #[test]
    fn separators_inside_values_are_escaped() {
        let embedded = ContentParams::new().country("a@b");
        let split = ContentParams::new().country("a").country_list(["b"]);
        assert_eq!(embedded.composite_key("k"), "k@a%40b");
        assert_eq!(split.composite_key("k"), "k@a@b");

        let one = ContentParams::new().country_list(["Korea, South"]);
        let two = ContentParams::new().country_list(["Korea", "South"]);
        assert_ne!(one.composite_key("k"), two.composite_key("k"));
        assert_eq!(
            ContentParams::new().country("New Zealand").composite_key("k"),
            "k@new%20zealand"
        );
    }

    #[test]
    fn unused_parameters_still_shape_the_key() {
        let params = ContentParams::new().country("Peru");
        assert_eq!(params.render("countries", "SELECT 1").unwrap(), "SELECT 1");
        assert_eq!(params.composite_key("countries"), "countries@peru");
    }
}
