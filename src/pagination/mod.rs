//! Next-page detection and page merging.
//!
//! After every page the executor asks [`PaginationStrategy::compute_next`]
//! where the following page lives; when the call is done,
//! [`PaginationStrategy::merge`] folds all pages into one response.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::{PaginationConfig, PaginationMechanism};

/// Errors from pagination parameter arithmetic. Never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaginationError {
    #[error("Pagination parameter '{param}' is not an integer: {value:?}")]
    NonNumeric { param: String, value: String },
    #[error("Pagination parameter '{param}' overflowed")]
    Overflow { param: String },
}

/// One entry of an RFC 5988 `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHeader {
    pub url: String,
    pub rel: String,
}

/// Parses `<url>; rel="next", <url>; rel="last"` into its entries.
/// Entries without a URL or a `rel` are dropped.
pub fn parse_link_header(header: &str) -> Vec<LinkHeader> {
    header
        .split(',')
        .filter_map(|part| {
            let mut url = None;
            let mut rel = None;
            for piece in part.trim().split(';') {
                let piece = piece.trim();
                if piece.starts_with('<') && piece.ends_with('>') {
                    url = Some(piece.trim_matches(&['<', '>'][..]).to_string());
                } else if let Some(value) = piece.strip_prefix("rel=") {
                    rel = Some(value.trim().trim_matches(&['"', '\''][..]).to_string());
                }
            }
            match (url, rel) {
                (Some(url), Some(rel)) => Some(LinkHeader { url, rel }),
                _ => None,
            }
        })
        .collect()
}

/// Where the next page is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// Use this URL verbatim, replacing path and query
    Url(String),
    /// Same path, with these query parameters
    Query(BTreeMap<String, String>),
}

/// Pagination for one API.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationStrategy {
    config: PaginationConfig,
}

impl PaginationStrategy {
    pub fn new(config: PaginationConfig) -> Self {
        Self { config }
    }

    pub fn disabled() -> Self {
        Self::new(PaginationConfig::disabled())
    }

    /// Upper bound on pages fetched per call; 1 when pagination is off.
    pub fn max_pages(&self) -> u32 {
        if self.config.enabled {
            self.config.max_pages.max(1)
        } else {
            1
        }
    }

    pub fn results_field(&self) -> Option<&str> {
        self.config.results_field.as_deref()
    }

    /// Computes the next page from the current request's query parameters and
    /// the decoded response. `Ok(None)` ends pagination.
    pub fn compute_next(
        &self,
        query: &BTreeMap<String, String>,
        body: &Value,
        link_header: Option<&str>,
    ) -> Result<Option<NextPage>, PaginationError> {
        if !self.config.enabled {
            return Ok(None);
        }

        match self.config.mechanism {
            PaginationMechanism::Link => Ok(self.next_from_link(link_header)),
            PaginationMechanism::Cursor => Ok(self.next_from_cursor(query, body)),
            PaginationMechanism::Offset => self.next_from_offset(query),
            PaginationMechanism::Page => self.next_from_page(query, body),
            PaginationMechanism::Auto => {
                if let Some(next) = self.next_from_link(link_header) {
                    return Ok(Some(next));
                }
                if let Some(next) = self.next_from_cursor(query, body) {
                    return Ok(Some(next));
                }
                if let Some(next) = self.next_from_offset(query)? {
                    return Ok(Some(next));
                }
                self.next_from_page(query, body)
            }
        }
    }

    fn next_from_link(&self, link_header: Option<&str>) -> Option<NextPage> {
        parse_link_header(link_header?)
            .into_iter()
            .find(|link| link.rel == "next")
            .map(|link| NextPage::Url(link.url))
    }

    /// Reads the cursor at `cursor_response_field`; null, empty and missing end pagination.
    pub fn extract_cursor(&self, body: &Value) -> Option<String> {
        let path = self.config.cursor_response_field.as_deref()?;
        let value = path
            .split('.')
            .try_fold(body, |current, part| current.as_object()?.get(part))?;
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn next_from_cursor(&self, query: &BTreeMap<String, String>, body: &Value) -> Option<NextPage> {
        let param = self.config.cursor_param.as_ref()?;
        let cursor = self.extract_cursor(body)?;
        let mut next = query.clone();
        next.insert(param.clone(), cursor);
        Some(NextPage::Query(next))
    }

    fn next_from_offset(
        &self,
        query: &BTreeMap<String, String>,
    ) -> Result<Option<NextPage>, PaginationError> {
        let (Some(offset_param), Some(limit_param)) =
            (self.config.offset_param.as_ref(), self.config.limit_param.as_ref())
        else {
            return Ok(None);
        };
        let (Some(offset), Some(limit)) = (query.get(offset_param), query.get(limit_param)) else {
            return Ok(None);
        };

        let offset_value = parse_int(offset_param, offset)?;
        let limit_value = parse_int(limit_param, limit)?;
        let next_offset = offset_value
            .checked_add(limit_value)
            .ok_or_else(|| PaginationError::Overflow {
                param: offset_param.clone(),
            })?;

        let mut next = query.clone();
        next.insert(offset_param.clone(), next_offset.to_string());
        Ok(Some(NextPage::Query(next)))
    }

    fn next_from_page(
        &self,
        query: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<Option<NextPage>, PaginationError> {
        let Some(page_param) = self.config.page_param.as_ref() else {
            return Ok(None);
        };
        if self.is_short_page(query, body)? {
            return Ok(None);
        }

        // Without a page parameter the request just made was page 1.
        let next_page = match query.get(page_param) {
            Some(current) => parse_int(page_param, current)?
                .checked_add(1)
                .ok_or_else(|| PaginationError::Overflow {
                    param: page_param.clone(),
                })?,
            None => 2,
        };

        let mut next = query.clone();
        next.insert(page_param.clone(), next_page.to_string());
        Ok(Some(NextPage::Query(next)))
    }

    /// A page holding fewer results than the requested page size is the last one.
    fn is_short_page(
        &self,
        query: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<bool, PaginationError> {
        let size_param = self.config.page_size_param.as_ref();
        let (Some(size_param), Some(field)) = (size_param, self.results_field()) else {
            return Ok(false);
        };
        let Some(size) = query.get(size_param) else {
            return Ok(false);
        };
        let size = parse_int(size_param, size)?;
        Ok(match body.get(field) {
            Some(Value::Array(items)) => i64::try_from(items.len()).unwrap_or(i64::MAX) < size,
            _ => false,
        })
    }

    /// Merges pages in fetch order.
    ///
    /// A single page is returned untouched. With `results_field` set, the
    /// arrays at that field are concatenated into the first page and every
    /// other field comes from the first page. A first page whose field holds
    /// a non-array value is returned as-is; non-array values on later pages
    /// are skipped.
    pub fn merge(&self, pages: Vec<Value>) -> Value {
        let mut pages = pages.into_iter();
        let Some(mut first) = pages.next() else {
            return Value::Object(serde_json::Map::new());
        };
        let rest: Vec<Value> = pages.collect();
        if rest.is_empty() {
            return first;
        }

        let Some(field) = self.config.results_field.as_deref() else {
            return first;
        };
        let mut items = match first.get_mut(field) {
            Some(Value::Array(items)) => std::mem::take(items),
            Some(_) => return first,
            None if rest.iter().all(|page| page.get(field).is_none()) => return first,
            None => Vec::new(),
        };
        for mut page in rest {
            if let Some(Value::Array(more)) = page.get_mut(field) {
                items.append(more);
            }
        }
        if let Value::Object(map) = &mut first {
            map.insert(field.to_string(), Value::Array(items));
        }
        first
    }
}

fn parse_int(param: &str, value: &str) -> Result<i64, PaginationError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| PaginationError::NonNumeric {
            param: param.to_string(),
            value: value.to_string(),
        })
}
