//! Pagination
//!
//! A [`PageCursor`] follows `next_page_token` across pages of a data
//! endpoint. It stops when the token is absent, once the accumulated row
//! count reaches the caller's limit, or after an error. The async and
//! blocking iterators drive the same cursor, and dropping either one issues
//! no further requests.

use futures::Stream;
use serde_json::{Map, Value};

use crate::domain::records::{RecordKind, RecordSet};
use crate::error::Result;

use super::blocking::BlockingRestClient;
use super::client::RestClient;
use super::request::RequestSpec;

/// Continuation state for one paginated resource.
#[derive(Debug, Clone)]
pub struct PageCursor {
    spec: RequestSpec,
    kind: RecordKind,
    limit: Option<usize>,
    rows: usize,
    done: bool,
}

impl PageCursor {
    /// Cursor over pages of `kind`, starting from `spec`.
    #[must_use]
    pub const fn new(spec: RequestSpec, kind: RecordKind, limit: Option<usize>) -> Self {
        Self {
            spec,
            kind,
            limit,
            rows: 0,
            done: false,
        }
    }

    /// Request for the next page, or `None` when finished.
    #[must_use]
    pub fn next_spec(&self) -> Option<&RequestSpec> {
        (!self.done).then_some(&self.spec)
    }

    /// Rows seen so far.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Whether no more pages will be requested.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Stop paging.
    pub const fn finish(&mut self) {
        self.done = true;
    }

    /// Account for a received page and set up the next request.
    pub fn advance(&mut self, page: &Value) {
        self.rows += count_rows(page.get(self.kind.page_key()));

        if self.limit.is_some_and(|limit| self.rows >= limit) {
            self.done = true;
            return;
        }

        let token = page
            .get("next_page_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());
        match token {
            Some(token) => {
                let data = self
                    .spec
                    .data
                    .get_or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(params) = data {
                    params.insert("page_token".to_string(), Value::from(token));
                }
            }
            None => self.done = true,
        }
    }
}

/// Rows in a page: array length, or the sum over a symbol-keyed map.
fn count_rows(records: Option<&Value>) -> usize {
    match records {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(by_symbol)) => by_symbol
            .values()
            .map(|v| v.as_array().map_or(0, Vec::len))
            .sum(),
        _ => 0,
    }
}

/// Concatenate the records of `pages` into one set, truncated to `limit`.
#[must_use]
pub fn assemble(
    kind: RecordKind,
    symbol: &str,
    pages: Vec<Value>,
    limit: Option<usize>,
) -> RecordSet {
    let mut set = RecordSet::new(kind, Some(symbol.to_string()));
    for mut page in pages {
        if let Some(Value::Array(records)) = page.get_mut(kind.page_key()).map(Value::take) {
            set.extend(records);
        }
    }
    if let Some(limit) = limit {
        set.truncate(limit);
    }
    set
}

/// Lazily fetch pages through the async client.
pub fn page_stream(
    client: RestClient,
    cursor: PageCursor,
) -> impl Stream<Item = Result<Value>> + Send + 'static {
    futures::stream::unfold((client, cursor), |(client, mut cursor)| async move {
        let spec = cursor.next_spec()?.clone();
        match client.execute(&spec).await {
            Ok(Some(page)) => {
                cursor.advance(&page);
                tracing::debug!(rows = cursor.rows(), done = cursor.is_done(), "Fetched page");
                Some((Ok(page), (client, cursor)))
            }
            Ok(None) => None,
            Err(e) => {
                cursor.finish();
                Some((Err(e), (client, cursor)))
            }
        }
    })
}

/// Page iterator over the blocking client.
#[derive(Debug)]
pub struct BlockingPages {
    client: BlockingRestClient,
    cursor: PageCursor,
}

impl BlockingPages {
    pub(crate) const fn new(client: BlockingRestClient, cursor: PageCursor) -> Self {
        Self { client, cursor }
    }
}

impl Iterator for BlockingPages {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let spec = self.cursor.next_spec()?.clone();
        match self.client.execute(&spec) {
            Ok(Some(page)) => {
                self.cursor.advance(&page);
                Some(Ok(page))
            }
            Ok(None) => {
                self.cursor.finish();
                None
            }
            Err(e) => {
                self.cursor.finish();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bars(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"o": i, "c": i})).collect()
    }

    fn cursor(limit: Option<usize>) -> PageCursor {
        PageCursor::new(
            RequestSpec::get("/stocks/AAPL/bars").on_data_api(),
            RecordKind::Bar,
            limit,
        )
    }

    #[test]
    fn token_is_carried_into_next_request() {
        let mut cursor = cursor(None);
        cursor.advance(&json!({"bars": bars(2), "next_page_token": "T1"}));
        let spec = cursor.next_spec().unwrap();
        assert_eq!(spec.data, Some(json!({"page_token": "T1"})));

        cursor.advance(&json!({"bars": bars(2), "next_page_token": null}));
        assert!(cursor.next_spec().is_none());
        assert_eq!(cursor.rows(), 4);
    }

    #[test]
    fn limit_is_checked_after_each_page() {
        let mut cursor = cursor(Some(500));
        cursor.advance(&json!({"bars": bars(400), "next_page_token": "T1"}));
        assert!(!cursor.is_done());
        cursor.advance(&json!({"bars": bars(400), "next_page_token": "T2"}));
        assert!(cursor.is_done());
    }

    #[test]
    fn keyed_pages_are_summed() {
        assert_eq!(
            count_rows(Some(&json!({"AAPL": bars(3), "MSFT": bars(2)}))),
            5
        );
        assert_eq!(count_rows(Some(&Value::Null)), 0);
    }

    #[test]
    fn assembly_truncates() {
        let pages = vec![
            json!({"bars": bars(400), "next_page_token": "T1"}),
            json!({"bars": bars(400)}),
        ];
        let set = assemble(RecordKind::Bar, "AAPL", pages.clone(), None);
        assert_eq!(set.len(), 800);
        let set = assemble(RecordKind::Bar, "AAPL", pages, Some(500));
        assert_eq!(set.len(), 500);
        assert_eq!(set.symbol(), Some("AAPL"));
    }
}
