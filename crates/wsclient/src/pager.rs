//! Cursor pagination over list endpoints.
//!
//! List endpoints continue either with a `next_page_token` or with
//! `has_more` plus an offset. [`Pages`] follows whichever the response uses
//! and yields one [`Page`] per request.

use crate::client::WorkspaceClient;
use crate::error::Result;
use serde_json::Value;

/// One page of list results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-indexed page number.
    pub number: usize,
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    Token(String),
    Offset(usize),
    Done,
}

/// Iterator over the pages of a list endpoint.
///
/// An error response ends the iteration after yielding the error.
pub struct Pages<'a> {
    client: &'a WorkspaceClient,
    path: String,
    query: Vec<(String, String)>,
    items_key: String,
    cursor: Cursor,
    offset: usize,
    pages_read: usize,
}

impl<'a> Pages<'a> {
    pub(crate) fn new(
        client: &'a WorkspaceClient,
        path: &str,
        query: &[(&str, &str)],
        items_key: &str,
    ) -> Self {
        Self {
            client,
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            items_key: items_key.to_string(),
            cursor: Cursor::Start,
            offset: 0,
            pages_read: 0,
        }
    }

    /// First item across all pages matching `predicate`; stops paging once found.
    pub fn find_item<F>(self, mut predicate: F) -> Result<Option<Value>>
    where
        F: FnMut(&Value) -> bool,
    {
        for page in self {
            if let Some(found) = page?.items.into_iter().find(|item| predicate(item)) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// All items of all pages.
    pub fn collect_items(self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        for page in self {
            items.extend(page?.items);
        }
        Ok(items)
    }

    fn advance(&mut self, body: &Value, received: usize) {
        let token = body
            .get("next_page_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());

        self.cursor = match token {
            Some(token) if self.cursor == Cursor::Token(token.to_string()) => {
                log::warn!("{} repeated page token, stopping", self.path);
                Cursor::Done
            }
            Some(token) => Cursor::Token(token.to_string()),
            None if body.get("has_more").and_then(Value::as_bool) == Some(true)
                && received > 0 =>
            {
                self.offset += received;
                Cursor::Offset(self.offset)
            }
            None => Cursor::Done,
        };
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        let continuation = match &self.cursor {
            Cursor::Done => return None,
            Cursor::Start => None,
            Cursor::Token(token) => Some(("page_token", token.clone())),
            Cursor::Offset(offset) => Some(("offset", offset.to_string())),
        };

        let mut query: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some((key, value)) = &continuation {
            query.push((*key, value.as_str()));
        }

        let body = match self
            .client
            .get(&self.path, &query)
            .and_then(|response| response.into_result())
        {
            Ok(body) => body,
            Err(e) => {
                self.cursor = Cursor::Done;
                return Some(Err(e));
            }
        };

        let items = body
            .get(&self.items_key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        self.advance(&body, items.len());
        self.pages_read += 1;

        Some(Ok(Page {
            number: self.pages_read,
            items,
        }))
    }
}
