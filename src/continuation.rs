//! Paging of large result sets across requests.
//!
//! A [`ContinuationPointManager`] hands out the first page of a result and
//! keeps the remainder behind an opaque token. Every `get_next` consumes the
//! token it was given and, if more items remain, issues a fresh one.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::debug;

use crate::status::StatusCode;

/// One page of a paged result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when the result is exhausted.
    pub continuation_point: Option<Bytes>,
}

#[derive(Debug)]
struct Remainder<T> {
    items: Vec<T>,
    max_elements: usize,
}

/// Continuation points of one session.
#[derive(Debug)]
pub struct ContinuationPointManager<T> {
    points: HashMap<Bytes, Remainder<T>>,
    max_points: usize,
    next_token: u64,
}

impl<T> ContinuationPointManager<T> {
    /// `max_points` bounds the number of live tokens; 0 means unbounded.
    pub fn new(max_points: usize) -> Self {
        Self {
            points: HashMap::new(),
            max_points,
            next_token: 1,
        }
    }

    /// Return the first page of `items`.
    ///
    /// With `max_elements == 0`, or when everything fits, the whole array is
    /// returned and no token is created. Fails with `BadNoContinuationPoints`
    /// if a token is needed and all are in use.
    pub fn register(&mut self, max_elements: u32, mut items: Vec<T>) -> Result<Page<T>, StatusCode> {
        let max_elements = max_elements as usize;
        if max_elements == 0 || items.len() <= max_elements {
            return Ok(Page {
                items,
                continuation_point: None,
            });
        }
        if self.max_points != 0 && self.points.len() >= self.max_points {
            return Err(StatusCode::BAD_NO_CONTINUATION_POINTS);
        }
        let remainder = items.split_off(max_elements);
        let token = self.store(remainder, max_elements);
        Ok(Page {
            items,
            continuation_point: Some(token),
        })
    }

    /// Return the next page behind `continuation_point`, consuming it.
    pub fn get_next(&mut self, continuation_point: &[u8]) -> Result<Page<T>, StatusCode> {
        let Remainder {
            mut items,
            max_elements,
        } = self
            .points
            .remove(continuation_point)
            .ok_or(StatusCode::BAD_CONTINUATION_POINT_INVALID)?;

        if items.len() <= max_elements {
            return Ok(Page {
                items,
                continuation_point: None,
            });
        }
        let rest = items.split_off(max_elements);
        let token = self.store(rest, max_elements);
        Ok(Page {
            items,
            continuation_point: Some(token),
        })
    }

    /// Release a token. Returns `false` if it was unknown.
    pub fn cancel(&mut self, continuation_point: &[u8]) -> bool {
        self.points.remove(continuation_point).is_some()
    }

    /// Release every token.
    pub fn clear(&mut self) {
        if !self.points.is_empty() {
            debug!("Releasing {} continuation points", self.points.len());
        }
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn store(&mut self, items: Vec<T>, max_elements: usize) -> Bytes {
        let token = Bytes::copy_from_slice(&self.next_token.to_be_bytes());
        self.next_token = self.next_token.wrapping_add(1).max(1);
        self.points.insert(
            token.clone(),
            Remainder {
                items,
                max_elements,
            },
        );
        token
    }
}
