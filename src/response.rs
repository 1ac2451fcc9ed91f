//! Standard response envelopes: `{data}` for one row, `{data, meta}` for a page.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl<T> SuccessOne<T> {
    pub fn new(data: T) -> Self {
        SuccessOne { data, meta: None }
    }
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct PageMeta {
    pub count: u64,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl PageMeta {
    /// Page metadata with `next`/`previous` links that keep every other query parameter.
    pub fn new(path: &str, query: Option<&str>, count: u64, total: u64, limit: u32, offset: u32) -> Self {
        let kept: Vec<&str> = query
            .unwrap_or("")
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or("");
                key != "limit" && key != "offset"
            })
            .collect();
        let link = |off: u32| {
            let mut s = format!("{}?limit={}&offset={}", path, limit, off);
            for pair in &kept {
                s.push('&');
                s.push_str(pair);
            }
            s
        };
        let next = (u64::from(offset) + u64::from(limit) < total).then(|| link(offset + limit));
        let previous = (offset > 0).then(|| link(offset.saturating_sub(limit)));
        PageMeta {
            count,
            total,
            limit,
            offset,
            next,
            previous,
        }
    }

    /// Metadata for an unpaginated result set.
    pub fn unpaged(count: u64) -> Self {
        PageMeta {
            count,
            total: count,
            limit: u32::try_from(count).unwrap_or(u32::MAX),
            offset: 0,
            next: None,
            previous: None,
        }
    }
}
