//! Entity counts and per-kind statistics.

use serde::Serialize;

use crate::logging::{event_names, LogContext, Stage};
use crate::log_event;
use crate::store::{Datastore, KindStat, Query, StoreError};

/// Keys fetched per page by [`count_entities_paged`].
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// How a count was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMethod {
    /// The store's own count.
    Direct,
    /// Summed keys-only pages.
    Paged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountReport {
    pub kind: String,
    pub count: u64,
    pub method: CountMethod,
    /// Non-empty pages read, for paged counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u64>,
}

/// Count every entity of `kind` with a single count query.
pub fn count_entities<S: Datastore + ?Sized>(
    store: &S,
    kind: &str,
    ctx: &LogContext,
) -> Result<CountReport, StoreError> {
    let count = store.count(&Query::new(kind))?;
    log_event!(
        ctx,
        INFO,
        event_names::COUNT_FINISHED,
        Stage::Inspect,
        "count finished",
        kind = kind,
        count = count
    );
    Ok(CountReport {
        kind: kind.to_string(),
        count,
        method: CountMethod::Direct,
        pages: None,
    })
}

/// Count every entity of `kind` by walking key-ordered, keys-only pages of
/// `page_size` keys, each page continuing after the previous page's last key.
pub fn count_entities_paged<S: Datastore + ?Sized>(
    store: &S,
    kind: &str,
    page_size: usize,
    ctx: &LogContext,
) -> Result<CountReport, StoreError> {
    let base = Query::new(kind).keys_only().order_by_key().limit(page_size);
    base.validate()?;

    let mut count = 0u64;
    let mut pages = 0u64;
    let mut cursor = None;
    loop {
        let query = match &cursor {
            Some(last) => base.clone().start_after(last),
            None => base.clone(),
        };
        let page = store.run_query(&query)?;
        let Some(last) = page.last() else { break };

        count += page.len() as u64;
        pages += 1;
        log_event!(
            ctx,
            INFO,
            event_names::COUNT_PAGE,
            Stage::Inspect,
            format!("page {}: {} keys, running total {}", pages, page.len(), count),
            kind = kind,
            page = pages,
            count = count
        );
        cursor = Some(last.key.clone());
    }

    log_event!(
        ctx,
        INFO,
        event_names::COUNT_FINISHED,
        Stage::Inspect,
        "paged count finished",
        kind = kind,
        count = count,
        pages = pages
    );
    Ok(CountReport {
        kind: kind.to_string(),
        count,
        method: CountMethod::Paged,
        pages: Some(pages),
    })
}

/// Statistics for `kind`. A store without statistics for it is an error.
pub fn kind_stat<S: Datastore + ?Sized>(
    store: &S,
    kind: &str,
    ctx: &LogContext,
) -> Result<KindStat, cp_common::Error> {
    match store.kind_stat(kind)? {
        Some(stat) => Ok(stat),
        None => {
            log_event!(
                ctx,
                ERROR,
                event_names::STAT_MISSING,
                Stage::Inspect,
                "no statistics for kind",
                kind = kind
            );
            Err(cp_common::Error::NoKindStats {
                kind: kind.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Entity, Key, MemoryStore};

    fn ctx() -> LogContext {
        LogContext::new("run-test", "host-test")
    }

    fn fill(store: &MemoryStore, n: usize) {
        for i in 0..n {
            store
                .put(Entity::new(Key::named("testkind", format!("name{}", i), None)))
                .unwrap();
        }
    }

    #[test]
    fn test_direct_and_paged_counts_agree() {
        let store = MemoryStore::default();
        fill(&store, 25);
        store
            .put(Entity::new(Key::named("otherkind", "x", None)))
            .unwrap();

        let direct = count_entities(&store, "testkind", &ctx()).unwrap();
        let paged = count_entities_paged(&store, "testkind", 10, &ctx()).unwrap();
        assert_eq!(direct.count, 25);
        assert_eq!(paged.count, 25);
        assert_eq!(paged.pages, Some(3));
        assert_eq!(paged.method, CountMethod::Paged);
    }

    #[test]
    fn test_paged_count_exact_multiple() {
        let store = MemoryStore::default();
        fill(&store, 20);
        let paged = count_entities_paged(&store, "testkind", 10, &ctx()).unwrap();
        assert_eq!(paged.count, 20);
        assert_eq!(paged.pages, Some(2));
    }

    #[test]
    fn test_paged_count_empty_kind() {
        let store = MemoryStore::default();
        let paged = count_entities_paged(&store, "testkind", DEFAULT_PAGE_SIZE, &ctx()).unwrap();
        assert_eq!(paged.count, 0);
        assert_eq!(paged.pages, Some(0));
    }

    #[test]
    fn test_zero_page_size_is_invalid_query() {
        let store = MemoryStore::default();
        assert!(matches!(
            count_entities_paged(&store, "testkind", 0, &ctx()),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_missing_stats_is_error() {
        let store = MemoryStore::default();
        let err = kind_stat(&store, "testkind", &ctx()).unwrap_err();
        assert_eq!(err.code(), 22);

        fill(&store, 3);
        assert_eq!(kind_stat(&store, "testkind", &ctx()).unwrap().count, 3);
    }
}
