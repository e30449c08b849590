//! Concurrency-limited parallel iteration utilities.
//!
//! Wraps rayon's parallel iterators to process items while limiting how many
//! are in flight at once (e.g. to cap the memory held by measurement tasks).

use rayon::prelude::*;

/// Maps `f` over `items` in parallel, consuming them, with at most
/// `max_concurrent` items in flight at once. Output order matches input order.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn par_map_limited<T, R, F>(items: Vec<T>, max_concurrent: usize, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    assert!(max_concurrent > 0, "max_concurrent must be > 0");

    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        let chunk: Vec<T> = items.by_ref().take(max_concurrent).collect();
        let chunk_results: Vec<R> = chunk.into_par_iter().map(&f).collect();
        results.extend(chunk_results);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_par_map_limited_basic() {
        let items: Vec<i32> = (0..10).collect();
        let result = par_map_limited(items, 3, |x| x * 2);
        assert_eq!(result, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
    }

    #[test]
    fn test_par_map_limited_preserves_order() {
        let items: Vec<i32> = (0..100).collect();
        let result = par_map_limited(items, 4, |x| x);
        let expected: Vec<i32> = (0..100).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_par_map_limited_empty() {
        let result: Vec<i32> = par_map_limited(Vec::<i32>::new(), 2, |x| x);
        assert!(result.is_empty());
    }

    #[test]
    fn test_par_map_limited_moves_owned_values() {
        let items: Vec<String> = vec!["a".into(), "bb".into(), "ccc".into()];
        let lengths = par_map_limited(items, 2, |s| s.len());
        assert_eq!(lengths, vec![1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "max_concurrent must be > 0")]
    fn test_par_map_limited_zero_concurrency_panics() {
        par_map_limited(vec![1], 0, |x: i32| x);
    }
}
