//! Per-thread search state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::cache::TranspositionCache;
use crate::egdb::Egdb;

/// Everything one search thread needs: its private node counter and thread
/// id, plus handles to the shared cache, endgame tables, and the abort
/// flag. Node counts are flushed into the global counter at depth
/// boundaries and at thread exit.
pub struct SearchContext<'a> {
    pub nodes: u64,
    pub thread_id: usize,
    cache: &'a TranspositionCache,
    egdb: Option<&'a Egdb>,
    abort: &'a AtomicBool,
    global_nodes: &'a AtomicU64,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        cache: &'a TranspositionCache,
        egdb: Option<&'a Egdb>,
        abort: &'a AtomicBool,
        global_nodes: &'a AtomicU64,
        thread_id: usize,
    ) -> SearchContext<'a> {
        SearchContext {
            nodes: 0,
            thread_id,
            cache,
            egdb,
            abort,
            global_nodes,
        }
    }

    #[inline]
    pub fn cache(&self) -> &TranspositionCache {
        self.cache
    }

    #[inline]
    pub fn egdb(&self) -> Option<&Egdb> {
        self.egdb
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Adds the thread-local node count to the global counter and zeroes
    /// it.
    pub fn flush_nodes(&mut self) -> u64 {
        self.global_nodes.fetch_add(self.nodes, Ordering::Relaxed);
        self.nodes = 0;
        self.global_nodes.load(Ordering::Relaxed)
    }
}
