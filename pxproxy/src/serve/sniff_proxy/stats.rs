/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct ServerStats {
    conn_total: AtomicU64,
    conn_sniff_rejected: AtomicU64,
    task_total: AtomicU64,
    alive_count: AtomicI32,
}

impl ServerStats {
    pub(crate) fn add_conn(&self) {
        self.conn_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn conn_total(&self) -> u64 {
        self.conn_total.load(Ordering::Relaxed)
    }

    pub(crate) fn add_sniff_rejected(&self) {
        self.conn_sniff_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sniff_rejected(&self) -> u64 {
        self.conn_sniff_rejected.load(Ordering::Relaxed)
    }

    pub(crate) fn add_task(&self) {
        self.task_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_total(&self) -> u64 {
        self.task_total.load(Ordering::Relaxed)
    }

    pub(crate) fn alive_count(&self) -> i32 {
        self.alive_count.load(Ordering::Relaxed)
    }

    pub(crate) fn alive_guard(self: &Arc<Self>) -> TaskAliveGuard {
        self.alive_count.fetch_add(1, Ordering::Relaxed);
        TaskAliveGuard(Arc::clone(self))
    }
}

pub(crate) struct TaskAliveGuard(Arc<ServerStats>);

impl Drop for TaskAliveGuard {
    fn drop(&mut self) {
        self.0.alive_count.fetch_sub(1, Ordering::Relaxed);
    }
}
