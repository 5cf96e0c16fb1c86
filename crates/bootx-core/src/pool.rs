//! Reusable request contexts.
//!
//! [`ContextPool::acquire`] hands out a [`PooledContext`] guard. Dropping the
//! guard clears every slot and returns the context to the free list, which
//! also happens when the request future is cancelled or unwinds from a panic.
//! A context still referenced elsewhere at that point is never recycled.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{Context, ContextEnv, ContextInner};
use crate::request::RequestParts;

/// Default number of idle contexts kept for reuse.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Mutex-guarded free list of request contexts.
pub struct ContextPool {
    env: Arc<ContextEnv>,
    free: Mutex<Vec<Arc<ContextInner>>>,
    capacity: usize,
}

impl ContextPool {
    /// Creates a pool keeping at most `capacity` idle contexts.
    pub fn new(env: Arc<ContextEnv>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            env,
            free: Mutex::new(Vec::new()),
            capacity,
        })
    }

    pub fn env(&self) -> &Arc<ContextEnv> {
        &self.env
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of contexts waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Takes an idle context, or allocates one if none is available, and
    /// attaches `request` to it.
    pub fn acquire(self: &Arc<Self>, request: RequestParts) -> PooledContext {
        let inner = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Arc::new(ContextInner::new(self.env.clone())));
        inner.state.lock().request = request;
        PooledContext {
            pool: Arc::clone(self),
            ctx: Context::from_inner(inner),
        }
    }

    fn recycle(&self, inner: Arc<ContextInner>) {
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(inner);
        }
    }
}

impl fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("idle", &self.idle())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Exclusive ownership of one pooled context for the span of a request.
pub struct PooledContext {
    pool: Arc<ContextPool>,
    ctx: Context,
}

impl PooledContext {
    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

impl Deref for PooledContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        // Only this guard may hold the context when it goes back to the pool.
        if Arc::strong_count(&self.ctx.inner) != 1 {
            tracing::warn!(
                func = %self.ctx.func_name(),
                "request context still referenced after release, not recycling"
            );
            return;
        }
        self.ctx.inner.state.lock().reset();
        self.pool.recycle(Arc::clone(&self.ctx.inner));
    }
}

impl fmt::Debug for PooledContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.ctx, f)
    }
}
