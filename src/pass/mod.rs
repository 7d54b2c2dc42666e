//! Process-wide cache of generated shader passes.
//!
//! Passes are keyed by the codegen content hash and confirmed by structural
//! equality of their [`ResourceDescriptor`]. Every list access happens under a
//! single lock; source generation and backend compilation happen outside it.

mod clock;
mod compile;
mod deferred;
mod list;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use deferred::{CompileOutcome, DeferredCompiler};

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use log::debug;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use self::list::PassList;
use crate::{
    backend::{BackendShader, ShaderCompiler},
    codegen::{self, CodegenOutput, ResourceDescriptor, ShaderLibrary},
    config::CacheConfig,
    graph::NodeGraph,
    material::Material,
};

/// One generated shader variant.
pub struct ShaderPass {
    hash: u32,
    descriptor: ResourceDescriptor,
    /// Only mutated while the pass list lock is held.
    refcount: AtomicU32,
    /// Set exactly once. `Some(None)` is a sticky compile failure.
    compiled: OnceCell<Option<Box<dyn BackendShader>>>,
}

impl ShaderPass {
    fn new(hash: u32, descriptor: ResourceDescriptor) -> Self {
        Self {
            hash,
            descriptor,
            refcount: AtomicU32::new(0),
            compiled: OnceCell::new(),
        }
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Relaxed)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Compiled shader, `None` when not compiled yet or when compilation failed.
    pub fn shader(&self) -> Option<&dyn BackendShader> {
        self.compiled.get().and_then(|s| s.as_deref())
    }

    fn is_failed(&self) -> bool {
        matches!(self.compiled.get(), Some(None))
    }
}

impl fmt::Debug for ShaderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderPass")
            .field("hash", &format_args!("{:#010x}", self.hash))
            .field("refcount", &self.refcount())
            .field("compiled", &self.is_compiled())
            .field("failed", &self.is_failed())
            .finish()
    }
}

/// Counted reference to a cached pass. Cloning acquires, dropping releases.
///
/// Releasing never frees the pass; unreferenced passes are reclaimed by
/// [`PassCache::garbage_collect`].
pub struct PassHandle {
    list: Arc<Mutex<PassList>>,
    pass: Arc<ShaderPass>,
}

impl PassHandle {
    /// Caller must hold the list lock.
    fn acquire_locked(list: &Arc<Mutex<PassList>>, pass: &Arc<ShaderPass>) -> Self {
        pass.refcount.fetch_add(1, Ordering::Relaxed);
        Self {
            list: Arc::clone(list),
            pass: Arc::clone(pass),
        }
    }

    pub fn pass(&self) -> &ShaderPass {
        &self.pass
    }

    pub fn hash(&self) -> u32 {
        self.pass.hash
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.pass.descriptor
    }

    pub fn refcount(&self) -> u32 {
        self.pass.refcount()
    }

    pub fn is_compiled(&self) -> bool {
        self.pass.is_compiled()
    }

    pub fn shader(&self) -> Option<&dyn BackendShader> {
        self.pass.shader()
    }

    /// Whether both handles refer to the same cache entry.
    pub fn ptr_eq(&self, other: &PassHandle) -> bool {
        Arc::ptr_eq(&self.pass, &other.pass)
    }
}

impl Clone for PassHandle {
    fn clone(&self) -> Self {
        let _guard = self.list.lock();
        Self::acquire_locked(&self.list, &self.pass)
    }
}

impl Drop for PassHandle {
    fn drop(&mut self) {
        let _guard = self.list.lock();
        let prev = self.pass.refcount.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "pass released more often than acquired");
    }
}

impl fmt::Debug for PassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PassHandle").field(&*self.pass).finish()
    }
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCacheStats {
    pub passes: usize,
    pub hits: usize,
    pub misses: usize,
    pub compiles: usize,
    pub compile_failures: usize,
    pub collected: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    compiles: AtomicUsize,
    compile_failures: AtomicUsize,
    collected: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct PassCache {
    list: Arc<Mutex<PassList>>,
    compiler: Box<dyn ShaderCompiler>,
    library: Box<dyn ShaderLibrary>,
    config: CacheConfig,
    clock: Box<dyn Clock>,
    last_gc: Mutex<Option<Duration>>,
    counters: Counters,
}

impl PassCache {
    pub fn new(
        compiler: impl ShaderCompiler + 'static,
        library: impl ShaderLibrary + 'static,
        config: CacheConfig,
    ) -> Self {
        Self {
            list: Arc::new(Mutex::new(PassList::default())),
            compiler: Box::new(compiler),
            library: Box::new(library),
            config,
            clock: Box::new(MonotonicClock::default()),
            last_gc: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Replace the time source used to rate-limit garbage collection.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Generate the code for `graph` and return the matching cached pass,
    /// creating it when no structurally equal pass exists.
    ///
    /// The graph is pruned and its uniform attributes finalized first.
    /// `finalize` receives the generated sources and is expected to fill in
    /// the descriptor's stage sources. Returns `None` when the matching pass
    /// previously failed to compile.
    pub fn generate_pass<F>(
        &self,
        material: &Material,
        graph: &mut NodeGraph,
        finalize: F,
    ) -> Option<PassHandle>
    where
        F: FnOnce(&Material, &mut CodegenOutput),
    {
        graph.prune_unused();
        graph.finalize_uniform_attrs();

        let (hash, mut output) =
            codegen::generate(material, graph, &self.config, self.library.as_ref());
        finalize(material, &mut output);
        self.register(hash, output.descriptor)
    }

    /// Find a pass equal to `descriptor` under `hash`, or insert a new one.
    ///
    /// Lookup, collision resolution and insertion share one lock acquisition,
    /// so concurrent callers with equal content always end up on one entry.
    pub fn register(&self, hash: u32, descriptor: ResourceDescriptor) -> Option<PassHandle> {
        let mut list = self.list.lock();
        let anchor = list.lookup(hash);
        if let Some(found) = anchor.and_then(|a| list.resolve_collision(a, &descriptor)) {
            bump(&self.counters.hits);
            let pass = list.get(found);
            if pass.is_failed() {
                debug!("[pass] {hash:#010x} hit a failed pass");
                return None;
            }
            debug!("[pass] {hash:#010x} cache hit");
            return Some(PassHandle::acquire_locked(&self.list, pass));
        }

        bump(&self.counters.misses);
        if anchor.is_some() {
            debug!("[pass] {hash:#010x} hash collision, adding variant");
        } else {
            debug!("[pass] {hash:#010x} new pass");
        }
        let pass = Arc::new(ShaderPass::new(hash, descriptor));
        let handle = PassHandle::acquire_locked(&self.list, &pass);
        list.insert_after(anchor, pass);
        Some(handle)
    }

    /// First pass stored under `hash`.
    pub fn lookup(&self, hash: u32) -> Option<Arc<ShaderPass>> {
        let list = self.list.lock();
        list.lookup(hash).map(|i| Arc::clone(list.get(i)))
    }

    /// Pass stored under `hash` whose descriptor equals `descriptor`.
    pub fn resolve_collision(
        &self,
        hash: u32,
        descriptor: &ResourceDescriptor,
    ) -> Option<Arc<ShaderPass>> {
        let list = self.list.lock();
        let anchor = list.lookup(hash)?;
        list.resolve_collision(anchor, descriptor)
            .map(|i| Arc::clone(list.get(i)))
    }

    /// Compile the pass once. Later calls return the recorded status without
    /// touching the backend.
    pub fn compile_pass(&self, handle: &PassHandle, name: &str) -> bool {
        let pass = &handle.pass;
        let shader = pass.compiled.get_or_init(|| {
            bump(&self.counters.compiles);
            match compile::compile_descriptor(self.compiler.as_ref(), &pass.descriptor, name) {
                Ok(shader) => Some(shader),
                Err(err) => {
                    bump(&self.counters.compile_failures);
                    compile::log_failure(name, &err);
                    None
                }
            }
        });
        shader.is_some()
    }

    pub fn shader<'a>(&self, handle: &'a PassHandle) -> Option<&'a dyn BackendShader> {
        handle.shader()
    }

    /// Remove every unreferenced pass, at most once per configured interval.
    /// Returns the number of passes removed.
    pub fn garbage_collect(&self) -> usize {
        let now = self.clock.now();
        {
            let mut last = self.last_gc.lock();
            if last.is_some_and(|t| now < t + self.config.gc_interval()) {
                return 0;
            }
            *last = Some(now);
        }

        let removed = self.list.lock().collect_garbage();
        if removed > 0 {
            self.counters.collected.fetch_add(removed, Ordering::Relaxed);
            debug!("[pass] garbage collected {removed} passes");
        }
        removed
    }

    /// Drop every pass regardless of references. Meant for shutdown.
    pub fn free_all(&self) {
        let freed = self.list.lock().clear();
        debug!("[pass] freed {freed} passes");
    }

    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_hash(&self, hash: u32) -> bool {
        self.list.lock().lookup(hash).is_some()
    }

    pub fn count_with_hash(&self, hash: u32) -> usize {
        self.list.lock().iter().filter(|p| p.hash == hash).count()
    }

    pub fn stats(&self) -> PassCacheStats {
        let c = &self.counters;
        PassCacheStats {
            passes: self.len(),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            compiles: c.compiles.load(Ordering::Relaxed),
            compile_failures: c.compile_failures.load(Ordering::Relaxed),
            collected: c.collected.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for PassCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
