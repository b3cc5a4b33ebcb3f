//! Named routes from operation keys to module loaders and executors.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};
use warmpath_utils::suggest::find_best_match;

use crate::error::{OptimizerError, Result};
use crate::runtime::{ExecutionOptimizer, Handler, ModuleRef, Payload};

pub type Loader = Arc<dyn Fn() -> anyhow::Result<ModuleRef> + Send + Sync>;
pub type Executor = Arc<dyn Fn(&ModuleRef, &Payload) -> anyhow::Result<Payload> + Send + Sync>;

/// How one operation key is served.
#[derive(Clone)]
pub struct Route {
    pub module: String,
    loader: Loader,
    executor: Executor,
}

impl Route {
    pub fn new<L, E>(module: &str, loader: L, executor: E) -> Self
    where
        L: Fn() -> anyhow::Result<ModuleRef> + Send + Sync + 'static,
        E: Fn(&ModuleRef, &Payload) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        Self {
            module: module.to_string(),
            loader: Arc::new(loader),
            executor: Arc::new(executor),
        }
    }
}

/// Routing front end for an [`ExecutionOptimizer`].
pub struct Dispatcher {
    routes: BTreeMap<String, Route>,
    optimizer: ExecutionOptimizer,
}

impl Dispatcher {
    pub fn new(optimizer: ExecutionOptimizer) -> Self {
        Self {
            routes: BTreeMap::new(),
            optimizer,
        }
    }

    /// Register or replace the route for `key`.
    pub fn route<L, E>(&mut self, key: &str, module: &str, loader: L, executor: E) -> &mut Self
    where
        L: Fn() -> anyhow::Result<ModuleRef> + Send + Sync + 'static,
        E: Fn(&ModuleRef, &Payload) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        self.routes
            .insert(key.to_string(), Route::new(module, loader, executor));
        self
    }

    pub fn optimizer(&self) -> &ExecutionOptimizer {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut ExecutionOptimizer {
        &mut self.optimizer
    }

    fn resolve(&self, key: &str) -> Result<Route> {
        self.routes.get(key).cloned().ok_or_else(|| {
            let suggestion = find_best_match(key, self.routes.keys());
            OptimizerError::UnknownOperation {
                key: key.to_string(),
                suggestion,
            }
        })
    }

    /// Look up `key` and run it through the optimizer.
    pub fn resolve_and_execute(&mut self, key: &str, args: &Payload) -> Result<Payload> {
        let route = self.resolve(key)?;
        let loader = Arc::clone(&route.loader);
        let executor = Arc::clone(&route.executor);
        self.optimizer.execute(
            key,
            &route.module,
            move || loader(),
            move |module: &ModuleRef, args: &Payload| executor(module, args),
            args,
        )
    }

    /// Load the modules behind `keys` and place their handlers in the fast
    /// path ahead of traffic. Returns how many keys were newly cached.
    pub fn prewarm<I, S>(&mut self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cached = 0;
        for key in keys {
            let key = key.as_ref();
            let Some(route) = self.routes.get(key).cloned() else {
                warn!(key, "prewarm skipped unknown operation");
                continue;
            };
            if self.optimizer.has_fast_path(key) {
                continue;
            }

            let module = self.optimizer.preload(&route.module, || (route.loader)())?;
            let executor = Arc::clone(&route.executor);
            let bound: Handler = Arc::new(move |args: &Payload| executor(&module, args));
            self.optimizer
                .register_fast_path(key, bound, Some(&route.module));
            debug!(key, module = route.module.as_str(), "operation prewarmed");
            cached += 1;
        }
        Ok(cached)
    }
}
