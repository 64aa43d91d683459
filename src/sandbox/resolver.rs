//! Module resolution against the virtual file tree.
//!
//! [`ModuleResolver`] is a pure function of `(base, specifier, tree)`: it
//! maps a specifier to one canonical path and answers with the source stored
//! there. The engine-facing adapters at the bottom of this file plug it into
//! QuickJS and keep a note of misses so a failed import can be reported as
//! `moduleNotFound`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rquickjs::loader::{Loader, Resolver};
use rquickjs::module::Declared;
use rquickjs::{Ctx, Module};
use thiserror::Error;

use crate::sandbox::shims::BRIDGE_SPECIFIER;
use crate::sandbox::vfs::{VirtualFs, NODE_MODULES};

/// Module name given to the top-level evaluated code. Relative imports from
/// it resolve against `/src`.
pub const ENTRY_MODULE: &str = "/src/index.js";

/// An import that matched nothing in the virtual tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Module '{specifier}' not installed or available")]
pub struct ModuleNotFound {
    /// The specifier exactly as written by the importer.
    pub specifier: String,
}

impl ModuleNotFound {
    fn new(specifier: &str) -> Self {
        Self {
            specifier: specifier.to_string(),
        }
    }
}

/// Resolves specifiers to module source in a [`VirtualFs`].
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    vfs: Arc<VirtualFs>,
}

impl ModuleResolver {
    /// Create a resolver over a finished tree.
    pub fn new(vfs: Arc<VirtualFs>) -> Self {
        Self { vfs }
    }

    /// Map `specifier`, imported from the module named `base`, to the
    /// canonical path of a leaf.
    ///
    /// - `node:` is stripped.
    /// - `./x` and `../x` join onto the directory of `base`; `/x` is used
    ///   as written.
    /// - bare names look under `/node_modules`, first for an exact leaf and
    ///   then for `<name>/index.js`.
    ///
    /// A path that is missing or names a directory is not found.
    pub fn resolve(&self, base: &str, specifier: &str) -> Result<String, ModuleNotFound> {
        candidates(base, specifier)
            .into_iter()
            .find(|path| self.vfs.is_file(path))
            .ok_or_else(|| ModuleNotFound::new(specifier))
    }

    /// Source text of a resolved module.
    pub fn source(&self, path: &str) -> Result<&str, ModuleNotFound> {
        self.vfs.read(path).ok_or_else(|| ModuleNotFound::new(path))
    }

    /// The tree this resolver reads from.
    pub fn vfs(&self) -> &VirtualFs {
        &self.vfs
    }
}

/// Canonical paths a specifier may denote, in lookup order.
pub fn candidates(base: &str, specifier: &str) -> Vec<String> {
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);

    if specifier.starts_with("./") || specifier.starts_with("../") {
        let dir = base.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        return vec![fold(&format!("{dir}/{specifier}"))];
    }
    if specifier.starts_with('/') {
        return vec![fold(specifier)];
    }

    let package = fold(&format!("/{NODE_MODULES}/{specifier}"));
    let index = format!("{package}/index.js");
    vec![package, index]
}

/// Collapse `.`, `..` and empty segments into an absolute path.
fn fold(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    format!("/{}", out.join("/"))
}

/// Specifiers that failed to resolve during the current evaluation.
#[derive(Debug, Clone, Default)]
pub struct ResolutionLog {
    misses: Arc<Mutex<Vec<String>>>,
}

impl ResolutionLog {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.misses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(&self, specifier: &str) {
        self.lock().push(specifier.to_string());
    }

    /// Forget all misses.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// The most recent miss whose [`ModuleNotFound`] text appears verbatim
    /// in `message`.
    pub fn miss_mentioned_in(&self, message: &str) -> Option<String> {
        self.lock()
            .iter()
            .rev()
            .find(|specifier| message.contains(&ModuleNotFound::new(specifier).to_string()))
            .cloned()
    }

    /// All misses, oldest first.
    pub fn misses(&self) -> Vec<String> {
        self.lock().clone()
    }
}

/// QuickJS resolver hook.
pub(crate) struct EngineResolver {
    resolver: ModuleResolver,
    log: ResolutionLog,
}

impl EngineResolver {
    pub(crate) fn new(resolver: ModuleResolver, log: ResolutionLog) -> Self {
        Self { resolver, log }
    }
}

impl Resolver for EngineResolver {
    fn resolve<'js>(&mut self, _ctx: &Ctx<'js>, base: &str, name: &str) -> rquickjs::Result<String> {
        if name == BRIDGE_SPECIFIER {
            return Ok(name.to_string());
        }
        match self.resolver.resolve(base, name) {
            Ok(path) => {
                tracing::trace!(base, specifier = name, path = %path, "module resolved");
                Ok(path)
            }
            Err(err) => {
                tracing::debug!(base, specifier = name, "module not found");
                self.log.record(name);
                Err(rquickjs::Error::new_resolving_message(
                    base,
                    name,
                    err.to_string(),
                ))
            }
        }
    }
}

/// QuickJS loader hook.
pub(crate) struct EngineLoader {
    resolver: ModuleResolver,
}

impl EngineLoader {
    pub(crate) fn new(resolver: ModuleResolver) -> Self {
        Self { resolver }
    }
}

impl Loader for EngineLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Module<'js, Declared>> {
        let source = self
            .resolver
            .source(name)
            .map_err(|err| rquickjs::Error::new_loading_message(name, err.to_string()))?;
        Module::declare(ctx.clone(), name, source)
    }
}
