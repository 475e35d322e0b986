//! The register: hooks, configuration, cache and transform invocation behind
//! one explicit `configure()` / `teardown()` lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use transload_cache::{CacheEntry, CacheStore, Scheduler};

use crate::RegisterError;
use crate::config::{RegisterOptions, ResolvedConfig};
use crate::env::EnvSettings;
use crate::hook::{HookManager, LoadHandler, LoaderHook, load_handler};
use crate::invalidation::Lookup;
use crate::key::CacheKey;
use crate::transform::{RetrievedSourceMap, SourceMapRegistry, TransformEngine, TransformInvoker};

/// State reachable from installed interception handlers.
struct Shared {
    config: RwLock<Arc<ResolvedConfig>>,
    store: CacheStore,
    scheduler: Arc<dyn Scheduler>,
    invoker: TransformInvoker,
    env: EnvSettings,
}

impl Shared {
    fn config(&self) -> Arc<ResolvedConfig> {
        self.config.read().clone()
    }

    fn compile(&self, path: &Path, inline: Option<&str>) -> Result<String, RegisterError> {
        let config = self.config();
        let label = config.label();
        let resolved = self.invoker.resolve(&config.transform, path)?;

        let mut record = None;
        if config.cache_enabled && self.store.is_enabled() {
            // relocatable keys must not see the absolute filename
            let key_options = if config.mode.is_relocatable() {
                &config.transform
            } else {
                &resolved
            };
            let key = CacheKey::build(
                key_options,
                path,
                &config.mode,
                self.invoker.engine().version(),
                self.env.discriminator.as_deref(),
            )?;
            let stamp = config.mode.current_stamp(path)?;

            match config.mode.check(self.store.lookup(key.as_str()), &stamp) {
                Lookup::Hit(entry) => {
                    config
                        .reporter
                        .debug(label, &format!("from cache {}", path.display()));
                    self.invoker.register_map(path, entry.map);
                    return Ok(entry.code);
                }
                Lookup::Stale => config.reporter.debug(
                    label,
                    &format!("cache miss due to {} {}", config.mode.name(), path.display()),
                ),
                Lookup::Absent => {}
            }
            record = Some((key, stamp));
        }

        config
            .reporter
            .log(label, &format!("transforming {}", path.display()));
        let output = self.invoker.invoke(resolved, path, inline)?;

        if let Some((key, stamp)) = record {
            self.store.put(
                key.into_string(),
                CacheEntry::new(output.code.clone(), output.map, stamp),
            );
            self.store.schedule_flush(self.scheduler.as_ref());
        }

        Ok(output.code)
    }
}

/// Intercepts module loading for a set of extensions and serves transformed,
/// cached code in place of the original source.
pub struct Register<H: LoaderHook> {
    host: H,
    hooks: HookManager,
    shared: Arc<Shared>,
    torn_down: bool,
}

impl<H: LoaderHook> Register<H> {
    /// Creates a register configured from the process environment and hooks
    /// the engine's default extensions.
    ///
    /// The cache store is loaded here; a missing or corrupt store starts empty.
    pub fn new(
        host: H,
        engine: Arc<dyn TransformEngine>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, RegisterError> {
        let env = EnvSettings::from_env();
        let store = if env.disable_cache {
            CacheStore::disabled(env.cache_path())
        } else {
            CacheStore::open(env.cache_path())
        };
        let cwd = std::env::current_dir()?;
        Ok(Self::with_parts(host, engine, scheduler, store, env, cwd))
    }

    /// Creates a register from explicit parts and hooks the engine's default extensions.
    pub fn with_parts(
        host: H,
        engine: Arc<dyn TransformEngine>,
        scheduler: Arc<dyn Scheduler>,
        store: CacheStore,
        env: EnvSettings,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        if env.disable_cache {
            store.disable();
        }
        let extensions = engine.extensions();

        let mut register = Self {
            host,
            hooks: HookManager::new(),
            shared: Arc::new(Shared {
                config: RwLock::new(Arc::new(ResolvedConfig::new(cwd))),
                store,
                scheduler,
                invoker: TransformInvoker::new(engine),
                env,
            }),
            torn_down: false,
        };
        register.hook_extensions(&extensions);
        register
    }

    /// Applies `options` on top of the current configuration.
    ///
    /// On error the previous configuration stays in effect.
    pub fn configure(&mut self, options: RegisterOptions) -> Result<(), RegisterError> {
        let next = self.shared.config().merge(&options)?;

        if !next.cache_enabled {
            self.shared.store.disable();
        }
        *self.shared.config.write() = Arc::new(next);

        if let Some(extensions) = &options.extensions {
            self.hook_extensions(extensions);
        }
        Ok(())
    }

    /// Restores all intercepted extensions, then intercepts exactly `extensions`.
    pub fn hook_extensions<S: AsRef<str>>(&mut self, extensions: &[S]) {
        let config = self.shared.config();
        let listed: Vec<&str> = extensions.iter().map(AsRef::as_ref).collect();
        config
            .reporter
            .debug(config.label(), &format!("extensions {}", listed.join(",")));

        let shared = &self.shared;
        self.hooks.install(&mut self.host, extensions, |_, delegate| {
            interception_handler(shared.clone(), delegate)
        });
    }

    /// Returns transformed code for `path`, from the cache when still valid.
    ///
    /// `inline` replaces the file's text as the engine's input.
    pub fn compile(&self, path: &Path, inline: Option<&str>) -> Result<String, RegisterError> {
        self.shared.compile(path, inline)
    }

    /// Source map recorded for a compiled file.
    pub fn retrieve_source_map(&self, source: &Path) -> Option<RetrievedSourceMap> {
        self.shared.invoker.source_maps().retrieve(source)
    }

    /// Registry handed to stack-trace resolution.
    pub fn source_maps(&self) -> Arc<SourceMapRegistry> {
        self.shared.invoker.source_maps().clone()
    }

    pub fn config(&self) -> Arc<ResolvedConfig> {
        self.shared.config()
    }

    pub fn store(&self) -> &CacheStore {
        &self.shared.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Extensions currently under interception.
    pub fn hooked_extensions(&self) -> Vec<String> {
        self.hooks.hooked().map(str::to_string).collect()
    }

    /// Puts every displaced handler back and flushes the cache.
    ///
    /// Flush failures are logged, not returned.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.hooks.restore_all(&mut self.host);
        self.shared.store.flush();
    }

    /// Tears down and hands the host back.
    pub fn into_host(mut self) -> H
    where
        H: Default,
    {
        self.teardown();
        std::mem::take(&mut self.host)
    }
}

impl<H: LoaderHook> Drop for Register<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn interception_handler(shared: Arc<Shared>, delegate: LoadHandler) -> LoadHandler {
    load_handler(move |module, path, inline| {
        let config = shared.config();
        if config.filter.should_ignore(path) {
            config
                .reporter
                .debug(config.label(), &format!("ignoring {}", path.display()));
            return delegate(module, path, inline);
        }

        config
            .reporter
            .debug(config.label(), &format!("loading {}", path.display()));
        let code = shared.compile(path, inline)?;
        module.compile(&code, path)
    })
}
