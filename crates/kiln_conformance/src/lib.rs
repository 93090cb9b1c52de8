//! End-to-end test helpers for the Kiln asset compiler.
//!
//! Provides a scripted converter whose behavior (delay, failure, panic,
//! out-of-memory) is chosen per test, an on-disk project fixture, and
//! logging setup for integration tests.

#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use kiln_compile::{
    Compiler, ConvertContext, Converter, ConverterRegistry, FileRecord, Orchestrator, ProcessError,
};
use kiln_config::KilnConfig;

/// What a [`ScriptedConverter`] does with each file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Write one output per file.
    Succeed,
    /// Fail every file with the given reason.
    Fail(String),
    /// Fail files whose name contains the given text; convert the rest.
    FailMatching(String),
    /// Panic on every file.
    Panic,
    /// Report out of memory for the first `n` calls made with more than one
    /// thread; convert otherwise.
    OutOfMemoryWhenParallel(usize),
    /// Report out of memory on every call.
    AlwaysOutOfMemory,
}

/// Counters shared by a scripted converter and its compilers.
#[derive(Debug, Default)]
pub struct ScriptStats {
    calls: AtomicUsize,
    compilers: AtomicUsize,
    parallel_calls: AtomicUsize,
    oom_reported: AtomicUsize,
}

impl ScriptStats {
    /// Files handed to any compiler.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Compiler instances created.
    pub fn compilers(&self) -> usize {
        self.compilers.load(Ordering::SeqCst)
    }

    /// Calls made with more than one thread.
    pub fn parallel_calls(&self) -> usize {
        self.parallel_calls.load(Ordering::SeqCst)
    }

    /// Out-of-memory errors reported.
    pub fn oom_reported(&self) -> usize {
        self.oom_reported.load(Ordering::SeqCst)
    }
}

struct Script {
    behavior: Behavior,
    delay: Duration,
    output_ext: String,
    stats: Arc<ScriptStats>,
}

/// A converter scripted by the test that registers it.
///
/// Successful conversions copy the source bytes to `<stem>.<output_ext>` in
/// the target directory.
pub struct ScriptedConverter {
    name: String,
    extensions: Vec<&'static str>,
    multithreaded: bool,
    cacheable: bool,
    script: Arc<Script>,
}

impl ScriptedConverter {
    /// A single-threaded, cacheable converter that always succeeds.
    pub fn new(name: &str, extensions: &[&'static str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.to_vec(),
            multithreaded: false,
            cacheable: true,
            script: Arc::new(Script {
                behavior: Behavior::Succeed,
                delay: Duration::ZERO,
                output_ext: "out".to_string(),
                stats: Arc::new(ScriptStats::default()),
            }),
        }
    }

    /// Allows parallel compilers.
    pub fn multithreaded(mut self) -> Self {
        self.multithreaded = true;
        self
    }

    /// Keeps outputs out of the cache.
    pub fn uncacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }

    /// Sleeps this long for every file.
    pub fn delay(self, delay: Duration) -> Self {
        self.rescript(|s| s.delay = delay)
    }

    /// Sets the per-file behavior.
    pub fn behavior(self, behavior: Behavior) -> Self {
        self.rescript(|s| s.behavior = behavior)
    }

    /// Sets the extension of produced files.
    pub fn output_ext(self, ext: &str) -> Self {
        self.rescript(|s| s.output_ext = ext.to_string())
    }

    /// Counters observable after the converter moved into a registry.
    pub fn stats(&self) -> Arc<ScriptStats> {
        Arc::clone(&self.script.stats)
    }

    fn rescript(mut self, edit: impl FnOnce(&mut Script)) -> Self {
        let current = &self.script;
        let mut script = Script {
            behavior: current.behavior.clone(),
            delay: current.delay,
            output_ext: current.output_ext.clone(),
            stats: Arc::clone(&current.stats),
        };
        edit(&mut script);
        self.script = Arc::new(script);
        self
    }
}

impl Converter for ScriptedConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> &[&str] {
        &self.extensions
    }

    fn supports_multithreading(&self) -> bool {
        self.multithreaded
    }

    fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    fn create_compiler(&self) -> Box<dyn Compiler> {
        self.script.stats.compilers.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedCompiler {
            script: Arc::clone(&self.script),
        })
    }
}

struct ScriptedCompiler {
    script: Arc<Script>,
}

impl Compiler for ScriptedCompiler {
    fn process(&mut self, ctx: &mut ConvertContext<'_>) -> Result<(), ProcessError> {
        let script = &self.script;
        let stats = &script.stats;
        stats.calls.fetch_add(1, Ordering::SeqCst);
        let parallel = ctx.threads() > 1;
        if parallel {
            stats.parallel_calls.fetch_add(1, Ordering::SeqCst);
        }
        if !script.delay.is_zero() {
            std::thread::sleep(script.delay);
        }

        match &script.behavior {
            Behavior::Succeed => {}
            Behavior::Fail(reason) => return Err(ProcessError::failed(reason.clone())),
            Behavior::FailMatching(text) => {
                if ctx.record().file_name().contains(text.as_str()) {
                    return Err(ProcessError::failed(format!("scripted failure for {text}")));
                }
            }
            Behavior::Panic => panic!("scripted panic in {}", ctx.record().file_name()),
            Behavior::OutOfMemoryWhenParallel(limit) => {
                let took_slot = parallel
                    && stats
                        .oom_reported
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                            (n < *limit).then_some(n + 1)
                        })
                        .is_ok();
                if took_slot {
                    return Err(ProcessError::OutOfMemory);
                }
            }
            Behavior::AlwaysOutOfMemory => {
                stats.oom_reported.fetch_add(1, Ordering::SeqCst);
                return Err(ProcessError::OutOfMemory);
            }
        }

        let source = ctx.source_path();
        let bytes = std::fs::read(&source).map_err(|e| ProcessError::failed(e.to_string()))?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = ctx.target_dir();
        std::fs::create_dir_all(&dir).map_err(|e| ProcessError::failed(e.to_string()))?;
        let output = dir.join(format!("{stem}.{}", script.output_ext));
        std::fs::write(&output, bytes).map_err(|e| ProcessError::failed(e.to_string()))?;
        ctx.add_output(&output);
        Ok(())
    }
}

/// A temporary project: `src/` for sources, `out/` for outputs, and
/// `kiln.toml` settings given per test.
pub struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    /// Creates an empty project.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        Self { dir }
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Source root.
    pub fn src(&self) -> PathBuf {
        self.root().join("src")
    }

    /// Output root.
    pub fn out(&self) -> PathBuf {
        self.root().join("out")
    }

    /// Writes a source file and returns its record.
    pub fn source(&self, relative: &str, content: &str) -> FileRecord {
        let path = self.src().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        self.record(relative)
    }

    /// Record for a source, whether or not it exists.
    pub fn record(&self, relative: &str) -> FileRecord {
        FileRecord::new(self.src(), relative, self.out())
    }

    /// Builds an orchestrator from `toml` with the given converters.
    pub fn orchestrator(&self, toml: &str, converters: Vec<ScriptedConverter>) -> Orchestrator {
        let config = config(toml);
        let mut registry = ConverterRegistry::new();
        for converter in converters {
            registry.register(converter);
        }
        Orchestrator::new(&config, self.root(), registry).unwrap()
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a `kiln.toml` text, panicking on errors.
pub fn config(toml: &str) -> KilnConfig {
    kiln_config::load_config_from_str(toml).unwrap()
}

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
