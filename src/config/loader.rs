//! Configuration loading and snapshot publication
//!
//! [`FusionConfig`] is the explicit configuration object handed to the
//! pipeline. It owns the source paths and the currently installed
//! [`FusionTables`] snapshot.
//!
//! - A load is keyed by the resolved paths of its sources. Loading again with
//!   an unchanged key does nothing.
//! - Loads are serialized by one lock around parse-and-swap; readers take a
//!   cheap `Arc` of the current snapshot and never block a load.
//! - A failed load leaves the installed snapshot untouched. A load whose
//!   candidate tables a validator rejects counts as failed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::{info, warn};

use crate::error::ConfigError;

use super::tables::{FusionTables, TableInputs};

/// Environment variable naming the custom modern config
pub const CUSTOM_CONFIG_ENV: &str = "FUSION_CUSTOM_CONFIG";
/// Environment variable naming the built-in modern config
pub const BUILTIN_CONFIG_ENV: &str = "FUSION_BUILTIN_CONFIG";
/// Environment variable naming the legacy switch file
pub const SWITCH_FILE_ENV: &str = "FUSION_SWITCH_FILE";
/// Environment variable naming the license allow-list
pub const LICENSE_FILE_ENV: &str = "FUSION_LICENSE_FILE";

/// Paths of the configuration sources
///
/// Custom and legacy files are user supplied: when set they must exist.
/// The built-in config and the license allow-list are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    /// Custom modern JSON
    pub custom: Option<PathBuf>,
    /// Built-in modern JSON
    pub builtin: Option<PathBuf>,
    /// Legacy `name:on/off` file
    pub legacy: Option<PathBuf>,
    /// License allow-list
    pub license: Option<PathBuf>,
}

impl ConfigSources {
    /// No sources
    pub fn new() -> Self {
        Self::default()
    }

    /// Read source paths from the `FUSION_*` environment variables
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            custom: var(CUSTOM_CONFIG_ENV),
            builtin: var(BUILTIN_CONFIG_ENV),
            legacy: var(SWITCH_FILE_ENV),
            license: var(LICENSE_FILE_ENV),
        }
    }

    /// Set the custom config path
    pub fn with_custom(mut self, path: impl Into<PathBuf>) -> Self {
        self.custom = Some(path.into());
        self
    }

    /// Set the built-in config path
    pub fn with_builtin(mut self, path: impl Into<PathBuf>) -> Self {
        self.builtin = Some(path.into());
        self
    }

    /// Set the legacy switch file path
    pub fn with_legacy(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy = Some(path.into());
        self
    }

    /// Set the license allow-list path
    pub fn with_license(mut self, path: impl Into<PathBuf>) -> Self {
        self.license = Some(path.into());
        self
    }

    /// Resolve every path into the key identifying a load
    pub fn resolve(&self) -> LoadKey {
        LoadKey {
            custom: self.custom.as_deref().map(ResolvedPath::resolve),
            builtin: self.builtin.as_deref().map(ResolvedPath::resolve),
            legacy: self.legacy.as_deref().map(ResolvedPath::resolve),
            license: self.license.as_deref().map(ResolvedPath::resolve),
        }
    }
}

/// A source path after resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    /// Canonical path when the file exists, the configured path otherwise
    pub path: PathBuf,
    /// Whether the file existed at resolution time
    pub exists: bool,
}

impl ResolvedPath {
    fn resolve(path: &Path) -> Self {
        match fs::canonicalize(path) {
            Ok(canonical) => Self {
                exists: canonical.is_file(),
                path: canonical,
            },
            Err(_) => Self {
                path: path.to_path_buf(),
                exists: false,
            },
        }
    }

    fn label(&self) -> String {
        self.path.display().to_string()
    }
}

/// Identity of one configuration load
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LoadKey {
    /// Custom modern JSON
    pub custom: Option<ResolvedPath>,
    /// Built-in modern JSON
    pub builtin: Option<ResolvedPath>,
    /// Legacy switch file
    pub legacy: Option<ResolvedPath>,
    /// License allow-list
    pub license: Option<ResolvedPath>,
}

/// What [`FusionConfig::ensure_loaded`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Sources changed; new tables installed
    Reloaded,
    /// Key unchanged; nothing parsed
    Unchanged,
}

#[derive(Debug, Default)]
struct LoaderState {
    sources: ConfigSources,
    installed: Option<LoadKey>,
    generation: u64,
}

/// Explicit configuration object shared by pipelines
pub struct FusionConfig {
    state: Mutex<LoaderState>,
    tables: ArcSwap<FusionTables>,
    forbidden_closed: FxHashSet<String>,
    parse_count: AtomicUsize,
}

impl std::fmt::Debug for FusionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionConfig")
            .field("generation", &self.tables.load().generation)
            .field("forbidden_closed", &self.forbidden_closed.len())
            .field("parse_count", &self.parse_count())
            .finish()
    }
}

impl FusionConfig {
    /// Create with the given sources; nothing is loaded yet
    pub fn new(sources: ConfigSources) -> Self {
        Self {
            state: Mutex::new(LoaderState {
                sources,
                ..Default::default()
            }),
            tables: ArcSwap::from_pointee(FusionTables::default()),
            forbidden_closed: FxHashSet::default(),
            parse_count: AtomicUsize::new(0),
        }
    }

    /// Create from the `FUSION_*` environment variables
    pub fn from_env() -> Self {
        Self::new(ConfigSources::from_env())
    }

    /// Create with already parsed tables (no sources)
    pub fn from_tables(mut tables: FusionTables) -> Self {
        let config = Self::new(ConfigSources::new());
        let mut state = config.state.lock();
        state.generation = 1;
        state.installed = Some(LoadKey::default());
        tables.generation = 1;
        config.tables.store(Arc::new(tables));
        drop(state);
        config
    }

    /// Add built-in forbidden-closed pass names
    pub fn with_forbidden_closed<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.forbidden_closed.extend(names.into_iter().map(Into::into));
        self
    }

    /// Built-in forbidden-closed pass names
    pub fn forbidden_closed(&self) -> &FxHashSet<String> {
        &self.forbidden_closed
    }

    /// Replace the source paths; takes effect on the next load
    pub fn set_sources(&self, sources: ConfigSources) {
        self.state.lock().sources = sources;
    }

    /// Current source paths
    pub fn sources(&self) -> ConfigSources {
        self.state.lock().sources.clone()
    }

    /// Currently installed tables
    pub fn tables(&self) -> Arc<FusionTables> {
        self.tables.load_full()
    }

    /// Number of parse runs performed so far
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::Relaxed)
    }

    /// Load when the resolved sources changed since the last successful load
    pub fn ensure_loaded(&self) -> Result<LoadOutcome, ConfigError> {
        self.ensure_loaded_with(|_| Ok(()))
    }

    /// Like [`ensure_loaded`](Self::ensure_loaded), but new tables are
    /// installed only if `validate` accepts them
    ///
    /// `validate` sees the candidate tables with their would-be generation.
    /// It runs under the load lock. On error nothing is installed and the
    /// next call parses again.
    pub fn ensure_loaded_with<F>(&self, validate: F) -> Result<LoadOutcome, ConfigError>
    where
        F: FnOnce(&FusionTables) -> Result<(), ConfigError>,
    {
        let mut state = self.state.lock();
        let key = state.sources.resolve();
        if state.installed.as_ref() == Some(&key) {
            return Ok(LoadOutcome::Unchanged);
        }
        self.load_locked(&mut state, key, validate)?;
        Ok(LoadOutcome::Reloaded)
    }

    /// Load unconditionally
    pub fn reload(&self) -> Result<(), ConfigError> {
        let mut state = self.state.lock();
        let key = state.sources.resolve();
        self.load_locked(&mut state, key, |_| Ok(()))
    }

    fn load_locked<F>(&self, state: &mut LoaderState, key: LoadKey, validate: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&FusionTables) -> Result<(), ConfigError>,
    {
        self.parse_count.fetch_add(1, Ordering::Relaxed);

        let mut tables = read_tables(&key)?;
        tables.generation = state.generation + 1;
        validate(&tables)?;
        state.generation = tables.generation;

        info!(
            generation = tables.generation,
            graph_switches = tables.switches.graph.len(),
            buffer_switches = tables.switches.buffer.len(),
            graph_priorities = tables.priorities.graph.len(),
            buffer_priorities = tables.priorities.buffer.len(),
            exceptional = tables.exceptional.len(),
            "installed fusion configuration"
        );

        self.tables.store(Arc::new(tables));
        state.installed = Some(key);
        Ok(())
    }
}

fn read_required(source: &ResolvedPath) -> Result<String, ConfigError> {
    if !source.exists {
        return Err(ConfigError::Missing {
            file: source.label(),
        });
    }
    fs::read_to_string(&source.path).map_err(|err| ConfigError::Io {
        file: source.label(),
        source: err,
    })
}

fn read_optional(source: &ResolvedPath) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(&source.path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %source.path.display(), "optional configuration file not found, using defaults");
            Ok(None)
        }
        Err(err) => Err(ConfigError::Io {
            file: source.label(),
            source: err,
        }),
    }
}

fn read_tables(key: &LoadKey) -> Result<FusionTables, ConfigError> {
    let legacy = read_source(key.legacy.as_ref(), true)?;
    let custom = read_source(key.custom.as_ref(), true)?;
    let builtin = read_source(key.builtin.as_ref(), false)?;
    let license = read_source(key.license.as_ref(), false)?;

    FusionTables::parse(TableInputs {
        legacy: as_input(&legacy),
        custom: as_input(&custom),
        builtin: as_input(&builtin),
        license: as_input(&license),
    })
}

// Text and error label of one source, `None` when unset or optional and absent
fn read_source(source: Option<&ResolvedPath>, required: bool) -> Result<Option<(String, String)>, ConfigError> {
    let Some(src) = source else {
        return Ok(None);
    };
    let text = if required {
        Some(read_required(src)?)
    } else {
        read_optional(src)?
    };
    Ok(text.map(|text| (text, src.label())))
}

fn as_input(source: &Option<(String, String)>) -> Option<(&str, &str)> {
    source.as_ref().map(|(text, label)| (text.as_str(), label.as_str()))
}
