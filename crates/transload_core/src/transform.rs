//! Transform engine abstraction and invocation.
//!
//! The engine itself is external. This module defines the contract it must
//! meet, builds per-call requests, and keeps source maps for stack-trace
//! resolution.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::TransformOptions;

/// Extensions hooked when the engine does not name its own.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".es6", ".es", ".mjs"];

/// Errors reported by a transform engine.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The engine rejected the source, e.g. a syntax error.
    #[error("{path}: {message}")]
    Rejected { path: PathBuf, message: String },

    /// The engine could not run.
    #[error("Engine error: {0}")]
    Engine(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransformError {
    /// Creates a rejection for `path`.
    pub fn rejected(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Rejected {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an engine error.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }
}

/// Which source maps the engine should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    None,
    Inline,
    Separate,
    Both,
}

/// One call into the transform engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    /// File being transformed.
    pub filename: PathBuf,
    /// Resolved options, including the `filename` override.
    pub options: TransformOptions,
    /// Whether the engine may look for configuration files near `filename`.
    pub config_discovery: bool,
    /// Requested source maps.
    pub source_maps: SourceMapMode,
    /// Whether the syntax tree should be kept in the output.
    pub retain_ast: bool,
}

impl TransformRequest {
    /// A request with the register's fixed overrides: configuration was already
    /// resolved, so no discovery; inline and separate source maps; no syntax tree.
    pub fn new(filename: impl Into<PathBuf>, options: TransformOptions) -> Self {
        Self {
            filename: filename.into(),
            options,
            config_discovery: false,
            source_maps: SourceMapMode::Both,
            retain_ast: false,
        }
    }
}

/// What the engine returns.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    /// Generated code.
    pub code: String,
    /// Source map, if the engine produced one.
    pub map: Option<Value>,
}

/// An external compiler from one source dialect to another.
pub trait TransformEngine: Send + Sync {
    /// Version identifier folded into cache keys.
    fn version(&self) -> &str;

    /// Extensions intercepted by default.
    fn extensions(&self) -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    }

    /// Resolves per-file options, e.g. merging configuration files found near
    /// the file. `options` already carries the `filename` override.
    fn resolve_options(
        &self,
        options: TransformOptions,
        _filename: &Path,
    ) -> Result<TransformOptions, TransformError> {
        Ok(options)
    }

    /// Transforms `source` as the content of `request.filename`.
    fn transform(
        &self,
        source: &str,
        request: &TransformRequest,
    ) -> Result<TransformOutput, TransformError>;

    /// Transforms the file named by the request, reading it from disk.
    fn transform_file(
        &self,
        request: &TransformRequest,
    ) -> Result<TransformOutput, TransformError> {
        let source = fs::read_to_string(&request.filename)?;
        self.transform(&source, request)
    }
}

/// A source map handed to a stack-trace resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedSourceMap {
    /// Where the map came from. Always `None`; maps are held in memory.
    pub url: Option<String>,
    pub map: Value,
}

/// Source maps of compiled files, keyed by file path.
#[derive(Debug, Default)]
pub struct SourceMapRegistry {
    maps: RwLock<HashMap<PathBuf, Value>>,
}

impl SourceMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the map for `path`. `None` forgets any previous map.
    pub fn register(&self, path: &Path, map: Option<Value>) {
        let mut maps = self.maps.write();
        match map {
            Some(map) => {
                maps.insert(path.to_path_buf(), map);
            }
            None => {
                maps.remove(path);
            }
        }
    }

    /// Looks up the map for a source file.
    pub fn retrieve(&self, source: &Path) -> Option<RetrievedSourceMap> {
        self.maps.read().get(source).map(|map| RetrievedSourceMap {
            url: None,
            map: map.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.maps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().is_empty()
    }
}

/// Normalizes calls into the engine and records resulting source maps.
#[derive(Clone)]
pub struct TransformInvoker {
    engine: Arc<dyn TransformEngine>,
    maps: Arc<SourceMapRegistry>,
}

impl TransformInvoker {
    pub fn new(engine: Arc<dyn TransformEngine>) -> Self {
        Self {
            engine,
            maps: Arc::new(SourceMapRegistry::new()),
        }
    }

    pub fn engine(&self) -> &dyn TransformEngine {
        self.engine.as_ref()
    }

    pub fn source_maps(&self) -> &Arc<SourceMapRegistry> {
        &self.maps
    }

    /// Per-file options: a copy of `base` with the `filename` override, resolved by the engine.
    pub fn resolve(
        &self,
        base: &TransformOptions,
        path: &Path,
    ) -> Result<TransformOptions, TransformError> {
        self.engine.resolve_options(base.with_filename(path), path)
    }

    /// Runs the engine on `inline` text if given, otherwise on the file itself,
    /// and registers the resulting source map under `path`.
    pub fn invoke(
        &self,
        resolved: TransformOptions,
        path: &Path,
        inline: Option<&str>,
    ) -> Result<TransformOutput, TransformError> {
        let request = TransformRequest::new(path, resolved);
        let output = match inline {
            Some(source) => self.engine.transform(source, &request)?,
            None => self.engine.transform_file(&request)?,
        };
        self.register_map(path, output.map.clone());
        Ok(output)
    }

    /// Records a source map for `path`.
    pub fn register_map(&self, path: &Path, map: Option<Value>) {
        self.maps.register(path, map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingEngine {
        requests: Mutex<Vec<(String, TransformRequest)>>,
    }

    impl TransformEngine for RecordingEngine {
        fn version(&self) -> &str {
            "0.0.1"
        }

        fn transform(
            &self,
            source: &str,
            request: &TransformRequest,
        ) -> Result<TransformOutput, TransformError> {
            self.requests
                .lock()
                .push((source.to_string(), request.clone()));
            if source.contains("syntax error") {
                return Err(TransformError::rejected(&request.filename, "unexpected token"));
            }
            Ok(TransformOutput {
                code: source.to_uppercase(),
                map: Some(json!({ "version": 3, "sources": [request.filename] })),
            })
        }
    }

    #[test]
    fn test_request_forces_overrides() {
        let request = TransformRequest::new("/work/a.js", TransformOptions::new());
        assert!(!request.config_discovery);
        assert_eq!(request.source_maps, SourceMapMode::Both);
        assert!(!request.retain_ast);
    }

    #[test]
    fn test_resolve_adds_filename_without_touching_base() {
        let invoker = TransformInvoker::new(Arc::new(RecordingEngine::default()));
        let base = TransformOptions::new().with("compact", true);

        let resolved = invoker.resolve(&base, Path::new("/work/a.js")).unwrap();

        assert_eq!(resolved.get("filename"), Some(&json!("/work/a.js")));
        assert_eq!(resolved.get("compact"), Some(&json!(true)));
        assert_eq!(base.get("filename"), None);
    }

    #[test]
    fn test_invoke_inline_text() {
        let engine = Arc::new(RecordingEngine::default());
        let invoker = TransformInvoker::new(engine.clone());

        let output = invoker
            .invoke(TransformOptions::new(), Path::new("/virtual/a.js"), Some("let a;"))
            .unwrap();

        assert_eq!(output.code, "LET A;");
        let requests = engine.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "let a;");
        assert_eq!(requests[0].1.filename, PathBuf::from("/virtual/a.js"));
    }

    #[test]
    fn test_invoke_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.js");
        fs::write(&path, "from disk").unwrap();
        let invoker = TransformInvoker::new(Arc::new(RecordingEngine::default()));

        let output = invoker.invoke(TransformOptions::new(), &path, None).unwrap();

        assert_eq!(output.code, "FROM DISK");
    }

    #[test]
    fn test_invoke_registers_source_map() {
        let invoker = TransformInvoker::new(Arc::new(RecordingEngine::default()));
        let path = Path::new("/virtual/a.js");

        invoker.invoke(TransformOptions::new(), path, Some("x")).unwrap();

        let retrieved = invoker.source_maps().retrieve(path).unwrap();
        assert_eq!(retrieved.url, None);
        assert_eq!(retrieved.map["version"], json!(3));
        assert!(invoker.source_maps().retrieve(Path::new("/other.js")).is_none());
    }

    #[test]
    fn test_invoke_propagates_rejection() {
        let invoker = TransformInvoker::new(Arc::new(RecordingEngine::default()));
        let path = Path::new("/virtual/bad.js");

        let result = invoker.invoke(TransformOptions::new(), path, Some("syntax error"));

        assert!(matches!(result, Err(TransformError::Rejected { .. })));
        assert!(invoker.source_maps().is_empty());
    }

    #[test]
    fn test_invoke_missing_file_is_io_error() {
        let invoker = TransformInvoker::new(Arc::new(RecordingEngine::default()));
        let result = invoker.invoke(TransformOptions::new(), Path::new("/no/such/file.js"), None);
        assert!(matches!(result, Err(TransformError::Io(_))));
    }

    #[test]
    fn test_register_none_forgets_map() {
        let registry = SourceMapRegistry::new();
        let path = Path::new("/a.js");
        registry.register(path, Some(json!({})));
        assert_eq!(registry.len(), 1);
        registry.register(path, None);
        assert!(registry.retrieve(path).is_none());
    }

    #[test]
    fn test_default_extensions() {
        let engine = RecordingEngine::default();
        assert!(engine.extensions().contains(&".js".to_string()));
    }
}
