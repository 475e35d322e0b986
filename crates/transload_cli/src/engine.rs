//! Transform engine backed by an external command.

use std::io::Write;
use std::process::{Command, Stdio};

use transload_core::{TransformEngine, TransformError, TransformOutput, TransformRequest};

/// Receives the file being transformed.
pub const FILENAME_VAR: &str = "TRANSLOAD_FILENAME";
/// Receives the full transform request as JSON.
pub const REQUEST_VAR: &str = "TRANSLOAD_REQUEST";

/// Runs a command with the source on stdin and takes its stdout as the generated code.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    version: String,
}

impl CommandEngine {
    /// Splits `command` on whitespace. `version` defaults to the command itself.
    pub fn parse(command: &str, version: Option<&str>) -> Result<Self, TransformError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| TransformError::engine("Empty engine command"))?;

        Ok(Self {
            program,
            args: parts.collect(),
            version: version.unwrap_or(command).to_string(),
        })
    }
}

impl TransformEngine for CommandEngine {
    fn version(&self) -> &str {
        &self.version
    }

    fn transform(
        &self,
        source: &str,
        request: &TransformRequest,
    ) -> Result<TransformOutput, TransformError> {
        let request_json =
            serde_json::to_string(request).map_err(|e| TransformError::engine(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(FILENAME_VAR, &request.filename)
            .env(REQUEST_VAR, request_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TransformError::engine(format!("Failed to start {}: {}", self.program, e))
            })?;

        // Feed stdin from another thread so a chatty engine cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = source.to_string();
            std::thread::spawn(move || stdin.write_all(input.as_bytes()))
        });

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            // engines that ignore stdin close the pipe early
            let _ = writer.join();
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransformError::rejected(
                &request.filename,
                format!("{} ({})", stderr.trim(), output.status),
            ));
        }

        let code = String::from_utf8(output.stdout)
            .map_err(|e| TransformError::engine(format!("Engine output is not UTF-8: {}", e)))?;

        Ok(TransformOutput { code, map: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transload_core::TransformOptions;

    #[test]
    fn test_parse_splits_arguments() {
        let engine = CommandEngine::parse("tr a-z A-Z", None).unwrap();
        assert_eq!(engine.program, "tr");
        assert_eq!(engine.args, vec!["a-z".to_string(), "A-Z".to_string()]);
        assert_eq!(engine.version(), "tr a-z A-Z");
    }

    #[test]
    fn test_parse_explicit_version() {
        let engine = CommandEngine::parse("cat", Some("7.1.0")).unwrap();
        assert_eq!(engine.version(), "7.1.0");
    }

    #[test]
    fn test_parse_empty_command() {
        assert!(matches!(
            CommandEngine::parse("   ", None),
            Err(TransformError::Engine(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_transform_through_command() {
        let engine = CommandEngine::parse("tr a-z A-Z", None).unwrap();
        let request = TransformRequest::new("/virtual/a.js", TransformOptions::new());

        let output = engine.transform("let a;", &request).unwrap();

        assert_eq!(output.code, "LET A;");
        assert!(output.map.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_is_rejection() {
        let engine = CommandEngine::parse("false", None).unwrap();
        let request = TransformRequest::new("/virtual/a.js", TransformOptions::new());

        let result = engine.transform("x", &request);

        assert!(matches!(result, Err(TransformError::Rejected { .. })));
    }

    #[test]
    fn test_missing_program_is_engine_error() {
        let engine = CommandEngine::parse("definitely-not-a-real-program-xyz", None).unwrap();
        let request = TransformRequest::new("/virtual/a.js", TransformOptions::new());

        let result = engine.transform("x", &request);

        assert!(matches!(result, Err(TransformError::Engine(_))));
    }
}
