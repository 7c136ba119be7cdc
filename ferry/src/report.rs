//! Rendering command results as text, JSON, or nothing.
//!
//! Command logic produces a [`Report`]; the output mode decides how it is shown
//! and never changes what happened. The exit code is the same in every mode.

use colored::Colorize;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::FerryError;
use crate::exit_codes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable lines, colored errors on stderr.
    Text,
    /// One JSON object on stdout.
    Json,
    /// Exit code only.
    Silent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Success {
        lines: Vec<String>,
        payload: Value,
    },
    Failure {
        exit_code: i32,
        tag: &'static str,
        message: String,
        files: Vec<String>,
    },
}

impl Report {
    /// Success with text lines and a serializable payload for JSON mode.
    pub fn success<T: Serialize>(lines: Vec<String>, payload: &T) -> Self {
        let payload = serde_json::to_value(payload)
            .unwrap_or_else(|err| json!({ "serialization_error": err.to_string() }));
        Self::Success { lines, payload }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success { .. } => exit_codes::OK,
            Self::Failure { exit_code, .. } => *exit_code,
        }
    }

    /// The JSON document emitted in [`OutputMode::Json`].
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success { payload, .. } => {
                let mut doc = Map::new();
                doc.insert("success".to_string(), Value::Bool(true));
                match payload {
                    Value::Object(fields) => {
                        doc.extend(fields.clone());
                    }
                    Value::Null => {}
                    other => {
                        doc.insert("data".to_string(), other.clone());
                    }
                }
                Value::Object(doc)
            }
            Self::Failure {
                tag,
                message,
                files,
                ..
            } => json!({
                "success": false,
                "error": {
                    "code": tag,
                    "message": message,
                    "files": files,
                }
            }),
        }
    }

    /// Uncolored text lines for [`OutputMode::Text`].
    pub fn text_lines(&self) -> Vec<String> {
        match self {
            Self::Success { lines, .. } => lines.clone(),
            Self::Failure {
                tag,
                message,
                files,
                ..
            } => {
                let label = if *tag == "no_changes" { "note" } else { "error" };
                let mut out = vec![format!("{label}: {message}")];
                out.extend(files.iter().map(|file| format!("  {file}")));
                out
            }
        }
    }

    /// Print according to `mode` and return the process exit code.
    pub fn emit(&self, mode: OutputMode) -> i32 {
        match mode {
            OutputMode::Silent => {}
            OutputMode::Json => match serde_json::to_string_pretty(&self.to_json()) {
                Ok(doc) => println!("{doc}"),
                Err(err) => eprintln!("error: serialize report: {err}"),
            },
            OutputMode::Text => self.emit_text(),
        }
        self.exit_code()
    }

    fn emit_text(&self) {
        let lines = self.text_lines();
        match self {
            Self::Success { .. } => {
                for line in lines {
                    println!("{line}");
                }
            }
            Self::Failure { tag, .. } => {
                let mut iter = lines.into_iter();
                if let Some(first) = iter.next() {
                    if *tag == "no_changes" {
                        eprintln!("{}", first.yellow());
                    } else {
                        eprintln!("{}", first.red().bold());
                    }
                }
                for line in iter {
                    eprintln!("{line}");
                }
            }
        }
    }
}

impl From<&FerryError> for Report {
    fn from(err: &FerryError) -> Self {
        Self::Failure {
            exit_code: err.exit_code(),
            tag: err.tag(),
            message: format!("{err:#}"),
            files: err.files().to_vec(),
        }
    }
}

impl From<FerryError> for Report {
    fn from(err: FerryError) -> Self {
        Self::from(&err)
    }
}
