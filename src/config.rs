//! Defaults-file parsing.
//!
//! The defaults file supplies per-device launch defaults: extra arguments,
//! environment overrides, and the two free-form identification strings shown
//! by `--show-platform`. It is read-only and best-effort; a missing file is
//! a warning, never a launch blocker.
//!
//! ## Format
//!
//! Line-oriented key/value text. Recognized prefixes:
//!
//! - `env=NAME=VALUE` — environment override for the child process
//! - `append=ARG` — one argument appended to the launch, order preserved
//! - `base=NAME` — base identification string
//! - `platform=NAME` — platform identification string
//!
//! Unrecognized lines and malformed `env=` lines are skipped silently.

use std::collections::HashMap;
use std::path::Path;

/// Well-known location of the defaults file on the target.
pub const DEFAULTS_FILE: &str = "/etc/appcontroller.conf";

/// Defaults loaded from the device's configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    /// Base identification string, `"unknown"` when absent.
    pub base: String,
    /// Platform identification string, `"unknown"` when absent.
    pub platform: String,
    /// Environment overrides for the child. Later file entries win over
    /// earlier ones with the same name.
    pub env: HashMap<String, String>,
    /// Arguments appended after the user-supplied arguments, in file order.
    pub args: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            base: "unknown".to_string(),
            platform: "unknown".to_string(),
            env: HashMap::new(),
            args: Vec::new(),
        }
    }
}

impl Defaults {
    /// Load defaults from a file, falling back to built-in defaults when the
    /// file cannot be read.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) => {
                tracing::warn!("could not read defaults file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse defaults from file contents.
    ///
    /// Malformed lines never abort parsing of subsequent lines.
    pub fn parse(text: &str) -> Self {
        let mut defaults = Self::default();

        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("env=") {
                let rest = rest.trim();
                // The separator must leave a key of at least two characters;
                // anything shorter is malformed and skipped.
                if let Some(index) = rest.find('=')
                    && index >= 2
                {
                    defaults
                        .env
                        .insert(rest[..index].to_string(), rest[index + 1..].to_string());
                }
            } else if let Some(rest) = line.strip_prefix("append=") {
                defaults.args.push(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("base=") {
                defaults.base = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("platform=") {
                defaults.platform = rest.trim().to_string();
            }
        }

        defaults
    }
}
