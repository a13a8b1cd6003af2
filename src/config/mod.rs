//! Lowering options.
//!
//! Options are plain data with builder helpers. They can also be read from
//! the `[lowering]` table of a TOML file:
//!
//! ```toml
//! [lowering]
//! name = "Forward"
//! language = "openmp"
//! grid_policy = "error"
//! ncollapse = 2
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::diagnostic::Diagnostic;

/// Output flavour of the generated kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    C,
    /// C with OpenMP parallel loops.
    OpenMp,
}

/// What to do when one expression references several grids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridPolicy {
    /// Use the first grid found and record a warning.
    #[default]
    Warn,
    /// Reject the equation.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Name of the generated callable.
    pub name: String,
    pub language: Language,
    pub grid_policy: GridPolicy,
    /// Number of loops folded into one parallel loop.
    pub ncollapse: u32,
    /// Chunk size of the dynamic schedule.
    pub chunk_size: u32,
    /// Wrap the nest in a halo-exchange spot.
    pub halo_exchange: bool,
    /// Bracket each section with timers.
    pub profiling: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            name: "Kernel".to_string(),
            language: Language::C,
            grid_policy: GridPolicy::Warn,
            ncollapse: 1,
            chunk_size: 1,
            halo_exchange: false,
            profiling: false,
        }
    }
}

impl Options {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_grid_policy(mut self, policy: GridPolicy) -> Self {
        self.grid_policy = policy;
        self
    }

    pub fn with_ncollapse(mut self, ncollapse: u32) -> Self {
        self.ncollapse = ncollapse;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_halo_exchange(mut self, enabled: bool) -> Self {
        self.halo_exchange = enabled;
        self
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Diagnostic> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Diagnostic::error(format!(
                "cannot read lowering config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
            .map_err(|d| d.with_note(format!("while loading '{}'", path.display())))
    }

    /// Parse options from TOML text. A missing `[lowering]` table, or a
    /// missing key, keeps the default.
    pub fn from_toml_str(content: &str) -> Result<Self, Diagnostic> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| {
            Diagnostic::error(format!("invalid lowering config: {}", e.message()))
                .with_origin(content.to_string())
                .with_help(
                    "known keys: name, language, grid_policy, ncollapse, chunk_size, halo_exchange, profiling"
                        .to_string(),
                )
        })?;
        let table = file.lowering.unwrap_or_default();
        let defaults = Options::default();
        let options = Options {
            name: table.name.unwrap_or(defaults.name),
            language: table.language.unwrap_or(defaults.language),
            grid_policy: table.grid_policy.unwrap_or(defaults.grid_policy),
            ncollapse: table.ncollapse.unwrap_or(defaults.ncollapse),
            chunk_size: table.chunk_size.unwrap_or(defaults.chunk_size),
            halo_exchange: table.halo_exchange.unwrap_or(defaults.halo_exchange),
            profiling: table.profiling.unwrap_or(defaults.profiling),
        };
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), Diagnostic> {
        if self.name.is_empty() || !is_c_identifier(&self.name) {
            return Err(Diagnostic::error(format!(
                "invalid kernel name '{}'",
                self.name
            ))
            .with_help("use letters, digits and underscores, not starting with a digit".to_string()));
        }
        if self.ncollapse == 0 {
            return Err(Diagnostic::error(
                "lowering.ncollapse must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(Diagnostic::error(
                "lowering.chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    lowering: Option<LoweringTable>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoweringTable {
    name: Option<String>,
    language: Option<Language>,
    grid_policy: Option<GridPolicy>,
    ncollapse: Option<u32>,
    chunk_size: Option<u32>,
    halo_exchange: Option<bool>,
    profiling: Option<bool>,
}

#[cfg(test)]
mod tests;
