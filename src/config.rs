//! Options controlling assembly and execution.
//!
//! All option structs deserialize with serde, fill missing fields from
//! `Default`, and offer chainable setters.

use serde::{Deserialize, Serialize};

/// How a top-level assembly treats references and nested failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    /// Build the graph without instantiating references or node instances.
    pub dry_run: bool,
    /// Fail the whole assembly on the first nested state machine failure
    /// instead of recording it and continuing.
    pub strict: bool,
}

impl AssemblyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Limits applied while an instance runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Maximum number of transitions one evaluation pass may chain through
    /// conduits and states that evaluate on start.
    pub max_transition_chain: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_transition_chain: 64,
        }
    }
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_transition_chain(mut self, limit: usize) -> Self {
        self.max_transition_chain = limit;
        self
    }
}

/// Complete configuration of a state machine instance.
///
/// # Example
///
/// ```rust
/// use statewright::config::InstanceConfig;
///
/// let config = InstanceConfig::from_json(r#"{ "assembly": { "strict": true } }"#).unwrap();
/// assert!(config.assembly.strict);
/// assert!(!config.assembly.dry_run);
/// assert_eq!(config.runtime.max_transition_chain, 64);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub assembly: AssemblyOptions,
    pub runtime: RuntimeOptions,
}

impl InstanceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_assembly(mut self, assembly: AssemblyOptions) -> Self {
        self.assembly = assembly;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeOptions) -> Self {
        self.runtime = runtime;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_lenient() {
        let options = AssemblyOptions::default();
        assert!(!options.dry_run);
        assert!(!options.strict);
    }

    #[test]
    fn setters_chain() {
        let options = AssemblyOptions::new().dry_run(true).strict(true);
        assert!(options.dry_run && options.strict);

        let runtime = RuntimeOptions::new().max_transition_chain(3);
        assert_eq!(runtime.max_transition_chain, 3);
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config = InstanceConfig::from_json("{}").unwrap();
        assert_eq!(config, InstanceConfig::default());
    }

    #[test]
    fn config_round_trips() {
        let config = InstanceConfig::new()
            .with_assembly(AssemblyOptions::new().strict(true))
            .with_runtime(RuntimeOptions::new().max_transition_chain(8));

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(InstanceConfig::from_json(&json).unwrap(), config);
    }
}
