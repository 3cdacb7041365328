//! Compiler options

/// Log the disassembled instruction stream after a successful compile
pub const ENV_DUMP: &str = "OTTER_DECL_COMPILER_DUMP";
/// Log per-component statistics after a successful compile
pub const ENV_STATS: &str = "OTTER_DECL_COMPILER_STATS";
/// Skip the optimized binding compiler
pub const ENV_DISABLE_OPTIMIZED: &str = "OTTER_DECL_DISABLE_OPTIMIZED_BINDINGS";

/// Options controlling a compiler session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Log the instruction listing at debug level
    pub dump_instructions: bool,
    /// Log component statistics at debug level
    pub dump_stats: bool,
    /// Offer bindings to the optimized binding compiler
    pub optimized_bindings: bool,
    /// First value of the synthesized type name counter
    pub type_name_seed: u32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            dump_instructions: false,
            dump_stats: false,
            optimized_bindings: true,
            type_name_seed: 0,
        }
    }
}

impl CompilerOptions {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = |key: &str| lookup(key).is_some_and(|v| !v.is_empty() && v != "0");
        Self {
            dump_instructions: enabled(ENV_DUMP),
            dump_stats: enabled(ENV_STATS),
            optimized_bindings: !enabled(ENV_DISABLE_OPTIMIZED),
            ..Self::default()
        }
    }

    /// Set instruction dumping
    pub fn with_dump_instructions(mut self, enabled: bool) -> Self {
        self.dump_instructions = enabled;
        self
    }

    /// Set statistics dumping
    pub fn with_dump_stats(mut self, enabled: bool) -> Self {
        self.dump_stats = enabled;
        self
    }

    /// Enable or disable the optimized binding compiler
    pub fn with_optimized_bindings(mut self, enabled: bool) -> Self {
        self.optimized_bindings = enabled;
        self
    }

    /// Set the synthesized type name counter seed
    pub fn with_type_name_seed(mut self, seed: u32) -> Self {
        self.type_name_seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_lookup() {
        let options = CompilerOptions::from_lookup(|key| match key {
            ENV_DUMP => Some("1".into()),
            ENV_STATS => Some("0".into()),
            ENV_DISABLE_OPTIMIZED => Some("yes".into()),
            _ => None,
        });
        assert!(options.dump_instructions);
        assert!(!options.dump_stats);
        assert!(!options.optimized_bindings);
    }

    #[test]
    fn test_builder() {
        let options = CompilerOptions::default().with_type_name_seed(7).with_dump_stats(true);
        assert_eq!(options.type_name_seed, 7);
        assert!(options.dump_stats);
        assert!(options.optimized_bindings);
    }
}
