//! Configuration for modules and the optimizer.
//!
//! [`ModuleOptions`] describes the compilation a [`Module`](crate::ir::Module) belongs to and
//! is fixed when the module is created. [`OptimizerConfig`] selects which transformations
//! the [`PassPipeline`](crate::opt::PassPipeline) runs and bounds their work.

/// How far the module has progressed through the compilation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ModuleStage {
    /// Straight out of IR generation, before mandatory canonicalization
    Raw,
    /// Canonical IR, the stage optimizations run on
    #[default]
    Canonical,
    /// Lowered for code generation
    Lowered,
}

/// Properties of the compilation a module is part of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleOptions {
    /// The module is compiled as a whole, so every internal subclass and conformance is
    /// visible (default: false).
    pub whole_module: bool,

    /// Current pipeline stage (default: [`ModuleStage::Canonical`]).
    pub stage: ModuleStage,
}

impl ModuleOptions {
    /// Creates options for a whole-module compilation.
    #[must_use]
    pub fn whole_module() -> Self {
        Self {
            whole_module: true,
            ..Self::default()
        }
    }

    /// Sets the stage.
    #[must_use]
    pub fn with_stage(mut self, stage: ModuleStage) -> Self {
        self.stage = stage;
        self
    }
}

/// Configuration for the optimizer.
///
/// Controls which transformations run and how much work the pipeline may do before it
/// gives up on reaching a fixpoint.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Devirtualize `class_method` and `super_method` calls (default: true).
    pub enable_class_devirtualization: bool,

    /// Devirtualize `witness_method` calls (default: true).
    pub enable_witness_devirtualization: bool,

    /// Specialize calls to generic functions (default: true).
    pub enable_specialization: bool,

    /// Maximum number of rounds over all passes (default: 8).
    pub max_iterations: usize,

    /// Maximum number of new specializations created for calls in one function per round
    /// (default: 16).
    pub max_specializations_per_function: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable_class_devirtualization: true,
            enable_witness_devirtualization: true,
            enable_specialization: true,
            max_iterations: 8,
            max_specializations_per_function: 16,
        }
    }
}

impl OptimizerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with every transformation disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_class_devirtualization: false,
            enable_witness_devirtualization: false,
            enable_specialization: false,
            ..Self::default()
        }
    }

    /// Returns true if any devirtualization is enabled.
    #[must_use]
    pub fn any_devirtualization(&self) -> bool {
        self.enable_class_devirtualization || self.enable_witness_devirtualization
    }

    /// Sets the iteration bound.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}
