//! Module passes and the pipeline running them.
//!
//! A [`ModulePass`] transforms a whole [`Module`] and reports whether it changed
//! anything. The [`PassPipeline`] runs its passes in registration order, round after
//! round, until a round changes nothing or [`OptimizerConfig::max_iterations`] rounds have
//! run. Devirtualization exposes calls the specializer can handle, and specialized bodies
//! expose receivers of known class, so the passes feed each other.
//!
//! # Usage
//!
//! ```rust,ignore
//! use silcore::{config::OptimizerConfig, opt::PassPipeline};
//!
//! let mut pipeline = PassPipeline::with_defaults(OptimizerConfig::default());
//! let report = pipeline.run(&mut module)?;
//! println!("{} rounds: {}", report.iterations, report.events.summary());
//! ```

use std::time::{Duration, Instant};

use crate::{
    config::OptimizerConfig,
    ir::Module,
    opt::{
        devirtualizer::Devirtualizer,
        events::{EventKind, EventLog},
        specializer::GenericSpecializer,
    },
    Result,
};

/// A transformation over a whole module.
pub trait ModulePass {
    /// Short unique name, used in logs and events.
    fn name(&self) -> &'static str;

    /// One-line description of what the pass does.
    fn description(&self) -> &'static str;

    /// Returns `false` if `config` disables the pass.
    fn is_enabled(&self, _config: &OptimizerConfig) -> bool {
        true
    }

    /// Runs the pass.
    ///
    /// # Returns
    ///
    /// `true` if the module changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass hit malformed IR or could not create a function.
    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<bool>;
}

/// State shared by the passes of one pipeline run.
#[derive(Debug)]
pub struct PassContext {
    /// The configuration the pipeline runs with.
    pub config: OptimizerConfig,
    /// Events recorded by the passes.
    pub events: EventLog,
    iteration: usize,
}

impl PassContext {
    /// Creates a context for a run with `config`.
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            events: EventLog::new(),
            iteration: 0,
        }
    }

    /// Returns the current round, starting at 1.
    #[must_use]
    pub const fn iteration(&self) -> usize {
        self.iteration
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Number of rounds run.
    pub iterations: usize,
    /// The last round changed nothing.
    pub converged: bool,
    /// Everything the passes recorded.
    pub events: EventLog,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Returns `true` if any pass changed the module.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.events.transformations().next().is_some()
    }
}

/// Ordered list of module passes run to a fixpoint.
pub struct PassPipeline {
    config: OptimizerConfig,
    passes: Vec<Box<dyn ModulePass>>,
}

impl PassPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            passes: Vec::new(),
        }
    }

    /// Creates a pipeline with the devirtualizer followed by the generic specializer.
    #[must_use]
    pub fn with_defaults(config: OptimizerConfig) -> Self {
        let mut pipeline = Self::new(config);
        pipeline.add(Box::new(Devirtualizer::new()));
        pipeline.add(Box::new(GenericSpecializer::new()));
        pipeline
    }

    /// Appends a pass.
    pub fn add(&mut self, pass: Box<dyn ModulePass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Returns the names of the registered passes in order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Runs the passes until a round changes nothing or the iteration bound is reached.
    ///
    /// # Errors
    ///
    /// Returns the first error a pass reports; the module keeps the changes made so far.
    pub fn run(&mut self, module: &mut Module) -> Result<PipelineReport> {
        let start = Instant::now();
        let mut ctx = PassContext::new(self.config.clone());
        let mut converged = false;

        while ctx.iteration < self.config.max_iterations {
            ctx.iteration += 1;
            let mut changed = false;
            for pass in &mut self.passes {
                if !pass.is_enabled(&ctx.config) {
                    continue;
                }
                let name = pass.name();
                log::debug!("running pass {name} (round {})", ctx.iteration);
                ctx.events.record(EventKind::PassStarted).pass(name);
                let pass_changed = pass.run(module, &mut ctx)?;
                ctx.events
                    .record(EventKind::PassCompleted)
                    .pass(name)
                    .message(if pass_changed {
                        format!("{name} changed the module")
                    } else {
                        format!("{name} made no changes")
                    });
                log::debug!("finished pass {name}, changed: {pass_changed}");
                changed |= pass_changed;
            }
            if !changed {
                converged = true;
                break;
            }
        }

        if !converged && self.config.max_iterations > 0 {
            log::warn!(
                "pipeline stopped after {} rounds without reaching a fixpoint",
                ctx.iteration
            );
            ctx.events.warn(format!(
                "no fixpoint after {} rounds",
                ctx.iteration
            ));
        }

        Ok(PipelineReport {
            iterations: ctx.iteration,
            converged,
            events: ctx.events,
            elapsed: start.elapsed(),
        })
    }
}
