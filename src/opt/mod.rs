//! Optimizations built on the IR.
//!
//! The rewrites themselves are free functions usable on a single call site:
//! [`try_devirtualize`] redirects a dynamically dispatched call, and [`GenericCloner`] with
//! [`rewrite_apply_to_specialization`] replaces a generic call by a call of a concrete copy.
//! The [`Devirtualizer`] and [`GenericSpecializer`] passes apply them module-wide, and
//! [`PassPipeline`] runs passes until nothing changes.
//!
//! Every pass reports what it did to an [`EventLog`].

pub mod devirtualize;
pub mod devirtualizer;
pub mod events;
pub mod exact_type;
pub mod local;
pub mod pass;
pub mod specialize;
pub mod specializer;

pub use devirtualize::{can_devirtualize, try_devirtualize, Devirtualized, DispatchKind};
pub use devirtualizer::Devirtualizer;
pub use events::{Event, EventKind, EventLog};
pub use pass::{ModulePass, PassContext, PassPipeline, PipelineReport};
pub use specialize::{
    mangle_specialization, rewrite_apply_to_specialization, GenericCloner, ReabstractionInfo,
};
pub use specializer::GenericSpecializer;
