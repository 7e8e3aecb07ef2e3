//! The module: functions, declarations and dispatch tables.
//!
//! A [`Module`] owns every [`Function`] of a compilation, keyed by unique name, together
//! with the [`TypeContext`] describing its declarations and the tables dynamic dispatch
//! resolves through:
//!
//! - [`VTable`] - per class, maps each method slot to its most derived implementation
//! - [`WitnessTable`] - per conformance, maps protocol requirements to witnesses
//! - [`DefaultWitnessTable`] - per protocol, witnesses used when a conformance has none
//!
//! # Reference counts
//!
//! Every `function_ref` instruction and every table entry counts as a reference to the
//! function it names. A function can only be erased once its count reaches zero. Erased
//! functions are parked under their name and their storage is recycled when a function
//! with the same name is created again.

use std::collections::HashMap;

use crate::{
    config::{ModuleOptions, ModuleStage},
    ir::{
        block::BlockId,
        builder::{Builder, InsertPoint},
        decl::{ConformanceId, ConformanceRef, DeclId, MethodId, TypeContext},
        function::{Function, FunctionId, Linkage},
        instruction::{InstId, InstKind},
        types::FunctionType,
    },
    Error, Result,
};

/// Monotonic counters of IR construction and destruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrStats {
    /// Instructions created through a builder
    pub instructions_created: u64,
    /// Instructions erased through a builder
    pub instructions_erased: u64,
    /// Functions created, including recycled ones
    pub functions_created: u64,
    /// Functions erased
    pub functions_erased: u64,
    /// Functions whose storage was reused from an erased function with the same name
    pub functions_recycled: u64,
}

/// Per-module state builders keep up to date.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bookkeeping {
    pub(crate) ref_counts: Vec<u32>,
    pub(crate) stats: IrStats,
}

impl Bookkeeping {
    pub(crate) fn add_ref(&mut self, function: FunctionId) {
        self.ref_counts[function.index()] += 1;
    }

    pub(crate) fn release_ref(&mut self, function: FunctionId) {
        let count = &mut self.ref_counts[function.index()];
        debug_assert!(*count > 0, "reference count of {function} underflows");
        *count = count.saturating_sub(1);
    }
}

/// Virtual method table of one class.
///
/// Entries are keyed by the method that introduced the slot, so an override and the
/// method it overrides map to the same entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VTable {
    class: DeclId,
    entries: Vec<(MethodId, FunctionId)>,
}

impl VTable {
    /// Creates an empty vtable for `class`.
    #[must_use]
    pub fn new(class: DeclId) -> Self {
        Self {
            class,
            entries: Vec::new(),
        }
    }

    /// Adds an entry implementing `method` with `function`.
    #[must_use]
    pub fn with_entry(mut self, method: MethodId, function: FunctionId) -> Self {
        self.entries.push((method, function));
        self
    }

    /// Returns the class.
    #[must_use]
    pub const fn class(&self) -> DeclId {
        self.class
    }

    /// Returns the entries in slot order.
    #[must_use]
    pub fn entries(&self) -> &[(MethodId, FunctionId)] {
        &self.entries
    }
}

/// Witness table of one protocol conformance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessTable {
    conformance: ConformanceId,
    entries: Vec<(MethodId, FunctionId)>,
    serialized: bool,
}

impl WitnessTable {
    /// Creates an empty table for a normal conformance.
    #[must_use]
    pub fn new(conformance: ConformanceId) -> Self {
        Self {
            conformance,
            entries: Vec::new(),
            serialized: false,
        }
    }

    /// Adds a witness for `requirement`.
    #[must_use]
    pub fn with_entry(mut self, requirement: MethodId, witness: FunctionId) -> Self {
        self.entries.push((requirement, witness));
        self
    }

    /// Marks the table as part of the module interface.
    #[must_use]
    pub fn serialized(mut self) -> Self {
        self.serialized = true;
        self
    }

    /// Returns the conformance.
    #[must_use]
    pub const fn conformance(&self) -> ConformanceId {
        self.conformance
    }

    /// Returns the entries.
    #[must_use]
    pub fn entries(&self) -> &[(MethodId, FunctionId)] {
        &self.entries
    }

    /// Returns `true` if the table is visible to other modules.
    #[must_use]
    pub const fn is_serialized(&self) -> bool {
        self.serialized
    }

    /// Returns the witness for `requirement`.
    #[must_use]
    pub fn witness(&self, requirement: MethodId) -> Option<FunctionId> {
        lookup_entry(&self.entries, requirement)
    }
}

/// Default implementations of a protocol's requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultWitnessTable {
    protocol: DeclId,
    entries: Vec<(MethodId, FunctionId)>,
}

impl DefaultWitnessTable {
    /// Creates an empty table for `protocol`.
    #[must_use]
    pub fn new(protocol: DeclId) -> Self {
        Self {
            protocol,
            entries: Vec::new(),
        }
    }

    /// Adds a default witness for `requirement`.
    #[must_use]
    pub fn with_entry(mut self, requirement: MethodId, witness: FunctionId) -> Self {
        self.entries.push((requirement, witness));
        self
    }

    /// Returns the protocol.
    #[must_use]
    pub const fn protocol(&self) -> DeclId {
        self.protocol
    }

    /// Returns the entries.
    #[must_use]
    pub fn entries(&self) -> &[(MethodId, FunctionId)] {
        &self.entries
    }

    /// Returns the default witness for `requirement`.
    #[must_use]
    pub fn witness(&self, requirement: MethodId) -> Option<FunctionId> {
        lookup_entry(&self.entries, requirement)
    }
}

fn lookup_entry(entries: &[(MethodId, FunctionId)], key: MethodId) -> Option<FunctionId> {
    entries.iter().find(|(m, _)| *m == key).map(|(_, f)| *f)
}

/// Top-level container of a compilation.
#[derive(Debug)]
pub struct Module {
    name: String,
    options: ModuleOptions,
    types: TypeContext,
    functions: Vec<Function>,
    by_name: HashMap<String, FunctionId>,
    zombies: HashMap<String, FunctionId>,
    book: Bookkeeping,
    vtables: Vec<VTable>,
    vtable_index: HashMap<DeclId, usize>,
    witness_tables: Vec<WitnessTable>,
    witness_index: HashMap<ConformanceId, usize>,
    default_witness_tables: HashMap<DeclId, DefaultWitnessTable>,
}

impl Module {
    /// Creates an empty module over the given declarations.
    #[must_use]
    pub fn new(name: impl Into<String>, types: TypeContext, options: ModuleOptions) -> Self {
        Self {
            name: name.into(),
            options,
            types,
            functions: Vec::new(),
            by_name: HashMap::new(),
            zombies: HashMap::new(),
            book: Bookkeeping::default(),
            vtables: Vec::new(),
            vtable_index: HashMap::new(),
            witness_tables: Vec::new(),
            witness_index: HashMap::new(),
            default_witness_tables: HashMap::new(),
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the compilation options.
    #[must_use]
    pub const fn options(&self) -> ModuleOptions {
        self.options
    }

    /// Returns the pipeline stage.
    #[must_use]
    pub const fn stage(&self) -> ModuleStage {
        self.options.stage
    }

    /// Advances the module to another pipeline stage.
    pub fn set_stage(&mut self, stage: ModuleStage) {
        self.options.stage = stage;
    }

    /// Returns `true` for whole-module compilations.
    #[must_use]
    pub const fn is_whole_module(&self) -> bool {
        self.options.whole_module
    }

    /// Returns the declarations.
    #[must_use]
    pub const fn types(&self) -> &TypeContext {
        &self.types
    }

    /// Returns the declarations for registration.
    pub fn types_mut(&mut self) -> &mut TypeContext {
        &mut self.types
    }

    /// Returns the construction counters.
    #[must_use]
    pub const fn stats(&self) -> &IrStats {
        &self.book.stats
    }

    // ---------------------------------------------------------------------------------
    // Functions
    // ---------------------------------------------------------------------------------

    /// Creates a function declaration without a body.
    ///
    /// If a function with the same name was erased before, its storage and handle are
    /// reused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateFunction`] if a live function already has this name.
    pub fn create_function(
        &mut self,
        name: &str,
        ty: FunctionType,
        linkage: Linkage,
    ) -> Result<FunctionId> {
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateFunction(name.to_string()));
        }
        let id = if let Some(id) = self.zombies.remove(name) {
            self.functions[id.index()].reset(ty, linkage);
            self.book.stats.functions_recycled += 1;
            log::trace!("recycled storage of erased function {name}");
            id
        } else {
            let id = FunctionId::new(self.functions.len());
            self.functions.push(Function::new(name, ty, linkage));
            self.book.ref_counts.push(0);
            id
        };
        self.by_name.insert(name.to_string(), id);
        self.book.stats.functions_created += 1;
        Ok(id)
    }

    /// Returns a function.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this module.
    #[must_use]
    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    /// Returns a function for direct edits.
    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    /// Finds a live function by name.
    #[must_use]
    pub fn lookup_function(&self, name: &str) -> Option<FunctionId> {
        self.by_name.get(name).copied()
    }

    /// Finds a live function by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFunction`] if no live function has this name.
    pub fn function_id(&self, name: &str) -> Result<FunctionId> {
        self.lookup_function(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }

    /// Returns `true` if `id` refers to a live function.
    #[must_use]
    pub fn is_live(&self, id: FunctionId) -> bool {
        self.functions
            .get(id.index())
            .is_some_and(|f| self.by_name.get(f.name()) == Some(&id))
    }

    /// Iterates the live functions in creation order.
    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        (0..self.functions.len())
            .map(FunctionId::new)
            .filter(|id| self.is_live(*id))
    }

    /// Returns the number of live functions.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.by_name.len()
    }

    /// Returns the number of `function_ref` instructions and table entries naming `id`.
    #[must_use]
    pub fn ref_count(&self, id: FunctionId) -> u32 {
        self.book.ref_counts[id.index()]
    }

    /// Erases an unreferenced function.
    ///
    /// Drops the body, releasing the references it held, and parks the storage for reuse
    /// by name.
    ///
    /// # Panics
    ///
    /// Panics if the function is still referenced or already erased.
    pub fn erase_function(&mut self, id: FunctionId) {
        assert!(self.is_live(id), "erasing {id} which is not live");
        assert_eq!(
            self.ref_count(id),
            0,
            "erasing {} which is still referenced",
            self.functions[id.index()].name()
        );
        let func = &mut self.functions[id.index()];
        let name = func.name().to_string();
        for inst in func.clear_body() {
            if let InstKind::FunctionRef { function } = inst.kind() {
                self.book.release_ref(*function);
            }
            self.book.stats.instructions_erased += 1;
        }
        log::debug!("erased function {name}");
        self.by_name.remove(&name);
        self.zombies.insert(name, id);
        self.book.stats.functions_erased += 1;
    }

    /// Creates a builder for `function` without an insertion point.
    pub fn builder(&mut self, function: FunctionId) -> Builder<'_> {
        Builder::new(
            &mut self.functions[function.index()],
            &self.types,
            &mut self.book,
        )
    }

    /// Creates a builder for `function` inserting at `at`.
    pub fn builder_at(&mut self, function: FunctionId, at: InsertPoint) -> Builder<'_> {
        let mut builder = self.builder(function);
        builder.set_insertion_point(at);
        builder
    }

    /// Creates the entry block of a declared function from its signature.
    pub fn create_entry_block(&mut self, function: FunctionId) -> BlockId {
        self.functions[function.index()].create_entry_block(&self.types)
    }

    /// Moves `block` from function `from` to function `to`, placing it after `after` or at
    /// the end of the layout. Returns the block's handle in `to`.
    ///
    /// See [`Module::move_blocks`] for how values crossing the boundary are handled.
    pub fn move_block(
        &mut self,
        from: FunctionId,
        to: FunctionId,
        block: BlockId,
        after: Option<BlockId>,
    ) -> BlockId {
        let moved = self.move_blocks(from, to, &[block], after);
        moved[0]
    }

    /// Moves a group of blocks from function `from` to function `to`, keeping their order
    /// and the control flow between them. Returns the new handles in the order given.
    ///
    /// Arguments, instructions and results are re-homed in the arenas of `to`. Operands
    /// defined in `from` outside the group become `undef` in `to`, and uses left behind in
    /// `from` of values defined in the group become `undef` there. Reference counts are
    /// unchanged since the instructions stay in the module.
    ///
    /// # Panics
    ///
    /// Panics if `from == to`, if a block is the entry block of `from`, or if a control
    /// flow edge connects a moved block with a block staying behind.
    pub fn move_blocks(
        &mut self,
        from: FunctionId,
        to: FunctionId,
        blocks: &[BlockId],
        after: Option<BlockId>,
    ) -> Vec<BlockId> {
        assert_ne!(from, to, "moving blocks within {from}, use move_block_after");
        let detached = self.functions[from.index()].detach_blocks(blocks);
        let moved = self.functions[to.index()].attach_blocks(detached, after);
        log::debug!(
            "moved {} blocks from @{} to @{}",
            moved.len(),
            self.functions[from.index()].name(),
            self.functions[to.index()].name()
        );
        moved
    }

    /// Erases an instruction of `function`.
    ///
    /// # Panics
    ///
    /// Panics if any result of the instruction is still used.
    pub fn erase_instruction(&mut self, function: FunctionId, inst: InstId) {
        self.builder(function).erase(inst);
    }

    // ---------------------------------------------------------------------------------
    // Dispatch tables
    // ---------------------------------------------------------------------------------

    fn retain_entries(&mut self, entries: &[(MethodId, FunctionId)]) {
        for (_, function) in entries {
            self.book.add_ref(*function);
        }
    }

    /// Registers the vtable of a class. Entry keys are normalized to their slot's root method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTable`] if the class already has a vtable.
    pub fn add_vtable(&mut self, mut vtable: VTable) -> Result<()> {
        if self.vtable_index.contains_key(&vtable.class) {
            return Err(Error::DuplicateTable(format!(
                "vtable of {}",
                self.types.decl(vtable.class).name()
            )));
        }
        for entry in &mut vtable.entries {
            entry.0 = self.types.root_method(entry.0);
        }
        self.retain_entries(&vtable.entries);
        self.vtable_index.insert(vtable.class, self.vtables.len());
        self.vtables.push(vtable);
        Ok(())
    }

    /// Returns the vtables in registration order.
    #[must_use]
    pub fn vtables(&self) -> &[VTable] {
        &self.vtables
    }

    /// Returns the vtable of a class.
    #[must_use]
    pub fn look_up_vtable(&self, class: DeclId) -> Option<&VTable> {
        self.vtable_index.get(&class).map(|i| &self.vtables[*i])
    }

    /// Resolves `member` to the implementation the vtable of `class` holds for its slot.
    #[must_use]
    pub fn look_up_function_in_vtable(&self, class: DeclId, member: MethodId) -> Option<FunctionId> {
        let slot = self.types.root_method(member);
        lookup_entry(&self.look_up_vtable(class)?.entries, slot)
    }

    /// Registers the witness table of a normal conformance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTable`] if the conformance already has a table.
    pub fn add_witness_table(&mut self, table: WitnessTable) -> Result<()> {
        if self.witness_index.contains_key(&table.conformance) {
            let conformance = self.types.conformance(table.conformance);
            return Err(Error::DuplicateTable(format!(
                "witness table of {}: {}",
                self.types.decl(conformance.conforming_decl()).name(),
                self.types.decl(conformance.protocol()).name()
            )));
        }
        self.retain_entries(&table.entries);
        self.witness_index
            .insert(table.conformance, self.witness_tables.len());
        self.witness_tables.push(table);
        Ok(())
    }

    /// Returns the witness tables in registration order.
    #[must_use]
    pub fn witness_tables(&self) -> &[WitnessTable] {
        &self.witness_tables
    }

    /// Registers the default witness table of a protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTable`] if the protocol already has one.
    pub fn add_default_witness_table(&mut self, table: DefaultWitnessTable) -> Result<()> {
        if self.default_witness_tables.contains_key(&table.protocol) {
            return Err(Error::DuplicateTable(format!(
                "default witness table of {}",
                self.types.decl(table.protocol).name()
            )));
        }
        self.retain_entries(&table.entries);
        self.default_witness_tables.insert(table.protocol, table);
        Ok(())
    }

    /// Returns the witness table of the conformance a reference is rooted in.
    #[must_use]
    pub fn look_up_witness_table(&self, conformance: &ConformanceRef) -> Option<&WitnessTable> {
        let root = conformance.root()?;
        self.witness_index.get(&root).map(|i| &self.witness_tables[*i])
    }

    /// Returns the default witness table of a protocol.
    #[must_use]
    pub fn look_up_default_witness_table(&self, protocol: DeclId) -> Option<&DefaultWitnessTable> {
        self.default_witness_tables.get(&protocol)
    }

    /// Resolves `requirement` through the witness table of `conformance`.
    ///
    /// Falls back to the protocol's default witness table when the conformance's table
    /// has no entry for the requirement. Abstract conformances resolve to nothing.
    #[must_use]
    pub fn look_up_function_in_witness_table(
        &self,
        conformance: &ConformanceRef,
        requirement: MethodId,
    ) -> Option<FunctionId> {
        let root = conformance.root()?;
        if let Some(found) = self
            .look_up_witness_table(conformance)
            .and_then(|t| t.witness(requirement))
        {
            return Some(found);
        }
        let protocol = self.types.conformance(root).protocol();
        self.look_up_default_witness_table(protocol)?
            .witness(requirement)
    }
}
