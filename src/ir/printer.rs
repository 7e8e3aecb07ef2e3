//! Textual dump of functions and modules.
//!
//! The dump is for diagnostics only and is not meant to be parsed back. Declarations,
//! methods and functions are printed by name, which is why printing goes through the
//! [`Module`] rather than through `Display` impls on the handles.
//!
//! ```text
//! sil public @main : $() -> () {
//! bb0:
//!   %0 = alloc_ref $Leaf
//!   %1 = upcast %0 : $Leaf to $Base
//!   %2 = class_method %1 : $Base, #Base.m
//!   %3 = apply %2(%1)
//!   return %3
//! }
//! ```

use std::fmt::{self, Write as _};

use crate::ir::{
    decl::{ConformanceRef, TypeContext},
    function::{FunctionId, Linkage},
    instruction::{InstId, InstKind},
    module::Module,
    types::{BuiltinType, FunctionType, ParamConvention, SilType, Type},
};

/// Formats a type with declaration names resolved.
pub struct TypeName<'a> {
    types: &'a TypeContext,
    ty: &'a Type,
}

impl<'a> TypeName<'a> {
    /// Creates a formatter for `ty`.
    #[must_use]
    pub const fn new(types: &'a TypeContext, ty: &'a Type) -> Self {
        Self { types, ty }
    }
}

impl fmt::Display for TypeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type(f, self.types, self.ty)
    }
}

fn write_type(f: &mut dyn fmt::Write, types: &TypeContext, ty: &Type) -> fmt::Result {
    match ty {
        Type::Builtin(BuiltinType::Int(bits)) => write!(f, "Int{bits}"),
        Type::Builtin(BuiltinType::Float(bits)) => write!(f, "Float{bits}"),
        Type::Builtin(BuiltinType::RawPointer) => write!(f, "RawPointer"),
        Type::Builtin(BuiltinType::NativeObject) => write!(f, "NativeObject"),
        Type::Nominal { decl, args } => {
            write!(f, "{}", types.decl(*decl).name())?;
            if !args.is_empty() {
                write!(f, "<")?;
                write_list(f, types, args)?;
                write!(f, ">")?;
            }
            Ok(())
        }
        Type::Tuple(elements) => {
            write!(f, "(")?;
            write_list(f, types, elements)?;
            write!(f, ")")
        }
        Type::Metatype(instance) => {
            write!(f, "@thick ")?;
            write_type(f, types, instance)?;
            write!(f, ".Type")
        }
        Type::Existential(protocol) => write!(f, "any {}", types.decl(*protocol).name()),
        Type::GenericParam(key) => write!(f, "{key}"),
        Type::Function(func) => write_function_type(f, types, func),
    }
}

fn write_list(f: &mut dyn fmt::Write, types: &TypeContext, tys: &[Type]) -> fmt::Result {
    for (i, ty) in tys.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write_type(f, types, ty)?;
    }
    Ok(())
}

fn write_function_type(
    f: &mut dyn fmt::Write,
    types: &TypeContext,
    ty: &FunctionType,
) -> fmt::Result {
    if let Some(sig) = &ty.generic_sig {
        write!(f, "{sig} ")?;
    }
    write!(f, "(")?;
    for (i, param) in ty.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        let convention = match param.convention {
            ParamConvention::IndirectIn => "@in ",
            ParamConvention::IndirectInGuaranteed => "@in_guaranteed ",
            ParamConvention::IndirectInout => "@inout ",
            ParamConvention::DirectOwned => "@owned ",
            ParamConvention::DirectUnowned => "@unowned ",
            ParamConvention::DirectGuaranteed => "@guaranteed ",
        };
        write!(f, "{convention}")?;
        write_type(f, types, &param.ty)?;
    }
    write!(f, ") -> ")?;
    if ty.results.len() == 1 && !ty.results[0].is_indirect() {
        write_type(f, types, &ty.results[0].ty)?;
    } else {
        write!(f, "(")?;
        for (i, result) in ty.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if result.is_indirect() {
                write!(f, "@out ")?;
            }
            write_type(f, types, &result.ty)?;
        }
        write!(f, ")")?;
    }
    if let Some(error) = &ty.error {
        write!(f, " throws ")?;
        write_type(f, types, error)?;
    }
    Ok(())
}

fn write_sil_type(f: &mut dyn fmt::Write, types: &TypeContext, ty: &SilType) -> fmt::Result {
    write!(f, "$")?;
    if ty.is_address() {
        write!(f, "*")?;
    }
    write_type(f, types, ty.ty())
}

/// Formats one function.
pub struct FunctionPrinter<'a> {
    module: &'a Module,
    id: FunctionId,
}

impl<'a> FunctionPrinter<'a> {
    /// Creates a printer for function `id` of `module`.
    #[must_use]
    pub const fn new(module: &'a Module, id: FunctionId) -> Self {
        Self { module, id }
    }

    fn write_inst(&self, f: &mut dyn fmt::Write, id: InstId) -> fmt::Result {
        let types = self.module.types();
        let func = self.module.function(self.id);
        let inst = func.inst(id);
        let results = inst.results();
        match results {
            [] => {}
            [single] => write!(f, "{single} = ")?,
            many => {
                write!(f, "(")?;
                for (i, r) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{r}")?;
                }
                write!(f, ") = ")?;
            }
        }
        write!(f, "{}", inst.opcode())?;

        match inst.kind() {
            InstKind::IntegerLiteral { value } => {
                write!(f, " ")?;
                write_sil_type(f, types, func.value_type(results[0]))?;
                return write!(f, ", {value}");
            }
            InstKind::FunctionRef { function } => {
                return write!(f, " @{}", self.module.function(*function).name());
            }
            InstKind::AllocRef | InstKind::AllocStack | InstKind::Metatype => {
                write!(f, " ")?;
                return write_sil_type(f, types, func.value_type(results[0]));
            }
            InstKind::WitnessMethod {
                lookup_type,
                conformance,
                member,
            } => {
                write!(f, " $")?;
                write_type(f, types, lookup_type)?;
                let method = types.method(*member);
                write!(
                    f,
                    ", #{}.{}",
                    types.decl(method.parent()).name(),
                    method.name()
                )?;
                return match conformance {
                    ConformanceRef::Abstract(_) => write!(f, " : abstract"),
                    ConformanceRef::Concrete(_) => write!(f, " : concrete"),
                    ConformanceRef::Specialized { subs, .. } => write!(f, " : specialized {subs}"),
                };
            }
            _ => {}
        }

        if inst.opcode().is_terminator() && !inst.successors().is_empty() {
            if !matches!(inst.kind(), InstKind::Branch) {
                write!(f, " ")?;
                self.write_operand_list(f, &inst.operands()[..inst.operands().len().min(1)])?;
                write!(f, ",")?;
            }
            for (index, edge) in inst.successors().iter().enumerate() {
                write!(f, " {}", edge.block)?;
                let args = inst.successor_args(index);
                if !args.is_empty() {
                    write!(f, "(")?;
                    self.write_operand_list(f, args)?;
                    write!(f, ")")?;
                }
                if let Some(count) = edge.count {
                    write!(f, " !{count}")?;
                }
            }
            return Ok(());
        }

        if !inst.operands().is_empty() {
            write!(f, " ")?;
            self.write_operand_list(f, inst.operands())?;
        }
        match inst.kind() {
            InstKind::ClassMethod { member } | InstKind::SuperMethod { member } => {
                let method = types.method(*member);
                write!(
                    f,
                    ", #{}.{}",
                    types.decl(method.parent()).name(),
                    method.name()
                )?;
            }
            InstKind::Apply { subs, .. } | InstKind::PartialApply { subs } if !subs.is_empty() => {
                write!(f, " {subs}")?;
            }
            InstKind::StructExtract { field } => write!(f, ", #{field}")?,
            InstKind::TupleExtract { index } => write!(f, ", {index}")?,
            InstKind::Enum { case } => write!(f, ", #{case}")?,
            InstKind::Builtin { name } => write!(f, " \"{name}\"")?,
            _ => {}
        }
        if let [single] = results {
            if inst.opcode().is_identity_preserving_cast()
                || matches!(
                    inst.kind(),
                    InstKind::UncheckedAddrCast
                        | InstKind::UncheckedBitwiseCast
                        | InstKind::ConvertFunction
                        | InstKind::UnconditionalCheckedCast
                )
            {
                write!(f, " to ")?;
                write_sil_type(f, types, func.value_type(*single))?;
            }
        }
        Ok(())
    }

    fn write_operand_list(&self, f: &mut dyn fmt::Write, values: &[crate::ir::ValueId]) -> fmt::Result {
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

fn linkage_name(linkage: Linkage) -> &'static str {
    match linkage {
        Linkage::Public => "public",
        Linkage::PublicNonAbi => "public_non_abi",
        Linkage::Hidden => "hidden",
        Linkage::Shared => "shared",
        Linkage::Private => "private",
        Linkage::PublicExternal => "public_external",
        Linkage::HiddenExternal => "hidden_external",
        Linkage::SharedExternal => "shared_external",
    }
}

impl fmt::Display for FunctionPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types = self.module.types();
        let func = self.module.function(self.id);
        write!(f, "sil {} @{} : $", linkage_name(func.linkage()), func.name())?;
        write_function_type(f, types, func.lowered_type())?;
        if !func.is_definition() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for block in func.blocks() {
            write!(f, "{block}")?;
            let args = func.block_args(block);
            if !args.is_empty() {
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg} : ")?;
                    write_sil_type(f, types, func.value_type(*arg))?;
                }
                write!(f, ")")?;
            }
            writeln!(f, ":")?;
            for inst in func.block_insts(block) {
                let mut line = String::new();
                self.write_inst(&mut line, *inst)?;
                writeln!(f, "  {line}")?;
            }
        }
        writeln!(f, "}}")
    }
}

impl Module {
    /// Returns a printer for one function.
    #[must_use]
    pub fn display_function(&self, id: FunctionId) -> FunctionPrinter<'_> {
        FunctionPrinter::new(self, id)
    }

    /// Returns a formatter for a type with declaration names resolved.
    #[must_use]
    pub fn display_type<'a>(&'a self, ty: &'a Type) -> TypeName<'a> {
        TypeName::new(self.types(), ty)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sil_stage {:?} // {}", self.stage(), self.name())?;
        for id in self.functions() {
            writeln!(f)?;
            write!(f, "{}", self.display_function(id))?;
        }
        for vtable in self.vtables() {
            writeln!(f)?;
            writeln!(f, "sil_vtable {} {{", self.types().decl(vtable.class()).name())?;
            for (method, function) in vtable.entries() {
                let m = self.types().method(*method);
                let mut entry = String::new();
                write!(
                    entry,
                    "#{}.{}: @{}",
                    self.types().decl(m.parent()).name(),
                    m.name(),
                    self.function(*function).name()
                )?;
                writeln!(f, "  {entry}")?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
