#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use ember_ast::{FunctionBody, FunctionId};
use ember_core::{Function, Package, StorageType, classify};
use ember_types::Type;
use target_lexicon::Triple;

use crate::error::CodegenError;
use crate::function::{ArgumentStyle, FnCodeGenerator};
use crate::layout::{BOX_VALUE_WORDS, BoxImage, OptionalLayout, words_of};
use crate::value::llvm_ident;

pub const BOX_TYPE: &str = "%ember.box";
pub const META_TYPE: &str = "%ember.meta";
const CALLABLE_TYPE_NAME: &str = "callable";

#[derive(Clone, Debug)]
pub struct CodegenOptions {
    pub triple: Triple,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            triple: target_lexicon::HOST,
        }
    }
}

/// Module-wide state: meta and conformance symbols referenced so far,
/// interned strings, and functions synthesized while generating bodies
/// (closures and adapter thunks).
pub struct CodeGenerator<'m> {
    pub(crate) package: &'m Package,
    options: CodegenOptions,
    metas: BTreeSet<String>,
    protocols: BTreeSet<String>,
    conformances: BTreeSet<(String, String)>,
    strings: Vec<(String, String)>,
    constants: Vec<String>,
    synthesized: Vec<String>,
    /// Callees by symbol, with the declaration used if no body is emitted.
    callees: BTreeMap<String, String>,
    defined: BTreeSet<String>,
    next_closure: u32,
    next_adapter: u32,
}

impl<'m> CodeGenerator<'m> {
    pub fn new(package: &'m Package, options: CodegenOptions) -> Self {
        Self {
            package,
            options,
            metas: BTreeSet::new(),
            protocols: BTreeSet::new(),
            conformances: BTreeSet::new(),
            strings: Vec::new(),
            constants: Vec::new(),
            synthesized: Vec::new(),
            callees: BTreeMap::new(),
            defined: BTreeSet::new(),
            next_closure: 0,
            next_adapter: 0,
        }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Emits the module for analysed `bodies`. Bodies must be free of
    /// errors; unanalysed nodes are reported, not guessed at.
    #[tracing::instrument(level = "debug", skip_all, fields(package = %self.package.name, bodies = bodies.len()))]
    pub fn generate(mut self, bodies: &[(FunctionId, FunctionBody)]) -> Result<String, CodegenError> {
        let package = self.package;
        let mut definitions = String::new();
        for (id, body) in bodies {
            let function = package.function(*id);
            self.defined.insert(llvm_ident(&function.qualified_name()));
            let style = match &function.owner {
                Some(owner) => ArgumentStyle::Method { this: owner.clone() },
                None => ArgumentStyle::Free,
            };
            let generator = FnCodeGenerator::new(
                &mut self,
                function.qualified_name(),
                &body.arena,
                body.variable_count,
                style,
            );
            definitions.push_str(&generator.generate(function, body)?);
        }
        Ok(self.finish(definitions))
    }

    fn finish(self, definitions: String) -> String {
        let mut out = String::new();
        out.push_str(&format!("; ModuleID = '{}'\n", self.package.name));
        out.push_str(&format!("source_filename = \"{}\"\n", self.package.name));
        out.push_str(&format!("target triple = \"{}\"\n\n", self.options.triple));

        out.push_str(&format!("{BOX_TYPE} = type {{ ptr, [{BOX_VALUE_WORDS} x i64] }}\n"));
        out.push_str(&format!("{META_TYPE} = type {{ ptr }}\n"));
        out.push_str("%ember.conformance = type { ptr, ptr }\n\n");

        out.push_str("declare ptr @ember_alloc(i64)\n");
        out.push_str("declare ptr @ember_string_new(ptr, i64)\n");
        out.push_str("declare ptr @ember_conformance(ptr, ptr)\n");
        out.push_str("declare ptr @ember_method(ptr, ptr)\n");
        out.push_str("declare void @ember_panic(ptr) noreturn\n");
        out.push_str("declare void @llvm.memcpy.p0.p0.i64(ptr, ptr, i64, i1)\n");
        for (symbol, declaration) in &self.callees {
            if !self.defined.contains(symbol) {
                out.push_str(declaration);
            }
        }
        out.push('\n');

        out.push_str(&definitions);
        for function in &self.synthesized {
            out.push_str(function);
        }

        for (symbol, value) in &self.strings {
            let bytes = value.as_bytes();
            out.push_str(&format!(
                "{symbol} = private unnamed_addr constant [{} x i8] c\"{}\\00\"\n",
                bytes.len() + 1,
                escape_bytes(bytes)
            ));
        }
        let mut metas = self.metas.clone();
        for (ty, _) in &self.conformances {
            metas.insert(ty.clone());
        }
        for name in &metas {
            out.push_str(&format!(
                "{} = constant {META_TYPE} {{ ptr {} }}\n",
                llvm_ident(&meta_name(name)),
                string_symbol(&format!("ember.name.{name}"))
            ));
        }
        for name in &self.protocols {
            out.push_str(&format!(
                "{} = constant {META_TYPE} {{ ptr {} }}\n",
                llvm_ident(&format!("ember.protocol.{name}")),
                string_symbol(&format!("ember.name.{name}"))
            ));
        }
        for (ty, protocol) in &self.conformances {
            out.push_str(&format!(
                "{} = constant %ember.conformance {{ ptr {}, ptr {} }}\n",
                llvm_ident(&format!("ember.conformance.{ty}.{protocol}")),
                llvm_ident(&meta_name(ty)),
                llvm_ident(&format!("ember.protocol.{protocol}"))
            ));
        }
        for constant in &self.constants {
            out.push_str(constant);
        }
        out.push_str(&self.name_strings(&metas));
        out
    }

    fn name_strings(&self, metas: &BTreeSet<String>) -> String {
        let mut out = String::new();
        let names: BTreeSet<&String> = metas.iter().chain(&self.protocols).collect();
        for name in names {
            let bytes = name.as_bytes();
            out.push_str(&format!(
                "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"\n",
                string_symbol(&format!("ember.name.{name}")),
                bytes.len() + 1,
                escape_bytes(bytes)
            ));
        }
        out
    }

    /// LLVM type of a value of `ty` as represented in storage.
    pub fn llvm_type(&self, ty: &Type) -> String {
        match classify(ty) {
            StorageType::Box => "ptr".to_string(),
            StorageType::SimpleOptional => {
                let inner = ty.optional_inner().unwrap_or(ty);
                match OptionalLayout::of(inner) {
                    OptionalLayout::Flagged => format!("{{ i1, {} }}", self.llvm_type(inner)),
                    OptionalLayout::NullPointer | OptionalLayout::Sentinel(_) => {
                        self.llvm_type(inner)
                    }
                }
            }
            StorageType::Simple => match ty.unboxed() {
                Type::Int | Type::Enum(_) => "i64".to_string(),
                Type::Real => "double".to_string(),
                Type::Bool => "i1".to_string(),
                Type::Byte => "i8".to_string(),
                Type::Symbol => "i32".to_string(),
                Type::Class { .. } | Type::TypeAsValue(_) => "ptr".to_string(),
                Type::ValueType { .. } => {
                    format!("[{} x i64]", words_of(ty, &self.package.registry))
                }
                _ => "void".to_string(),
            },
        }
    }

    /// Symbol of a package function; functions without a generated body
    /// are declared.
    pub fn function_symbol(&mut self, function: &Function) -> String {
        let symbol = llvm_ident(&function.qualified_name());
        if !self.callees.contains_key(&symbol) {
            let mut params = Vec::new();
            if let Some(owner) = &function.owner {
                params.push(self.llvm_type(owner));
            }
            params.extend(
                function
                    .params
                    .iter()
                    .map(|p| self.llvm_type(&p.ty))
                    .filter(|ty| ty != "void"),
            );
            let declaration = format!(
                "declare {} {symbol}({})\n",
                self.llvm_type(&function.ret),
                params.join(", ")
            );
            self.callees.insert(symbol.clone(), declaration);
        }
        symbol
    }

    /// Meta symbol of a non-class simple type; class metas are read from
    /// the object.
    pub fn meta_symbol(&mut self, ty: &Type) -> String {
        if ty.is_callable() {
            return self.callable_meta();
        }
        let name = ty.erased().display();
        let symbol = llvm_ident(&meta_name(&name));
        self.metas.insert(name);
        symbol
    }

    /// Shared by every callable box, closures and adapters alike.
    pub fn callable_meta(&mut self) -> String {
        self.metas.insert(CALLABLE_TYPE_NAME.to_string());
        llvm_ident(&meta_name(CALLABLE_TYPE_NAME))
    }

    pub fn protocol_symbol(&mut self, protocol: &str) -> String {
        self.protocols.insert(protocol.to_string());
        llvm_ident(&format!("ember.protocol.{protocol}"))
    }

    /// Static conformance record tagging boxes of `ty` held as `protocol`.
    pub fn conformance_symbol(&mut self, ty: &Type, protocol: &str) -> String {
        let name = ty.erased().display();
        self.protocols.insert(protocol.to_string());
        let symbol = llvm_ident(&format!("ember.conformance.{name}.{protocol}"));
        self.conformances.insert((name, protocol.to_string()));
        symbol
    }

    pub fn intern_c_string(&mut self, value: &str) -> String {
        if let Some((symbol, _)) = self.strings.iter().find(|(_, v)| v == value) {
            return symbol.clone();
        }
        let symbol = format!("@.str.{}", self.strings.len());
        self.strings.push((symbol.clone(), value.to_string()));
        symbol
    }

    /// A box that is never written, emitted as a constant.
    pub fn constant_box(&mut self, meta: &str, image: &BoxImage) -> String {
        let symbol = format!("@.box.{}", self.constants.len());
        let words = image
            .words
            .iter()
            .map(|w| format!("i64 {}", *w as i64))
            .collect::<Vec<_>>()
            .join(", ");
        self.constants.push(format!(
            "{symbol} = private unnamed_addr constant {BOX_TYPE} {{ ptr {meta}, [{BOX_VALUE_WORDS} x i64] [{words}] }}\n"
        ));
        symbol
    }

    pub fn next_closure_name(&mut self, enclosing: &str) -> String {
        let name = format!("{enclosing}.closure.{}", self.next_closure);
        self.next_closure += 1;
        name
    }

    pub fn next_adapter_name(&mut self) -> String {
        let name = format!("ember.adapter.{}", self.next_adapter);
        self.next_adapter += 1;
        name
    }

    pub fn push_function(&mut self, definition: String) {
        self.synthesized.push(definition);
    }
}

fn meta_name(type_name: &str) -> String {
    format!("ember.meta.{type_name}")
}

fn string_symbol(name: &str) -> String {
    llvm_ident(name)
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{b:02X}"));
        }
    }
    out
}
