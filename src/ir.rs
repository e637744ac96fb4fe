//! IR construction.
//!
//! `IrBuilder` is the seam between lowering and a backend. `Module` is the
//! default backend: a small SSA form over doubles that prints in LLVM's
//! textual syntax and can evaluate the functions it holds.

use super::error::{Error, Result};
use std::collections::HashMap;
use std::fmt::Write;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    FAdd,
    FSub,
    FMul,
    /// Unordered less-than; yields a boolean.
    FCmpUlt,
}

impl BinOp {
    fn mnemonic(self) -> &'static str {
        match self {
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FCmpUlt => "fcmp ult",
        }
    }
}

/// Operations lowering needs from a backend. Every function takes and
/// returns doubles.
pub trait IrBuilder {
    type Value: Copy;
    type Function: Copy + PartialEq + std::fmt::Debug;
    type Block: Copy;

    fn const_f64(&mut self, n: f64) -> Self::Value;
    fn build_binary(
        &mut self,
        op: BinOp,
        lhs: Self::Value,
        rhs: Self::Value,
        name: &str,
    ) -> Result<Self::Value>;
    /// Widens a boolean to 0.0 / 1.0.
    fn build_ui_to_fp(&mut self, v: Self::Value, name: &str) -> Result<Self::Value>;
    fn build_call(
        &mut self,
        callee: Self::Function,
        args: &[Self::Value],
        name: &str,
    ) -> Result<Self::Value>;
    fn build_ret(&mut self, v: Self::Value) -> Result<()>;

    fn get_function(&self, name: &str) -> Option<Self::Function>;
    fn add_function(&mut self, name: &str, params: &[String]) -> Self::Function;
    fn param_count(&self, f: Self::Function) -> usize;
    fn param(&self, f: Self::Function, index: usize) -> Self::Value;
    fn set_param_name(&mut self, f: Self::Function, index: usize, name: &str);
    fn has_body(&self, f: Self::Function) -> bool;
    fn append_block(&mut self, f: Self::Function, name: &str) -> Self::Block;
    fn position_at_end(&mut self, block: Self::Block);
    /// Drops every block of `f`, turning it back into a declaration.
    fn delete_body(&mut self, f: Self::Function);
    fn erase_function(&mut self, f: Self::Function);

    fn print_function(&self, f: Self::Function) -> String;
    fn print_module(&self) -> String;
}

/// A backend able to run the functions it has built.
pub trait Evaluate: IrBuilder {
    fn run_function(&mut self, f: Self::Function) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Const(f64),
    Bool(bool),
    Param(usize),
    Temp(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId {
    function: FunctionId,
    index: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum InstKind {
    Binary(BinOp, Value, Value),
    UiToFp(Value),
    Call(FunctionId, Vec<Value>),
    Ret(Value),
}

#[derive(Debug, Clone)]
struct Inst {
    result: Option<usize>,
    kind: InstKind,
}

#[derive(Debug, Clone)]
struct Block {
    label: String,
    insts: Vec<Inst>,
}

#[derive(Debug, Clone)]
struct FunctionDef {
    name: String,
    params: Vec<String>,
    blocks: Vec<Block>,
    temps: Vec<String>,
}

impl FunctionDef {
    fn is_taken(&self, name: &str, skip_param: Option<usize>) -> bool {
        self.params
            .iter()
            .enumerate()
            .any(|(i, p)| Some(i) != skip_param && p == name)
            || self.temps.iter().any(|t| t == name)
    }

    // Same scheme as LLVM: "addtmp", "addtmp1", "addtmp2", ...
    fn unique_name(&self, base: &str, skip_param: Option<usize>) -> String {
        if !self.is_taken(base, skip_param) {
            return base.to_owned();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", base, n);
            if !self.is_taken(&candidate, skip_param) {
                return candidate;
            }
            n += 1;
        }
    }

    fn operand(&self, v: Value) -> String {
        match v {
            Value::Const(n) => format_double(n),
            Value::Bool(b) => b.to_string(),
            Value::Param(i) => format!("%{}", self.params[i]),
            Value::Temp(i) => format!("%{}", self.temps[i]),
        }
    }

    fn global_name(&self) -> String {
        if self.name.is_empty() {
            "@\"\"".to_owned()
        } else {
            format!("@{}", self.name)
        }
    }
}

/// Prints a double the way LLVM's assembly writer does: `%e` notation when
/// that reads back to the same value, the bit pattern in hex otherwise.
fn format_double(n: f64) -> String {
    if n.is_finite() {
        let text = format!("{:.6e}", n);
        if let Some(pos) = text.find('e') {
            let (mantissa, exp) = text.split_at(pos);
            let exp = &exp[1..];
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            let text = format!("{}e{}{:0>2}", mantissa, sign, digits);
            if text.parse::<f64>() == Ok(n) {
                return text;
            }
        }
    }
    format!("0x{:016X}", n.to_bits())
}

const MAX_CALL_DEPTH: usize = 256;

// An erased slot bumps its generation before reuse, so stale ids miss.
#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    def: Option<FunctionDef>,
}

/// Default in-crate backend.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    slots: Vec<Slot>,
    free: Vec<usize>,
    names: HashMap<String, FunctionId>,
    cursor: Option<BlockId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            slots: Vec::new(),
            free: Vec::new(),
            names: HashMap::new(),
            cursor: None,
        }
    }

    fn def(&self, f: FunctionId) -> Option<&FunctionDef> {
        self.slots
            .get(f.index)
            .filter(|slot| slot.generation == f.generation)
            .and_then(|slot| slot.def.as_ref())
    }

    fn def_mut(&mut self, f: FunctionId) -> Option<&mut FunctionDef> {
        self.slots
            .get_mut(f.index)
            .filter(|slot| slot.generation == f.generation)
            .and_then(|slot| slot.def.as_mut())
    }

    fn live_functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.def.is_some())
            .map(|(index, slot)| FunctionId {
                index,
                generation: slot.generation,
            })
    }

    fn insert(&mut self, kind: InstKind, name: Option<&str>) -> Result<Option<Value>> {
        let cursor = self
            .cursor
            .ok_or_else(|| Error::codegen("no insertion point"))?;
        let def = self
            .def_mut(cursor.function)
            .ok_or_else(|| Error::codegen("no insertion point"))?;

        let result = name.map(|name| {
            let unique = def.unique_name(name, None);
            def.temps.push(unique);
            def.temps.len() - 1
        });
        def.blocks[cursor.index].insts.push(Inst { result, kind });

        Ok(result.map(Value::Temp))
    }

    fn insert_value(&mut self, kind: InstKind, name: &str) -> Result<Value> {
        self.insert(kind, Some(name))?
            .ok_or_else(|| Error::codegen("instruction produced no value"))
    }

    /// Runs `f` with the given arguments.
    ///
    /// Declarations without a body resolve to a fixed set of host math
    /// functions.
    pub fn run(&self, f: FunctionId, args: &[f64]) -> Result<f64> {
        self.call(f, args, 0)
    }

    fn call(&self, f: FunctionId, args: &[f64], depth: usize) -> Result<f64> {
        if depth > MAX_CALL_DEPTH {
            return Err(Error::eval(format!(
                "call depth exceeded {} frames",
                MAX_CALL_DEPTH
            )));
        }
        let def = self
            .def(f)
            .ok_or_else(|| Error::eval("call to an erased function"))?;
        if def.params.len() != args.len() {
            return Err(Error::eval(format!(
                "'{}' expects {} arguments, got {}",
                def.name,
                def.params.len(),
                args.len()
            )));
        }

        let entry = match def.blocks.first() {
            Some(entry) => entry,
            None => {
                return builtin(&def.name, args).ok_or_else(|| {
                    Error::eval(format!("unresolved external function '{}'", def.name))
                })
            }
        };

        let mut temps = vec![0.0; def.temps.len()];
        for inst in &entry.insts {
            let read = |v: &Value| match *v {
                Value::Const(n) => n,
                Value::Bool(b) => bool_to_f64(b),
                Value::Param(i) => args[i],
                Value::Temp(i) => temps[i],
            };
            let v = match &inst.kind {
                InstKind::Binary(op, lhs, rhs) => fold(*op, read(lhs), read(rhs)),
                InstKind::UiToFp(v) => read(v),
                InstKind::Call(callee, call_args) => {
                    let call_args: Vec<f64> = call_args.iter().map(read).collect();
                    self.call(*callee, &call_args, depth + 1)?
                }
                InstKind::Ret(v) => return Ok(read(v)),
            };
            if let Some(t) = inst.result {
                temps[t] = v;
            }
        }

        Err(Error::eval(format!("'{}' does not return", def.name)))
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn fold(op: BinOp, l: f64, r: f64) -> f64 {
    match op {
        BinOp::FAdd => l + r,
        BinOp::FSub => l - r,
        BinOp::FMul => l * r,
        BinOp::FCmpUlt => bool_to_f64(!(l >= r)),
    }
}

fn builtin(name: &str, args: &[f64]) -> Option<f64> {
    let v = match (name, args) {
        ("sin", [x]) => x.sin(),
        ("cos", [x]) => x.cos(),
        ("tan", [x]) => x.tan(),
        ("sqrt", [x]) => x.sqrt(),
        ("exp", [x]) => x.exp(),
        ("log", [x]) => x.ln(),
        ("fabs", [x]) => x.abs(),
        ("floor", [x]) => x.floor(),
        ("ceil", [x]) => x.ceil(),
        ("pow", [x, y]) => x.powf(*y),
        ("atan2", [y, x]) => y.atan2(*x),
        ("putchard", [x]) => {
            eprint!("{}", (*x as u8) as char);
            0.0
        }
        ("printd", [x]) => {
            eprintln!("{}", x);
            0.0
        }
        _ => return None,
    };
    Some(v)
}

impl IrBuilder for Module {
    type Value = Value;
    type Function = FunctionId;
    type Block = BlockId;

    fn const_f64(&mut self, n: f64) -> Value {
        Value::Const(n)
    }

    fn build_binary(&mut self, op: BinOp, lhs: Value, rhs: Value, name: &str) -> Result<Value> {
        match (op, lhs, rhs) {
            (BinOp::FCmpUlt, Value::Const(l), Value::Const(r)) => Ok(Value::Bool(!(l >= r))),
            (_, Value::Const(l), Value::Const(r)) => Ok(Value::Const(fold(op, l, r))),
            _ => self.insert_value(InstKind::Binary(op, lhs, rhs), name),
        }
    }

    fn build_ui_to_fp(&mut self, v: Value, name: &str) -> Result<Value> {
        match v {
            Value::Bool(b) => Ok(Value::Const(bool_to_f64(b))),
            _ => self.insert_value(InstKind::UiToFp(v), name),
        }
    }

    fn build_call(&mut self, callee: FunctionId, args: &[Value], name: &str) -> Result<Value> {
        self.insert_value(InstKind::Call(callee, args.to_vec()), name)
    }

    fn build_ret(&mut self, v: Value) -> Result<()> {
        self.insert(InstKind::Ret(v), None).map(|_| ())
    }

    fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.names.get(name).copied()
    }

    fn add_function(&mut self, name: &str, params: &[String]) -> FunctionId {
        let mut def = FunctionDef {
            name: name.to_owned(),
            params: Vec::with_capacity(params.len()),
            blocks: Vec::new(),
            temps: Vec::new(),
        };
        for p in params {
            let unique = def.unique_name(p, None);
            def.params.push(unique);
        }

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.def = Some(def);
                FunctionId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    def: Some(def),
                });
                FunctionId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        self.names.entry(name.to_owned()).or_insert(id);
        trace!(name = name, arity = params.len(), "declared function");
        id
    }

    fn param_count(&self, f: FunctionId) -> usize {
        self.def(f).map_or(0, |d| d.params.len())
    }

    fn param(&self, _f: FunctionId, index: usize) -> Value {
        Value::Param(index)
    }

    fn set_param_name(&mut self, f: FunctionId, index: usize, name: &str) {
        if let Some(def) = self.def_mut(f) {
            if index < def.params.len() {
                def.params[index] = def.unique_name(name, Some(index));
            }
        }
    }

    fn has_body(&self, f: FunctionId) -> bool {
        self.def(f).map_or(false, |d| !d.blocks.is_empty())
    }

    fn append_block(&mut self, f: FunctionId, name: &str) -> BlockId {
        let index = match self.def_mut(f) {
            Some(def) => {
                def.blocks.push(Block {
                    label: name.to_owned(),
                    insts: Vec::new(),
                });
                def.blocks.len() - 1
            }
            None => 0,
        };
        BlockId { function: f, index }
    }

    fn position_at_end(&mut self, block: BlockId) {
        self.cursor = Some(block);
    }

    fn delete_body(&mut self, f: FunctionId) {
        if let Some(def) = self.def_mut(f) {
            def.blocks.clear();
            def.temps.clear();
        }
        if self.cursor.map_or(false, |c| c.function == f) {
            self.cursor = None;
        }
    }

    fn erase_function(&mut self, f: FunctionId) {
        self.delete_body(f);
        let def = match self.slots.get_mut(f.index) {
            Some(slot) if slot.generation == f.generation => {
                let def = slot.def.take();
                if def.is_some() {
                    slot.generation = slot.generation.wrapping_add(1);
                    self.free.push(f.index);
                }
                def
            }
            _ => None,
        };
        if let Some(def) = def {
            if self.names.get(&def.name) == Some(&f) {
                self.names.remove(&def.name);
            }
            trace!(name = %def.name, "erased function");
        }
    }

    fn print_function(&self, f: FunctionId) -> String {
        let def = match self.def(f) {
            Some(def) => def,
            None => return String::new(),
        };
        let params = def
            .params
            .iter()
            .map(|p| format!("double %{}", p))
            .collect::<Vec<_>>()
            .join(", ");

        if def.blocks.is_empty() {
            return format!("declare double {}({})\n", def.global_name(), params);
        }

        let mut out = format!("define double {}({}) {{\n", def.global_name(), params);
        for block in &def.blocks {
            let _ = writeln!(out, "{}:", block.label);
            for inst in &block.insts {
                let dest = inst
                    .result
                    .map(|t| format!("%{} = ", def.temps[t]))
                    .unwrap_or_default();
                let body = match &inst.kind {
                    InstKind::Binary(op, lhs, rhs) => format!(
                        "{} double {}, {}",
                        op.mnemonic(),
                        def.operand(*lhs),
                        def.operand(*rhs)
                    ),
                    InstKind::UiToFp(v) => format!("uitofp i1 {} to double", def.operand(*v)),
                    InstKind::Call(callee, args) => {
                        let callee = self
                            .def(*callee)
                            .map(|c| c.global_name())
                            .unwrap_or_else(|| "@<erased>".to_owned());
                        let args = args
                            .iter()
                            .map(|a| format!("double {}", def.operand(*a)))
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!("call double {}({})", callee, args)
                    }
                    InstKind::Ret(v) => format!("ret double {}", def.operand(*v)),
                };
                let _ = writeln!(out, "  {}{}", dest, body);
            }
        }
        out.push_str("}\n");
        out
    }

    fn print_module(&self) -> String {
        let mut out = format!("; ModuleID = '{}'\n", self.name);
        for f in self.live_functions() {
            out.push('\n');
            out.push_str(&self.print_function(f));
        }
        out
    }
}

impl Evaluate for Module {
    fn run_function(&mut self, f: FunctionId) -> Result<f64> {
        self.run(f, &[])
    }
}
