use std::collections::HashMap;

use tracing::{debug, warn};

use super::ast::{Expr, Function, Prototype};
use super::error::{Error, Result};
use super::ir::{BinOp, IrBuilder};

/// Lowers AST nodes into IR through an `IrBuilder`.
///
/// `named_values` maps the parameters of the function being lowered to their
/// IR values; it is rebuilt on entry to every function.
pub struct Codegen<B: IrBuilder> {
    builder: B,
    named_values: HashMap<String, B::Value>,
}

impl<B: IrBuilder> Codegen<B> {
    pub fn new(builder: B) -> Self {
        Codegen {
            builder,
            named_values: HashMap::new(),
        }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut B {
        &mut self.builder
    }

    pub fn codegen_expr(&mut self, e: &Expr) -> Result<B::Value> {
        match e {
            Expr::Number(n) => Ok(self.builder.const_f64(*n)),
            Expr::Variable(name) => self
                .named_values
                .get(name)
                .copied()
                .ok_or_else(|| Error::codegen(format!("unknown variable name '{}'", name))),
            Expr::Binary(op, lhs, rhs) => {
                let lhs_val = self.codegen_expr(lhs)?;
                let rhs_val = self.codegen_expr(rhs)?;
                match op {
                    '+' => self
                        .builder
                        .build_binary(BinOp::FAdd, lhs_val, rhs_val, "addtmp"),
                    '-' => self
                        .builder
                        .build_binary(BinOp::FSub, lhs_val, rhs_val, "subtmp"),
                    '*' => self
                        .builder
                        .build_binary(BinOp::FMul, lhs_val, rhs_val, "multmp"),
                    '<' => {
                        let cmp =
                            self.builder
                                .build_binary(BinOp::FCmpUlt, lhs_val, rhs_val, "cmptmp")?;
                        self.builder.build_ui_to_fp(cmp, "booltmp")
                    }
                    _ => Err(Error::codegen(format!("invalid binary operator '{}'", op))),
                }
            }
            Expr::Call(callee, args) => {
                let callee_f = self.builder.get_function(callee).ok_or_else(|| {
                    Error::codegen(format!("unknown function referenced '{}'", callee))
                })?;
                let expected = self.builder.param_count(callee_f);
                if expected != args.len() {
                    return Err(Error::codegen(format!(
                        "incorrect number of arguments passed to '{}': expected {}, got {}",
                        callee,
                        expected,
                        args.len()
                    )));
                }

                let mut arg_vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vals.push(self.codegen_expr(arg)?);
                }
                self.builder.build_call(callee_f, &arg_vals, "calltmp")
            }
        }
    }

    /// Looks up `proto.name`, declaring it only when absent.
    pub fn codegen_proto(&mut self, proto: &Prototype) -> Result<B::Function> {
        if let Some(f) = self.builder.get_function(&proto.name) {
            debug!(name = %proto.name, "reusing existing declaration");
            return Ok(f);
        }
        Ok(self.builder.add_function(&proto.name, &proto.params))
    }

    /// Lowers a definition. A function that already has a body is never
    /// replaced, and a body that fails to lower leaves the module as it was
    /// before the call.
    pub fn codegen_func(&mut self, func: &Function) -> Result<B::Function> {
        let proto = &func.proto;
        let (the_function, created) = match self.builder.get_function(&proto.name) {
            Some(f) => {
                if self.builder.has_body(f) {
                    return Err(Error::codegen(format!(
                        "function cannot be redefined: '{}'",
                        proto.name
                    )));
                }
                if self.builder.param_count(f) != proto.params.len() {
                    return Err(Error::codegen(format!(
                        "redefinition of '{}' with different number of arguments",
                        proto.name
                    )));
                }
                (f, false)
            }
            None => (self.builder.add_function(&proto.name, &proto.params), true),
        };

        let entry = self.builder.append_block(the_function, "entry");
        self.named_values.clear();
        for (i, name) in proto.params.iter().enumerate() {
            self.builder.set_param_name(the_function, i, name);
            let value = self.builder.param(the_function, i);
            if self.named_values.insert(name.clone(), value).is_some() {
                warn!(function = %proto.name, param = %name, "duplicate parameter, last one wins");
            }
        }
        self.builder.position_at_end(entry);

        let body = match self.codegen_expr(&func.body) {
            Ok(v) => self.builder.build_ret(v),
            Err(e) => Err(e),
        };
        match body {
            Ok(()) => {
                debug!(name = %proto.name, "lowered function");
                Ok(the_function)
            }
            Err(e) => {
                if created {
                    self.builder.erase_function(the_function);
                } else {
                    self.builder.delete_body(the_function);
                }
                Err(e)
            }
        }
    }
}
