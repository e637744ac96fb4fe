//! LLVM backend, enabled with the `llvm` cargo feature.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr::null_mut;

use llvm_sys::execution_engine::{
    LLVMCreateInterpreterForModule, LLVMDisposeExecutionEngine, LLVMDisposeGenericValue,
    LLVMExecutionEngineRef, LLVMGenericValueToFloat, LLVMLinkInInterpreter, LLVMRemoveModule,
    LLVMRunFunction,
};
use llvm_sys::prelude::*;
use llvm_sys::{core, LLVMRealPredicate};
use tracing::warn;

use super::error::{Error, Result};
use super::ir::{BinOp, Evaluate, IrBuilder};

fn c_string(s: &str) -> CString {
    CString::new(s).unwrap_or_default()
}

unsafe fn take_message(msg: *mut c_char) -> String {
    if msg.is_null() {
        return String::new();
    }
    let s = CStr::from_ptr(msg).to_string_lossy().into_owned();
    core::LLVMDisposeMessage(msg);
    s
}

/// Owns an LLVM context with one module and one instruction builder.
pub struct LlvmBuilder {
    context: LLVMContextRef,
    module: LLVMModuleRef,
    builder: LLVMBuilderRef,
    double_type: LLVMTypeRef,
}

impl LlvmBuilder {
    pub fn new(module_name: &str) -> Self {
        let name = c_string(module_name);
        unsafe {
            let context = core::LLVMContextCreate();
            let module = core::LLVMModuleCreateWithNameInContext(name.as_ptr(), context);
            let builder = core::LLVMCreateBuilderInContext(context);
            let double_type = core::LLVMDoubleTypeInContext(context);
            LlvmBuilder {
                context,
                module,
                builder,
                double_type,
            }
        }
    }
}

impl Drop for LlvmBuilder {
    fn drop(&mut self) {
        unsafe {
            core::LLVMDisposeBuilder(self.builder);
            core::LLVMDisposeModule(self.module);
            core::LLVMContextDispose(self.context);
        }
    }
}

impl IrBuilder for LlvmBuilder {
    type Value = LLVMValueRef;
    type Function = LLVMValueRef;
    type Block = LLVMBasicBlockRef;

    fn const_f64(&mut self, n: f64) -> LLVMValueRef {
        unsafe { core::LLVMConstReal(self.double_type, n) }
    }

    fn build_binary(
        &mut self,
        op: BinOp,
        lhs: LLVMValueRef,
        rhs: LLVMValueRef,
        name: &str,
    ) -> Result<LLVMValueRef> {
        let name = c_string(name);
        let v = unsafe {
            match op {
                BinOp::FAdd => core::LLVMBuildFAdd(self.builder, lhs, rhs, name.as_ptr()),
                BinOp::FSub => core::LLVMBuildFSub(self.builder, lhs, rhs, name.as_ptr()),
                BinOp::FMul => core::LLVMBuildFMul(self.builder, lhs, rhs, name.as_ptr()),
                BinOp::FCmpUlt => core::LLVMBuildFCmp(
                    self.builder,
                    LLVMRealPredicate::LLVMRealULT,
                    lhs,
                    rhs,
                    name.as_ptr(),
                ),
            }
        };
        Ok(v)
    }

    fn build_ui_to_fp(&mut self, v: LLVMValueRef, name: &str) -> Result<LLVMValueRef> {
        let name = c_string(name);
        Ok(unsafe { core::LLVMBuildUIToFP(self.builder, v, self.double_type, name.as_ptr()) })
    }

    fn build_call(
        &mut self,
        callee: LLVMValueRef,
        args: &[LLVMValueRef],
        name: &str,
    ) -> Result<LLVMValueRef> {
        let name = c_string(name);
        let mut args = args.to_vec();
        Ok(unsafe {
            core::LLVMBuildCall(
                self.builder,
                callee,
                args.as_mut_ptr(),
                args.len() as u32,
                name.as_ptr(),
            )
        })
    }

    fn build_ret(&mut self, v: LLVMValueRef) -> Result<()> {
        unsafe {
            core::LLVMBuildRet(self.builder, v);
        }
        Ok(())
    }

    fn get_function(&self, name: &str) -> Option<LLVMValueRef> {
        let name = c_string(name);
        let f = unsafe { core::LLVMGetNamedFunction(self.module, name.as_ptr()) };
        if f.is_null() {
            None
        } else {
            Some(f)
        }
    }

    fn add_function(&mut self, name: &str, params: &[String]) -> LLVMValueRef {
        let c_name = c_string(name);
        let mut param_types = vec![self.double_type; params.len()];
        unsafe {
            let fn_type = core::LLVMFunctionType(
                self.double_type,
                param_types.as_mut_ptr(),
                param_types.len() as u32,
                0,
            );
            let f = core::LLVMAddFunction(self.module, c_name.as_ptr(), fn_type);
            for (i, p) in params.iter().enumerate() {
                let p = c_string(p);
                core::LLVMSetValueName(core::LLVMGetParam(f, i as u32), p.as_ptr());
            }
            f
        }
    }

    fn param_count(&self, f: LLVMValueRef) -> usize {
        unsafe { core::LLVMCountParams(f) as usize }
    }

    fn param(&self, f: LLVMValueRef, index: usize) -> LLVMValueRef {
        unsafe { core::LLVMGetParam(f, index as u32) }
    }

    fn set_param_name(&mut self, f: LLVMValueRef, index: usize, name: &str) {
        let name = c_string(name);
        unsafe { core::LLVMSetValueName(core::LLVMGetParam(f, index as u32), name.as_ptr()) }
    }

    fn has_body(&self, f: LLVMValueRef) -> bool {
        unsafe { core::LLVMCountBasicBlocks(f) > 0 }
    }

    fn append_block(&mut self, f: LLVMValueRef, name: &str) -> LLVMBasicBlockRef {
        let name = c_string(name);
        unsafe { core::LLVMAppendBasicBlockInContext(self.context, f, name.as_ptr()) }
    }

    fn position_at_end(&mut self, block: LLVMBasicBlockRef) {
        unsafe { core::LLVMPositionBuilderAtEnd(self.builder, block) }
    }

    fn delete_body(&mut self, f: LLVMValueRef) {
        unsafe {
            loop {
                let bb = core::LLVMGetLastBasicBlock(f);
                if bb.is_null() {
                    break;
                }
                core::LLVMDeleteBasicBlock(bb);
            }
        }
    }

    fn erase_function(&mut self, f: LLVMValueRef) {
        unsafe { core::LLVMDeleteFunction(f) }
    }

    fn print_function(&self, f: LLVMValueRef) -> String {
        unsafe { take_message(core::LLVMPrintValueToString(f)) }
    }

    fn print_module(&self) -> String {
        unsafe { take_message(core::LLVMPrintModuleToString(self.module)) }
    }
}

impl Evaluate for LlvmBuilder {
    /// Runs `f` in LLVM's interpreter. The module is handed to a fresh
    /// execution engine and taken back afterwards so later definitions can
    /// still be added to it.
    fn run_function(&mut self, f: LLVMValueRef) -> Result<f64> {
        unsafe {
            LLVMLinkInInterpreter();

            let mut engine: LLVMExecutionEngineRef = null_mut();
            let mut err: *mut c_char = null_mut();
            if LLVMCreateInterpreterForModule(&mut engine, self.module, &mut err) != 0 {
                return Err(Error::eval(take_message(err)));
            }

            let result = LLVMRunFunction(engine, f, 0, null_mut());
            let n = LLVMGenericValueToFloat(self.double_type, result);
            LLVMDisposeGenericValue(result);

            let mut module = null_mut();
            if LLVMRemoveModule(engine, self.module, &mut module, &mut err) != 0 {
                // The engine still owns `self.module` and `Drop` frees it, so
                // the engine is leaked rather than disposed.
                let msg = take_message(err);
                warn!(error = %msg, "could not detach the module from the interpreter");
                return Err(Error::eval(msg));
            }
            LLVMDisposeExecutionEngine(engine);

            Ok(n)
        }
    }
}
