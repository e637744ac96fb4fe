use std::io::{self, BufRead, Write};

use tracing::debug;

use super::codegen::Codegen;
use super::error::{Error, Result};
use super::ir::Evaluate;
use super::parser::Parser;
use super::token::Token;

/// The read-eval-print loop: one parser per input line, every top-level
/// statement lowered as soon as it is parsed.
pub struct Driver<B: Evaluate, W: Write> {
    codegen: Codegen<B>,
    out: W,
    evaluate: bool,
}

impl<B: Evaluate, W: Write> Driver<B, W> {
    pub fn new(builder: B, out: W) -> Self {
        Driver {
            codegen: Codegen::new(builder),
            out,
            evaluate: true,
        }
    }

    /// Controls whether top-level expressions are run after lowering.
    pub fn evaluate(mut self, evaluate: bool) -> Self {
        self.evaluate = evaluate;
        self
    }

    /// Reads `input` to the end. Returns early only on a fatal error.
    pub fn main_loop<R: BufRead>(&mut self, input: R, prompt: bool) -> Result<()> {
        let mut lines = input.lines();
        loop {
            if prompt {
                eprint!("ready> ");
                io::stderr().flush()?;
            }
            let line = match lines.next() {
                Some(line) => line?,
                None => break,
            };
            self.handle_line(&line)?;
        }
        if prompt {
            eprintln!();
        }
        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) -> Result<()> {
        let mut parser = Parser::new(line)?;
        loop {
            match *parser.current() {
                Token::EndOfInput => return Ok(()),
                Token::Symbol(c) if c == ';' || c.is_whitespace() => parser.advance()?,
                Token::Def => self.handle_definition(&mut parser)?,
                Token::Extern => self.handle_extern(&mut parser)?,
                _ => self.handle_top_level_expression(&mut parser)?,
            }
        }
    }

    pub fn dump_module(&mut self) -> Result<()> {
        write!(self.out, "{}", self.codegen.builder().print_module())?;
        Ok(())
    }

    fn handle_definition(&mut self, parser: &mut Parser) -> Result<()> {
        let func = match parser.parse_definition() {
            Ok(func) => func,
            Err(e) => return self.recover(parser, e),
        };
        debug!(name = %func.proto.name, "parsed a function definition");
        match self.codegen.codegen_func(&func) {
            Ok(f) => {
                writeln!(self.out, "Read function definition:")?;
                write!(self.out, "{}", self.codegen.builder().print_function(f))?;
                Ok(())
            }
            Err(e) => self.report(&e),
        }
    }

    fn handle_extern(&mut self, parser: &mut Parser) -> Result<()> {
        let proto = match parser.parse_extern() {
            Ok(proto) => proto,
            Err(e) => return self.recover(parser, e),
        };
        debug!(name = %proto.name, "parsed an extern");
        match self.codegen.codegen_proto(&proto) {
            Ok(f) => {
                writeln!(self.out, "Read extern:")?;
                write!(self.out, "{}", self.codegen.builder().print_function(f))?;
                Ok(())
            }
            Err(e) => self.report(&e),
        }
    }

    fn handle_top_level_expression(&mut self, parser: &mut Parser) -> Result<()> {
        let func = match parser.parse_top_level_expr() {
            Ok(func) => func,
            Err(e) => return self.recover(parser, e),
        };
        debug!("parsed a top-level expression");
        let f = match self.codegen.codegen_func(&func) {
            Ok(f) => f,
            Err(e) => return self.report(&e),
        };

        writeln!(self.out, "Read top-level expression:")?;
        write!(self.out, "{}", self.codegen.builder().print_function(f))?;
        let result = if self.evaluate {
            match self.codegen.builder_mut().run_function(f) {
                Ok(v) => writeln!(self.out, "Evaluated to {}", v).map_err(Error::from),
                Err(e) => self.report(&e),
            }
        } else {
            Ok(())
        };

        // The anonymous function is never called again; dropping it frees
        // the empty name for the next expression.
        self.codegen.builder_mut().erase_function(f);
        result
    }

    /// Reports a parse failure and skips the offending token.
    fn recover(&mut self, parser: &mut Parser, e: Error) -> Result<()> {
        if e.is_fatal() {
            return Err(e);
        }
        self.report(&e)?;
        parser.advance()
    }

    fn report(&mut self, e: &Error) -> Result<()> {
        debug!(error = %e, "statement rejected");
        writeln!(self.out, "Error: {}", e)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::super::ir::Module;
    use super::*;

    fn run(input: &str) -> (Result<()>, String) {
        let mut out = Vec::new();
        let result = {
            let mut driver = Driver::new(Module::new("test"), &mut out);
            driver.main_loop(input.as_bytes(), false)
        };
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_session() {
        let (result, out) = run("extern sin(x)\ndef foo(x y) x+y*2\nfoo(1, 2);\n");
        result.unwrap();
        assert_eq!(
            out,
            "Read extern:\n\
             declare double @sin(double %x)\n\
             Read function definition:\n\
             define double @foo(double %x, double %y) {\n\
             entry:\n  \
             %multmp = fmul double %y, 2.000000e+00\n  \
             %addtmp = fadd double %x, %multmp\n  \
             ret double %addtmp\n\
             }\n\
             Read top-level expression:\n\
             define double @\"\"() {\n\
             entry:\n  \
             %calltmp = call double @foo(double 1.000000e+00, double 2.000000e+00)\n  \
             ret double %calltmp\n\
             }\n\
             Evaluated to 5\n"
        );
    }

    #[test]
    fn test_several_statements_on_one_line() {
        let (result, out) = run("1+2; 2*3; # trailing comment");
        result.unwrap();
        assert!(out.contains("Evaluated to 3\n"), "{}", out);
        assert!(out.contains("Evaluated to 6\n"), "{}", out);
    }

    #[test]
    fn test_parse_error_resynchronizes() {
        let (result, out) = run("foo(1 2)\n4*2\n");
        result.unwrap();
        assert!(
            out.starts_with("Error: expected ')' or ',' in argument list\n"),
            "{}",
            out
        );
        assert!(out.ends_with("Evaluated to 8\n"), "{}", out);
    }

    #[test]
    fn test_lowering_error_is_reported() {
        let (result, out) = run("bar(1)\ndef f(x) y\n");
        result.unwrap();
        assert!(out.contains("Error: unknown function referenced 'bar'"), "{}", out);
        assert!(out.contains("Error: unknown variable name 'y'"), "{}", out);
    }

    #[test]
    fn test_lex_error_is_fatal() {
        let (result, out) = run("1+2\n.\n3\n");
        assert!(result.unwrap_err().is_fatal());
        assert_eq!(out.matches("Evaluated to").count(), 1, "{}", out);
        assert!(out.contains("Evaluated to 3\n"), "{}", out);
    }

    #[test]
    fn test_without_evaluation() {
        let mut out = Vec::new();
        {
            let mut driver = Driver::new(Module::new("test"), &mut out).evaluate(false);
            driver.handle_line("def f(x) x").unwrap();
            driver.handle_line("f(2)").unwrap();
            driver.dump_module().unwrap();
        }
        let out = String::from_utf8(out).unwrap();
        assert!(!out.contains("Evaluated"), "{}", out);
        assert!(out.ends_with(
            "; ModuleID = 'test'\n\ndefine double @f(double %x) {\nentry:\n  ret double %x\n}\n"
        ));
    }
}
