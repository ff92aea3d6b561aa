use std::{
    cell::RefCell,
    fs::read_to_string,
    io::{self, stdin, stdout, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

pub mod ast_printer;
mod cursor;
mod env;
pub mod error;
pub mod expr;
pub mod interpreter;
mod object;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod stmt;
pub mod token;
pub mod value;
mod visitor;

use anyhow::{Context, Result};
use log::{debug, warn};

use error::Diagnostics;
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;

/// Outcome of the runs made so far in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    StaticError,
    RuntimeError,
}

impl Status {
    /// Process exit code for a script that finished with this status.
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::StaticError => 65,
            Status::RuntimeError => 75,
        }
    }
}

/// An interpreter session. Globals, and the ids handed out to expressions,
/// carry over from one `run` to the next.
pub struct Lox {
    interpreter: Interpreter,
    errors: Box<dyn Write>,
    diagnostics: Diagnostics,
    next_expr_id: usize,
    had_error: bool,
    had_runtime_error: bool,
}

impl Default for Lox {
    fn default() -> Self {
        Lox::new()
    }
}

impl Lox {
    pub fn new() -> Self {
        Lox::with_output(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// A session printing program output to `out` and diagnostics to
    /// `errors`.
    pub fn with_output(out: Box<dyn Write>, errors: Box<dyn Write>) -> Self {
        Lox {
            interpreter: Interpreter::new(out),
            errors,
            diagnostics: Diagnostics::default(),
            next_expr_id: 0,
            had_error: false,
            had_runtime_error: false,
        }
    }

    /// Scans, parses, resolves and, if no static error was found, executes
    /// `source`.
    pub fn run(&mut self, source: &str) -> &Diagnostics {
        self.diagnostics = Diagnostics::default();

        let tokens = Scanner::new(source).scan_tokens(&mut self.diagnostics);
        let lexical_errors = self.diagnostics.errors().len();
        let mut parser =
            Parser::new(tokens, &mut self.diagnostics).starting_at(self.next_expr_id);
        let stmts = parser.parse();
        self.next_expr_id = parser.next_id();

        // a lexical error still leaves a well-formed tree; only a failed
        // parse would make resolution report follow-on errors
        if self.diagnostics.errors().len() == lexical_errors {
            let locals = Resolver::new(&mut self.diagnostics).resolve(&stmts);
            if !self.diagnostics.had_error() {
                self.interpreter.resolve(locals);
                if let Err(err) = self.interpreter.interpret(&stmts) {
                    self.diagnostics.report_runtime(err);
                }
            }
        }
        if self.diagnostics.had_error() {
            debug!(
                "not executing: {} static error(s)",
                self.diagnostics.errors().len()
            );
        }

        self.had_error |= self.diagnostics.had_error();
        self.had_runtime_error |= self.diagnostics.had_runtime_error();
        self.report();
        &self.diagnostics
    }

    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<Status> {
        let path = path.as_ref();
        let contents =
            read_to_string(path).with_context(|| format!("could not read file {:?}", path))?;
        self.run(&contents);
        Ok(self.status())
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    pub fn status(&self) -> Status {
        if self.had_error {
            Status::StaticError
        } else if self.had_runtime_error {
            Status::RuntimeError
        } else {
            Status::Ok
        }
    }

    /// Clears the error flags. Globals are kept.
    pub fn reset(&mut self) {
        self.had_error = false;
        self.had_runtime_error = false;
    }

    fn report(&mut self) {
        let static_errors = self.diagnostics.errors().iter().map(ToString::to_string);
        let runtime_error = self.diagnostics.runtime_error().map(ToString::to_string);
        for message in static_errors.chain(runtime_error) {
            if let Err(err) = writeln!(self.errors, "{}", message) {
                warn!("could not report diagnostic {:?}: {}", message, err);
            }
        }
    }
}

/// An in-memory output sink. Clones share the same buffer, so one clone can
/// be handed to a session and another used to read what it printed.
#[derive(Debug, Clone, Default)]
pub struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `source` in a fresh session, returning what it printed along with
/// its diagnostics.
pub fn run(source: &str) -> (String, Diagnostics) {
    let capture = Capture::default();
    let mut lox = Lox::with_output(Box::new(capture.clone()), Box::new(io::sink()));
    let diagnostics = lox.run(source).clone();
    (capture.contents(), diagnostics)
}

pub fn run_file(path: PathBuf) -> Result<Status> {
    Lox::new().run_file(path)
}

pub fn run_prompt() -> Result<()> {
    let mut lox = Lox::new();
    let mut reader = BufReader::new(stdin());
    loop {
        let mut buffer = String::new();
        print!("> ");
        stdout().flush().with_context(|| "could not flush stdout")?;
        let read = reader
            .read_line(&mut buffer)
            .with_context(|| "could not read from stdin")?;
        if read == 0 {
            return Ok(());
        }
        lox.run(&buffer);
        lox.reset();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn run_demo(name: &str) -> (String, String, Status) {
        let out = Capture::default();
        let errors = Capture::default();
        let mut lox = Lox::with_output(Box::new(out.clone()), Box::new(errors.clone()));
        let status = lox
            .run_file(Path::new("demos").join(name))
            .unwrap_or_else(|err| panic!("{:#}", err));
        (out.contents(), errors.contents(), status)
    }

    fn demo_output(name: &str) -> String {
        let (out, errors, status) = run_demo(name);
        assert_eq!(errors, "");
        assert_eq!(status, Status::Ok);
        out
    }

    fn lines(lines: &[&str]) -> String {
        lines.iter().map(|line| format!("{}\n", line)).collect()
    }

    #[test]
    fn unicode_support() {
        assert_eq!(run(r#"print "Hello, 世界";"#).0, "Hello, 世界\n");
    }

    #[test]
    fn expressions() {
        assert_eq!(run("print -123 * (45.67);").0, "-5617.41\n");
        assert_eq!(run("print 1 + 1;").0, "2\n");
        assert_eq!(run("print \"a\" + \"b\";").0, "ab\n");
        assert_eq!(run("print nil == nil;").0, "false\n");
        assert_eq!(run("print nil != nil;").0, "true\n");
    }

    #[test]
    fn runtime_error_reports_and_stops() {
        let (out, diagnostics) = run("print \"first\";\nprint 1 + \"a\";\nprint \"never\";");
        assert_eq!(out, "first\n");
        assert!(!diagnostics.had_error());
        assert_eq!(
            diagnostics.runtime_error().map(ToString::to_string).as_deref(),
            Some("Operands must be two numbers or two strings.\n[line 2]")
        );
    }

    #[test]
    fn lexical_error_alone_suppresses_execution() {
        let (out, diagnostics) = run("print \"before\";\n@\nprint \"after\";");
        assert_eq!(out, "");
        let messages: Vec<String> = diagnostics.errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, ["[line 2] Error: Unexpected character."]);
    }

    #[test]
    fn resolution_still_runs_after_a_lexical_error() {
        let (out, diagnostics) = run("print \"x\"; @\nfun f() { var a = 1; var a = 2; }");
        assert_eq!(out, "");
        let messages: Vec<String> = diagnostics.errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            [
                "[line 1] Error: Unexpected character.",
                "[line 2] Error at 'a': Already a variable with this name in this scope.",
            ]
        );
    }

    #[test]
    fn resolution_is_skipped_after_a_parse_error() {
        let (_, diagnostics) = run("print ;\nfun f() { var a = 1; var a = 2; }");
        assert_eq!(diagnostics.errors().len(), 1);
    }

    #[test]
    fn empty_initializer_returns_the_instance() {
        assert_eq!(run("class K { init() {} } print K().init();").0, "K instance\n");
    }

    #[test]
    fn static_errors_suppress_execution() {
        let (out, diagnostics) = run("print \"ok\";\nprint ;\nvar 1 = 2;");
        assert_eq!(out, "");
        let messages: Vec<String> = diagnostics.errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            [
                "[line 2] Error at ';': Expect expression.",
                "[line 3] Error at '1': Expect variable name.",
            ]
        );
    }

    #[test]
    fn resolution_errors_suppress_execution() {
        let (out, diagnostics) = run("print \"before\";\nreturn 1;");
        assert_eq!(out, "");
        assert_eq!(
            diagnostics.errors()[0].to_string(),
            "[line 2] Error at 'return': Can't return from top-level code."
        );
    }

    #[test]
    fn session_keeps_globals_and_closures_across_runs() {
        let out = Capture::default();
        let mut lox = Lox::with_output(Box::new(out.clone()), Box::new(io::sink()));
        lox.run("var a = 1;");
        lox.run("fun get() { var b = a; return b; }");
        lox.run("{ var c = get(); print c; }");
        lox.run("a = 2; { var d = get(); print d; }");
        assert_eq!(out.contents(), "1\n2\n");
        assert_eq!(lox.status(), Status::Ok);
    }

    #[test]
    fn error_flags_are_sticky_until_reset() {
        let errors = Capture::default();
        let mut lox = Lox::with_output(Box::new(io::sink()), Box::new(errors.clone()));
        lox.run("print missing;");
        lox.run("print 1;");
        assert!(lox.had_runtime_error());
        assert!(!lox.had_error());
        assert_eq!(lox.status(), Status::RuntimeError);
        assert_eq!(errors.contents(), "Undefined variable 'missing'.\n[line 1]\n");

        lox.reset();
        assert_eq!(lox.status(), Status::Ok);
        lox.run("print ;");
        assert_eq!(lox.status(), Status::StaticError);
        assert_eq!(lox.status().exit_code(), 65);
    }

    #[test]
    fn missing_script_is_an_io_error() {
        let mut lox = Lox::with_output(Box::new(io::sink()), Box::new(io::sink()));
        assert!(lox.run_file("demos/does-not-exist.lox").is_err());
    }

    #[test]
    fn integ_fibonacci() {
        let expected = lines(&[
            "0", "1", "1", "2", "3", "5", "8", "13", "21", "34", "55", "89", "144", "233", "377",
            "610", "987", "1597", "2584", "4181", "6765",
        ]);
        assert_eq!(demo_output("fibonacci.lox"), expected);
        assert_eq!(demo_output("fibonacci-rec.lox"), expected);
    }

    #[test]
    fn integ_stmts() {
        assert_eq!(demo_output("stmts.lox"), lines(&["one", "true", "3"]));
    }

    #[test]
    fn integ_scopes() {
        assert_eq!(
            demo_output("scopes.lox"),
            lines(&[
                "inner a", "outer b", "global c", "outer a", "outer b", "global c", "global a",
                "global b", "global c",
            ])
        );
    }

    #[test]
    fn integ_closure_binding() {
        assert_eq!(demo_output("binding.lox"), lines(&["global", "global"]));
    }

    #[test]
    fn integ_functions() {
        assert_eq!(demo_output("functions.lox"), lines(&["Hi, Dear Reader!", "6", "nil"]));
    }

    #[test]
    fn integ_counter() {
        assert_eq!(demo_output("counter.lox"), lines(&["1", "2", "1", "3"]));
    }

    #[test]
    fn integ_truthiness() {
        assert_eq!(
            demo_output("truthiness.lox"),
            lines(&["nil is falsey", "false is falsey", "0 is truthy", "empty string is truthy"])
        );
    }

    #[test]
    fn integ_classes() {
        assert_eq!(
            demo_output("classes.lox"),
            lines(&[
                "Breakfast",
                "Breakfast instance",
                "Enjoy your eggs and toast, Dear Reader.",
                "<fn serve>",
            ])
        );
    }

    #[test]
    fn integ_inheritance() {
        assert_eq!(
            demo_output("inheritance.lox"),
            lines(&["B method", "A method", "Fry until golden brown.", "Pipe full of custard."])
        );
    }

    #[test]
    fn integ_initializer() {
        assert_eq!(
            demo_output("initializer.lox"),
            lines(&["3", "4", "Point instance", "Point instance", "true"])
        );
    }

    #[test]
    fn integ_static_error() {
        let (out, errors, status) = run_demo("static-error.lox");
        assert_eq!(out, "");
        assert_eq!(
            errors,
            lines(&[
                "[line 3] Error at 'a': Already a variable with this name in this scope.",
                "[line 7] Error at 'this': Can't use 'this' outside of a class.",
            ])
        );
        assert_eq!(status, Status::StaticError);
        assert_eq!(status.exit_code(), 65);
    }

    #[test]
    fn integ_runtime_error() {
        let (out, errors, status) = run_demo("runtime-error.lox");
        assert_eq!(out, lines(&["before"]));
        assert_eq!(errors, lines(&["Undefined property 'missing'.", "[line 5]"]));
        assert_eq!(status, Status::RuntimeError);
        assert_eq!(status.exit_code(), 75);
    }
}
