//! The expression handle: the public entry point that ties the lexer,
//! validator, shunting-yard, and RPN executor crates together behind a
//! `compile`/`solve` API.

pub use xpr_source::{ExpError, ExpErrorKind, ExpResult, Source};
pub use xpr_value::Value;
pub use xpr_vm::FunctionOutcome;

use xpr_lexer::Token;

/// A compiled expression: owns the original source text and the RPN
/// program compiled from it, plus whatever host callbacks were registered.
/// Cheap to hold onto and `solve` repeatedly — each `solve` clones the
/// cached RPN so parameter substitution never mutates the compiled form.
pub struct Expression {
    source: String,
    rpn: Vec<Token>,
    parameter_handler: Option<Box<dyn Fn(&str) -> Option<Value>>>,
    function_handler: Option<Box<dyn Fn(&str, &[Value]) -> FunctionOutcome>>,
}

impl Expression {
    /// Lexes, folds predefined constants, validates, and compiles `source`
    /// to RPN. The returned handle has no callbacks registered yet; free
    /// identifiers will fail to solve until [`Self::set_parameter_handler`]
    /// is called.
    #[tracing::instrument(skip_all, fields(len = source.len()))]
    pub fn compile(source: &str) -> ExpResult<Self> {
        let mut tokens = xpr_lexer::lex(source)?;
        xpr_lexer::fold_predefined_constants(&mut tokens);
        xpr_parser::validate(&mut tokens)?;
        let rpn = xpr_parser::compile(&tokens)?;
        Ok(Self {
            source: source.to_string(),
            rpn,
            parameter_handler: None,
            function_handler: None,
        })
    }

    /// Clones the cached RPN and runs it to completion, substituting free
    /// identifiers and unrecognized function calls through the registered
    /// callbacks.
    ///
    /// Takes `&mut self` rather than `&self`: nothing here is actually
    /// mutated, but requiring exclusive access is what lets the borrow
    /// checker enforce (at compile time, not just by convention) that a
    /// single handle is never solved concurrently from two threads.
    #[tracing::instrument(skip_all, fields(len = self.rpn.len()))]
    pub fn solve(&mut self) -> ExpResult<Value> {
        let rpn = self.rpn.clone();
        xpr_vm::execute(
            &rpn,
            self.parameter_handler.as_deref(),
            self.function_handler.as_deref(),
        )
    }

    /// Registers the callback used to resolve free identifiers (`Parameter`
    /// tokens) the compiled RPN references. A `None` return from `f`
    /// produces `ExpError::InvalParam`.
    pub fn set_parameter_handler(&mut self, f: impl Fn(&str) -> Option<Value> + 'static) {
        self.parameter_handler = Some(Box::new(f));
    }

    /// Registers the callback invoked when a function call isn't one of
    /// the builtins in the registry.
    pub fn set_function_handler(
        &mut self,
        f: impl Fn(&str, &[Value]) -> FunctionOutcome + 'static,
    ) {
        self.function_handler = Some(Box::new(f));
    }

    /// The original source text this handle was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Expression {
    /// Textual equality of the stored source strings, mirroring the
    /// reference API's `equals(a, b)`.
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
