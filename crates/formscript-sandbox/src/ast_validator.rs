//! AST analysis of form scripts.
//!
//! Uses `oxc_parser` to parse the script once. The parse doubles as the
//! syntax check, decides the [`ScriptForm`] (does the script declare
//! `processForm` at top level?) and feeds a walker that rejects references to
//! disabled capabilities before any isolate is created.
//!
//! The walker is defense-in-depth. The isolate bootstrap replaces the same
//! capabilities with traps, so anything the walker misses still fails at
//! runtime.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::{ParseOptions, Parser};
use oxc_span::SourceType;

use crate::entry::{ScriptForm, ENTRY_FUNCTION};
use crate::error::ExecutionError;

/// Maximum nesting depth before we reject the code.
/// Prevents parser stack overflow on deeply nested input.
const MAX_NESTING_DEPTH: usize = 256;

/// Problems detected while analysing a script.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AstViolation {
    /// Parser could not parse the code.
    ParseError(String),
    /// Code exceeds maximum nesting depth.
    NestingTooDeep {
        /// Maximum allowed nesting depth.
        max: usize,
        /// Actual detected nesting depth.
        actual: usize,
    },
    /// A disabled capability is referenced.
    BannedPattern {
        /// Human-readable description of the violation.
        description: String,
    },
}

impl std::fmt::Display for AstViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseError(msg) => write!(f, "parse error: {msg}"),
            Self::NestingTooDeep { max, actual } => {
                write!(f, "nesting depth {actual} exceeds maximum {max}")
            }
            Self::BannedPattern { description } => write!(f, "{description}"),
        }
    }
}

impl From<AstViolation> for ExecutionError {
    fn from(v: AstViolation) -> Self {
        match v {
            AstViolation::ParseError(message) => ExecutionError::Syntax { message },
            other @ AstViolation::NestingTooDeep { .. } => ExecutionError::Violation {
                description: other.to_string(),
            },
            AstViolation::BannedPattern { description } => {
                ExecutionError::Violation { description }
            }
        }
    }
}

/// Check nesting depth of brackets/braces/parens BEFORE parsing.
///
/// Brackets inside string literals, template text, comments and regex
/// literals do not count. Template substitutions (`${ ... }`) do.
pub fn check_nesting_depth(code: &str) -> Result<(), AstViolation> {
    let bytes = code.as_bytes();
    let mut depth: usize = 0;
    let mut max_depth: usize = 0;
    // Depths at which an enclosing template literal resumes.
    let mut templates: Vec<usize> = Vec::new();
    // Last significant byte outside literals, used to tell `/` from a regex.
    let mut prev: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match b {
            b'\'' | b'"' => {
                i = skip_quoted(bytes, i);
                prev = Some(b'"');
                continue;
            }
            b'`' => {
                i = enter_template(bytes, i + 1, &mut templates, &mut depth, &mut max_depth);
                prev = Some(b'"');
                continue;
            }
            b'/' if next == Some(b'/') => {
                i = bytes[i..]
                    .iter()
                    .position(|&c| c == b'\n')
                    .map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'/' if next == Some(b'*') => {
                i = code[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                continue;
            }
            b'/' if regex_allowed(prev) => {
                i = skip_regex(bytes, i);
                prev = Some(b'"');
                continue;
            }
            b'{' | b'[' | b'(' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if templates.last() == Some(&depth) {
                    templates.pop();
                    i = enter_template(bytes, i + 1, &mut templates, &mut depth, &mut max_depth);
                    prev = Some(b'"');
                    continue;
                }
            }
            b']' | b')' => {
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            prev = Some(b);
        }
        i += 1;
    }

    if max_depth > MAX_NESTING_DEPTH {
        return Err(AstViolation::NestingTooDeep {
            max: MAX_NESTING_DEPTH,
            actual: max_depth,
        });
    }
    Ok(())
}

/// Skip a quoted string starting at `start`; returns the index after it.
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Scan template text from `start`. Stops after the closing backtick, or
/// just inside a `${` substitution, which counts as one level of nesting.
fn enter_template(
    bytes: &[u8],
    start: usize,
    templates: &mut Vec<usize>,
    depth: &mut usize,
    max_depth: &mut usize,
) -> usize {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return i + 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                templates.push(*depth);
                *depth += 1;
                *max_depth = (*max_depth).max(*depth);
                return i + 2;
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skip a regex literal starting at `start`, including `[...]` classes.
fn skip_regex(bytes: &[u8], start: usize) -> usize {
    let mut in_class = false;
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Whether a `/` after `prev` starts a regex literal rather than a division.
fn regex_allowed(prev: Option<u8>) -> bool {
    match prev {
        None => true,
        Some(c) => b"(,=:[!&|?{};+-*%<>~^".contains(&c),
    }
}

/// Parse a form script, reject disabled capabilities, and resolve its shape.
///
/// The script is parsed as a classic script with `return` allowed at top
/// level, because raw statements become the body of `processForm`.
pub fn analyze(code: &str) -> Result<ScriptForm, AstViolation> {
    check_nesting_depth(code)?;

    let allocator = Allocator::default();
    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let ret = Parser::new(&allocator, code, SourceType::cjs())
        .with_options(options)
        .parse();

    if ret.panicked {
        return Err(AstViolation::ParseError(
            "parser gave up on malformed input".into(),
        ));
    }
    if let Some(first) = ret.errors.first() {
        return Err(AstViolation::ParseError(first.to_string()));
    }

    let mut walker = AstWalker { violations: vec![] };
    for stmt in &ret.program.body {
        walker.walk_statement(stmt);
        if !walker.violations.is_empty() {
            return Err(walker.violations.remove(0));
        }
    }

    Ok(ScriptForm::new(code, declares_entry(&ret.program)))
}

/// Whether the program declares `processForm` at top level.
fn declares_entry(program: &Program<'_>) -> bool {
    program.body.iter().any(|stmt| match stmt {
        Statement::FunctionDeclaration(fd) => fd
            .id
            .as_ref()
            .is_some_and(|id| id.name.as_str() == ENTRY_FUNCTION),
        Statement::VariableDeclaration(decl) => decl.declarations.iter().any(|d| {
            let named = matches!(
                &d.id.kind,
                BindingPatternKind::BindingIdentifier(id) if id.name.as_str() == ENTRY_FUNCTION
            );
            let is_function = matches!(
                &d.init,
                Some(Expression::FunctionExpression(_) | Expression::ArrowFunctionExpression(_))
            );
            named && is_function
        }),
        _ => false,
    })
}

/// Recursive AST walker that collects capability violations.
struct AstWalker {
    violations: Vec<AstViolation>,
}

impl AstWalker {
    fn report(&mut self, description: impl Into<String>) {
        self.violations.push(AstViolation::BannedPattern {
            description: description.into(),
        });
    }

    fn has_violation(&self) -> bool {
        !self.violations.is_empty()
    }

    // --- Expression checks ---

    fn check_identifier(&mut self, name: &str) {
        // Bare `eval`/`Function` are left to the runtime traps so that
        // `typeof eval` stays a harmless check.
        if name == "WebAssembly" {
            self.report("WebAssembly is not available in the sandbox");
        }
    }

    fn check_call_callee(&mut self, callee: &Expression<'_>) {
        match callee {
            Expression::Identifier(ident) => match ident.name.as_str() {
                "eval" => self.report("eval() is not available in the sandbox"),
                "Function" | "AsyncFunction" | "GeneratorFunction" => self.report(format!(
                    "{}() constructor is not available in the sandbox",
                    ident.name
                )),
                "require" => self.report("require() is not available in the sandbox"),
                _ => {}
            },
            Expression::StaticMemberExpression(member) => {
                if let Expression::Identifier(obj) = &member.object {
                    if obj.name.as_str() == "globalThis" && member.property.name.as_str() == "eval"
                    {
                        self.report("eval() is not available in the sandbox");
                    }
                }
            }
            _ => {}
        }
    }

    fn check_new_callee(&mut self, callee: &Expression<'_>) {
        match callee {
            Expression::Identifier(ident) => {
                if let "Function" | "AsyncFunction" | "GeneratorFunction" = ident.name.as_str() {
                    self.report(format!(
                        "new {}() is not available in the sandbox",
                        ident.name
                    ));
                }
            }
            Expression::StaticMemberExpression(member) => {
                if let Expression::Identifier(obj) = &member.object {
                    if obj.name.as_str() == "WebAssembly" {
                        self.report("WebAssembly is not available in the sandbox");
                    }
                }
            }
            _ => {}
        }
    }

    fn check_static_member(&mut self, expr: &StaticMemberExpression<'_>) {
        let prop = expr.property.name.as_str();

        // obj.constructor.constructor reaches the Function constructor
        if prop == "constructor" {
            if let Expression::StaticMemberExpression(inner) = &expr.object {
                if inner.property.name.as_str() == "constructor" {
                    self.report("constructor.constructor chain is not allowed in the sandbox");
                    return;
                }
            }
        }

        if let Expression::Identifier(obj) = &expr.object {
            match obj.name.as_str() {
                "Deno" => self.report("Deno.* is not available in the sandbox"),
                "process" => match prop {
                    "env" | "exit" | "argv" | "stdin" | "stdout" | "stderr" | "kill"
                    | "binding" | "dlopen" => {
                        self.report(format!("process.{prop} is not available in the sandbox"));
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }

    fn check_computed_member(&mut self, expr: &ComputedMemberExpression<'_>) {
        if let Expression::Identifier(obj) = &expr.object {
            if obj.name.as_str() == "globalThis" {
                self.report("globalThis[...] computed access is not allowed in the sandbox");
                return;
            }
        }
        if let Expression::StringLiteral(lit) = &expr.expression {
            match lit.value.as_str() {
                "constructor" => {
                    self.report("computed [\"constructor\"] access is not allowed in the sandbox")
                }
                "eval" => self.report("computed [\"eval\"] access is not allowed in the sandbox"),
                _ => {}
            }
        }
    }

    fn check_meta_property(&mut self, expr: &MetaProperty<'_>) {
        if expr.meta.name.as_str() == "import" && expr.property.name.as_str() == "meta" {
            self.report("import.meta is not available in the sandbox");
        }
    }

    // --- Walk methods ---

    fn walk_statements(&mut self, stmts: &[Statement<'_>]) {
        for s in stmts {
            self.walk_statement(s);
            if self.has_violation() {
                return;
            }
        }
    }

    fn walk_statement(&mut self, stmt: &Statement<'_>) {
        if self.has_violation() {
            return;
        }
        match stmt {
            Statement::ExpressionStatement(es) => self.walk_expression(&es.expression),
            Statement::BlockStatement(block) => self.walk_statements(&block.body),
            Statement::IfStatement(ifs) => {
                self.walk_expression(&ifs.test);
                self.walk_statement(&ifs.consequent);
                if let Some(alt) = &ifs.alternate {
                    self.walk_statement(alt);
                }
            }
            Statement::ReturnStatement(ret) => {
                if let Some(arg) = &ret.argument {
                    self.walk_expression(arg);
                }
            }
            Statement::VariableDeclaration(decl) => self.walk_declaration(decl),
            Statement::ForStatement(fors) => {
                if let Some(init) = &fors.init {
                    match init {
                        ForStatementInit::VariableDeclaration(decl) => {
                            self.walk_declaration(decl)
                        }
                        _ => {
                            if let Some(expr) = init.as_expression() {
                                self.walk_expression(expr);
                            }
                        }
                    }
                }
                if let Some(test) = &fors.test {
                    self.walk_expression(test);
                }
                if let Some(update) = &fors.update {
                    self.walk_expression(update);
                }
                self.walk_statement(&fors.body);
            }
            Statement::ForInStatement(fis) => {
                self.walk_expression(&fis.right);
                self.walk_statement(&fis.body);
            }
            Statement::ForOfStatement(fos) => {
                self.walk_expression(&fos.right);
                self.walk_statement(&fos.body);
            }
            Statement::WhileStatement(ws) => {
                self.walk_expression(&ws.test);
                self.walk_statement(&ws.body);
            }
            Statement::DoWhileStatement(dws) => {
                self.walk_statement(&dws.body);
                self.walk_expression(&dws.test);
            }
            Statement::WithStatement(_) => {
                self.report("with statement is not allowed in the sandbox");
            }
            Statement::SwitchStatement(ss) => {
                self.walk_expression(&ss.discriminant);
                for case in &ss.cases {
                    if let Some(test) = &case.test {
                        self.walk_expression(test);
                    }
                    self.walk_statements(&case.consequent);
                }
            }
            Statement::TryStatement(ts) => {
                self.walk_statements(&ts.block.body);
                if let Some(handler) = &ts.handler {
                    self.walk_statements(&handler.body.body);
                }
                if let Some(finalizer) = &ts.finalizer {
                    self.walk_statements(&finalizer.body);
                }
            }
            Statement::ThrowStatement(ts) => self.walk_expression(&ts.argument),
            Statement::LabeledStatement(ls) => self.walk_statement(&ls.body),
            Statement::FunctionDeclaration(fd) => {
                if let Some(body) = &fd.body {
                    self.walk_statements(&body.statements);
                }
            }
            Statement::ClassDeclaration(cd) => self.walk_class_body(&cd.body),
            // BreakStatement, ContinueStatement, EmptyStatement, DebuggerStatement
            _ => {}
        }
    }

    fn walk_declaration(&mut self, decl: &VariableDeclaration<'_>) {
        for declarator in &decl.declarations {
            if let Some(init) = &declarator.init {
                self.walk_expression(init);
                if self.has_violation() {
                    return;
                }
            }
        }
    }

    fn walk_class_body(&mut self, body: &ClassBody<'_>) {
        for element in &body.body {
            match element {
                ClassElement::MethodDefinition(md) => {
                    if let Some(body) = &md.value.body {
                        self.walk_statements(&body.statements);
                    }
                }
                ClassElement::PropertyDefinition(pd) => {
                    if let Some(val) = &pd.value {
                        self.walk_expression(val);
                    }
                }
                ClassElement::StaticBlock(sb) => self.walk_statements(&sb.body),
                _ => {}
            }
            if self.has_violation() {
                return;
            }
        }
    }

    fn walk_arguments(&mut self, args: &[Argument<'_>]) {
        for arg in args {
            match arg {
                Argument::SpreadElement(spread) => self.walk_expression(&spread.argument),
                _ => {
                    if let Some(expr) = arg.as_expression() {
                        self.walk_expression(expr);
                    }
                }
            }
            if self.has_violation() {
                return;
            }
        }
    }

    fn walk_expression(&mut self, expr: &Expression<'_>) {
        if self.has_violation() {
            return;
        }
        match expr {
            Expression::Identifier(ident) => self.check_identifier(ident.name.as_str()),
            Expression::CallExpression(call) => {
                self.check_call_callee(&call.callee);
                self.walk_expression(&call.callee);
                self.walk_arguments(&call.arguments);
            }
            Expression::NewExpression(new_expr) => {
                self.check_new_callee(&new_expr.callee);
                self.walk_expression(&new_expr.callee);
                self.walk_arguments(&new_expr.arguments);
            }
            Expression::StaticMemberExpression(member) => {
                self.check_static_member(member);
                self.walk_expression(&member.object);
            }
            Expression::ComputedMemberExpression(member) => {
                self.check_computed_member(member);
                self.walk_expression(&member.object);
                self.walk_expression(&member.expression);
            }
            Expression::TaggedTemplateExpression(tagged) => {
                self.walk_expression(&tagged.tag);
                for expr in &tagged.quasi.expressions {
                    self.walk_expression(expr);
                }
            }
            Expression::MetaProperty(meta) => self.check_meta_property(meta),
            Expression::ImportExpression(_) => {
                self.report("dynamic import() is not available in the sandbox");
            }
            Expression::ArrowFunctionExpression(arrow) => {
                self.walk_statements(&arrow.body.statements);
            }
            Expression::FunctionExpression(func) => {
                if let Some(body) = &func.body {
                    self.walk_statements(&body.statements);
                }
            }
            Expression::AssignmentExpression(assign) => {
                self.walk_expression(&assign.right);
                if let Some(member) = assign.left.as_member_expression() {
                    match member {
                        MemberExpression::StaticMemberExpression(m) => {
                            self.check_static_member(m);
                            self.walk_expression(&m.object);
                        }
                        MemberExpression::ComputedMemberExpression(m) => {
                            self.check_computed_member(m);
                            self.walk_expression(&m.object);
                        }
                        MemberExpression::PrivateFieldExpression(pf) => {
                            self.walk_expression(&pf.object);
                        }
                    }
                }
            }
            Expression::BinaryExpression(bin) => {
                self.walk_expression(&bin.left);
                self.walk_expression(&bin.right);
            }
            Expression::LogicalExpression(log) => {
                self.walk_expression(&log.left);
                self.walk_expression(&log.right);
            }
            Expression::ConditionalExpression(cond) => {
                self.walk_expression(&cond.test);
                self.walk_expression(&cond.consequent);
                self.walk_expression(&cond.alternate);
            }
            Expression::UnaryExpression(unary) => self.walk_expression(&unary.argument),
            Expression::SequenceExpression(seq) => {
                for e in &seq.expressions {
                    self.walk_expression(e);
                }
            }
            Expression::ArrayExpression(arr) => {
                for elem in &arr.elements {
                    match elem {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            self.walk_expression(&spread.argument);
                        }
                        ArrayExpressionElement::Elision(_) => {}
                        _ => {
                            if let Some(expr) = elem.as_expression() {
                                self.walk_expression(expr);
                            }
                        }
                    }
                }
            }
            Expression::ObjectExpression(obj) => {
                for prop in &obj.properties {
                    match prop {
                        ObjectPropertyKind::ObjectProperty(p) => self.walk_expression(&p.value),
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            self.walk_expression(&spread.argument)
                        }
                    }
                }
            }
            Expression::AwaitExpression(aw) => self.walk_expression(&aw.argument),
            Expression::YieldExpression(y) => {
                if let Some(arg) = &y.argument {
                    self.walk_expression(arg);
                }
            }
            Expression::TemplateLiteral(tl) => {
                for expr in &tl.expressions {
                    self.walk_expression(expr);
                }
            }
            Expression::ParenthesizedExpression(paren) => self.walk_expression(&paren.expression),
            Expression::ClassExpression(class) => self.walk_class_body(&class.body),
            Expression::ChainExpression(chain) => match &chain.expression {
                ChainElement::CallExpression(call) => {
                    self.check_call_callee(&call.callee);
                    self.walk_expression(&call.callee);
                    self.walk_arguments(&call.arguments);
                }
                ChainElement::StaticMemberExpression(member) => {
                    self.check_static_member(member);
                    self.walk_expression(&member.object);
                }
                ChainElement::ComputedMemberExpression(member) => {
                    self.check_computed_member(member);
                    self.walk_expression(&member.object);
                    self.walk_expression(&member.expression);
                }
                ChainElement::PrivateFieldExpression(pf) => self.walk_expression(&pf.object),
                _ => {}
            },
            Expression::PrivateFieldExpression(pf) => self.walk_expression(&pf.object),
            // Literals, `this`, update expressions and other leaves.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banned(code: &str) -> String {
        match analyze(code) {
            Err(AstViolation::BannedPattern { description }) => description,
            other => panic!("expected banned pattern for {code:?}, got {other:?}"),
        }
    }

    #[test]
    fn raw_statements_with_top_level_return() {
        let form = analyze("return { sum: a + b };").unwrap();
        assert!(matches!(form, ScriptForm::RawStatements(_)));
    }

    #[test]
    fn function_declaration_is_named_function() {
        let form = analyze("function processForm() { return 1; }").unwrap();
        assert!(matches!(form, ScriptForm::NamedFunction(_)));
    }

    #[test]
    fn async_function_declaration_is_named_function() {
        let form = analyze("async function processForm() { return 1; }").unwrap();
        assert!(matches!(form, ScriptForm::NamedFunction(_)));
    }

    #[test]
    fn const_arrow_is_named_function() {
        let form = analyze("const processForm = () => 42;").unwrap();
        assert!(matches!(form, ScriptForm::NamedFunction(_)));
    }

    #[test]
    fn const_non_function_is_raw_statements() {
        let form = analyze("const processForm = 3; return processForm;").unwrap();
        assert!(matches!(form, ScriptForm::RawStatements(_)));
    }

    #[test]
    fn string_literal_mentioning_entry_is_not_a_declaration() {
        let form = analyze(r#"const s = "function processForm() {}"; return s;"#).unwrap();
        assert!(matches!(form, ScriptForm::RawStatements(_)));
    }

    #[test]
    fn nested_declaration_is_not_top_level() {
        let form = analyze("{ function processForm() { return 1; } } return 2;").unwrap();
        assert!(matches!(form, ScriptForm::RawStatements(_)));
    }

    #[test]
    fn other_function_names_are_raw_statements() {
        let form = analyze("function helper() { return 1; } return helper();").unwrap();
        assert!(matches!(form, ScriptForm::RawStatements(_)));
    }

    #[test]
    fn empty_script_is_raw_statements() {
        let form = analyze("").unwrap();
        assert_eq!(form, ScriptForm::RawStatements(String::new()));
    }

    #[test]
    fn malformed_code_is_parse_error() {
        let err = analyze("return {;").unwrap_err();
        assert!(matches!(err, AstViolation::ParseError(_)), "got {err:?}");
        let exec: ExecutionError = err.into();
        assert_eq!(exec.kind(), crate::ErrorKind::Syntax);
    }

    #[test]
    fn unbalanced_wrapper_escape_is_parse_error() {
        // Would close the generated function body if it were spliced as text.
        let err = analyze("}); (function() {").unwrap_err();
        assert!(matches!(err, AstViolation::ParseError(_)));
    }

    #[test]
    fn module_syntax_is_parse_error() {
        let err = analyze("import fs from 'fs'; return 1;").unwrap_err();
        assert!(matches!(err, AstViolation::ParseError(_)));
    }

    #[test]
    fn detects_direct_eval() {
        assert!(banned(r#"return eval("1+1");"#).contains("eval()"));
    }

    #[test]
    fn detects_globalthis_eval() {
        assert!(banned(r#"return globalThis.eval("1+1");"#).contains("eval()"));
    }

    #[test]
    fn allows_typeof_eval() {
        assert!(analyze("return typeof eval;").is_ok());
    }

    #[test]
    fn detects_function_constructor() {
        assert!(banned(r#"return Function("return 1")();"#).contains("Function()"));
        assert!(banned(r#"return new Function("return 1")();"#).contains("new Function()"));
    }

    #[test]
    fn detects_require() {
        assert!(banned(r#"const fs = require("fs"); return 1;"#).contains("require()"));
    }

    #[test]
    fn detects_dynamic_import() {
        assert!(banned(r#"return import("fs");"#).contains("import()"));
    }

    #[test]
    fn detects_deno_access() {
        assert!(banned(r#"return Deno.readTextFileSync("/etc/passwd");"#).contains("Deno"));
    }

    #[test]
    fn detects_process_env() {
        assert!(banned("return process.env.SECRET;").contains("process.env"));
    }

    #[test]
    fn allows_data_process_status() {
        assert!(analyze("return data.process.status;").is_ok());
    }

    #[test]
    fn detects_constructor_chain() {
        assert!(banned(r#"return "".constructor.constructor("return this")();"#)
            .contains("constructor.constructor"));
        assert!(banned(r#"return (() => 1)["constructor"]("return 1")();"#)
            .contains("constructor"));
    }

    #[test]
    fn allows_constructor_name_read() {
        assert!(analyze("return value.constructor.name;").is_ok());
    }

    #[test]
    fn detects_globalthis_bracket() {
        assert!(banned(r#"return globalThis["ev" + "al"]("1");"#).contains("globalThis"));
    }

    #[test]
    fn detects_webassembly() {
        assert!(banned("return typeof WebAssembly;").contains("WebAssembly"));
        assert!(banned("return new WebAssembly.Module(bytes);").contains("WebAssembly"));
    }

    #[test]
    fn detects_with_statement() {
        assert!(banned("with (Math) { return PI; }").contains("with"));
    }

    #[test]
    fn detects_eval_nested_in_callback() {
        assert!(banned(r#"return items.map(i => eval(i));"#).contains("eval()"));
    }

    #[test]
    fn detects_eval_inside_entry_function() {
        assert!(banned(r#"function processForm() { return eval("1"); }"#).contains("eval()"));
    }

    #[test]
    fn allows_string_literal_containing_eval() {
        assert!(analyze(r#"return "eval(1) and require('fs')";"#).is_ok());
    }

    #[test]
    fn allows_ordinary_form_logic() {
        let code = r#"
            const total = items.reduce((acc, i) => acc + i.price * i.qty, 0);
            const discount = total > 100 ? 0.1 : 0;
            return { total, discount, email: String(email).toLowerCase() };
        "#;
        assert!(analyze(code).is_ok());
    }

    #[test]
    fn nesting_depth_over_limit_rejected() {
        let code = format!("return {}1{};", "(".repeat(300), ")".repeat(300));
        let err = analyze(&code).unwrap_err();
        assert!(matches!(err, AstViolation::NestingTooDeep { max: 256, actual: 300 }));
        let exec: ExecutionError = err.into();
        assert_eq!(exec.kind(), crate::ErrorKind::Violation);
    }

    #[test]
    fn brackets_in_literals_do_not_count_as_nesting() {
        let parens = "(".repeat(300);
        let code = format!("const s = \"{parens}\"; return s.length;");
        assert!(check_nesting_depth(&code).is_ok());
        assert!(matches!(analyze(&code), Ok(ScriptForm::RawStatements(_))));

        let code = format!("const s = '{}'; return s;", "[".repeat(300));
        assert!(check_nesting_depth(&code).is_ok());

        let code = format!("// {}\nreturn 1;", "{".repeat(300));
        assert!(check_nesting_depth(&code).is_ok());

        let code = format!("/* {} */ return 1;", "(".repeat(300));
        assert!(check_nesting_depth(&code).is_ok());

        let code = format!("return `{}`;", "(".repeat(300));
        assert!(check_nesting_depth(&code).is_ok());

        let code = format!("const re = /[{}]/; return re.test(x);", "(".repeat(300));
        assert!(check_nesting_depth(&code).is_ok());
    }

    #[test]
    fn escaped_quotes_do_not_end_literals() {
        let code = format!(r#"const s = "\"{}"; return s;"#, "(".repeat(300));
        assert!(check_nesting_depth(&code).is_ok());
    }

    #[test]
    fn template_substitutions_still_count() {
        let code = format!("return `${{{}1{}}}`;", "(".repeat(300), ")".repeat(300));
        assert!(matches!(
            check_nesting_depth(&code),
            Err(AstViolation::NestingTooDeep { actual: 301, .. })
        ));

        let code = "return `a${ { x: [1] }.x[0] }b(`;";
        assert!(check_nesting_depth(code).is_ok());
    }

    #[test]
    fn division_is_not_a_regex() {
        let code = format!("return (a / 2) + {}1{} / 3;", "(".repeat(300), ")".repeat(300));
        assert!(matches!(
            check_nesting_depth(&code),
            Err(AstViolation::NestingTooDeep { actual: 300, .. })
        ));
    }

    #[test]
    fn nesting_depth_at_limit_ok() {
        let code = format!("{}{}", "[".repeat(256), "]".repeat(256));
        assert!(check_nesting_depth(&code).is_ok());
    }
}
