//! Binding rewriter
//!
//! Turns a binding body into a named, value-returning function literal and
//! decides whether the compiled closure may be shared by every instance of the
//! component. Also parses alias locations.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::scope::ScopeFlags;

use crate::error::{CompileError, CompileResult};

/// A rewritten binding body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenBinding {
    /// `(function name() { ... })`
    pub source: String,
    /// No closures or calls; one compiled closure serves all instances
    pub sharable: bool,
}

/// Rewrite `expression` into a function literal called `name`
pub fn rewrite_binding(expression: &str, name: &str) -> CompileResult<RewrittenBinding> {
    let allocator = Allocator::default();
    let result = Parser::new(&allocator, expression, SourceType::default()).parse();
    if let Some(error) = result.errors.first() {
        return Err(CompileError::Rewrite(error.to_string()));
    }
    let program = result.program;

    let (start, end, returns, sharable) = match (&program.body[..], &program.directives[..]) {
        ([stmt], []) => {
            let span = stmt.span();
            let mut returns = Vec::new();
            collect_returns(stmt, &mut returns);
            let mut tester = SharingTester { sharable: true };
            tester.visit_statement(stmt);
            (span.start, span.end, returns, tester.sharable)
        }
        ([], [directive]) => (directive.span.start, directive.span.end, vec![directive.span.start], true),
        _ => {
            return Err(CompileError::Rewrite(
                "binding must be a single statement".to_string(),
            ));
        }
    };

    let text = &expression[start as usize..end as usize];
    let mut body = String::with_capacity(text.len() + returns.len() * 7);
    let mut cursor = 0usize;
    for at in returns {
        let at = (at - start) as usize;
        body.push_str(&text[cursor..at]);
        body.push_str("return ");
        cursor = at;
    }
    body.push_str(&text[cursor..]);

    Ok(RewrittenBinding {
        source: format!("(function {name}() {{ {body} }})"),
        sharable,
    })
}

/// Offsets of the expression statements whose value the function returns
fn collect_returns(stmt: &Statement<'_>, out: &mut Vec<u32>) {
    match stmt {
        Statement::ExpressionStatement(s) => out.push(s.span.start),
        Statement::BlockStatement(block) => {
            if let Some(last) = block.body.last() {
                collect_returns(last, out);
            }
        }
        Statement::IfStatement(s) => {
            collect_returns(&s.consequent, out);
            if let Some(alternate) = &s.alternate {
                collect_returns(alternate, out);
            }
        }
        Statement::LabeledStatement(s) => collect_returns(&s.body, out),
        Statement::WithStatement(s) => collect_returns(&s.body, out),
        Statement::TryStatement(s) => {
            if let Some(last) = s.block.body.last() {
                collect_returns(last, out);
            }
            if let Some(last) = s.handler.as_ref().and_then(|h| h.body.body.last()) {
                collect_returns(last, out);
            }
            if let Some(last) = s.finalizer.as_ref().and_then(|f| f.body.last()) {
                collect_returns(last, out);
            }
        }
        Statement::SwitchStatement(s) => {
            let case_count = s.cases.len();
            for (i, case) in s.cases.iter().enumerate() {
                let is_last_case = i + 1 == case_count;
                let statements = &case.consequent;
                for (j, stmt) in statements.iter().enumerate() {
                    match statements.get(j + 1) {
                        Some(Statement::BreakStatement(_)) => {
                            collect_returns(stmt, out);
                            break;
                        }
                        None if is_last_case => collect_returns(stmt, out),
                        _ => {}
                    }
                }
            }
        }
        // Intermediate loop iterations must not return.
        _ => {}
    }
}

struct SharingTester {
    sharable: bool,
}

impl<'a> Visit<'a> for SharingTester {
    fn visit_function(&mut self, _it: &Function<'a>, _flags: ScopeFlags) {
        self.sharable = false;
    }

    fn visit_arrow_function_expression(&mut self, _it: &ArrowFunctionExpression<'a>) {
        self.sharable = false;
    }

    fn visit_call_expression(&mut self, _it: &CallExpression<'a>) {
        self.sharable = false;
    }
}

/// Dotted components of an alias location (`id`, `id.prop`, `id.prop.sub`)
///
/// Returns an empty list when the text is not a plain member chain.
pub fn alias_path(source: &str) -> Vec<String> {
    let allocator = Allocator::default();
    let Ok(expression) = Parser::new(&allocator, source, SourceType::default()).parse_expression() else {
        return Vec::new();
    };
    let mut parts = Vec::new();
    if member_chain(&expression, &mut parts) {
        parts
    } else {
        Vec::new()
    }
}

fn member_chain(expression: &Expression<'_>, parts: &mut Vec<String>) -> bool {
    match expression {
        Expression::Identifier(ident) => {
            parts.push(ident.name.to_string());
            true
        }
        Expression::StaticMemberExpression(member) => {
            if !member_chain(&member.object, parts) {
                return false;
            }
            parts.push(member.property.name.to_string());
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_gets_return() {
        let rewritten = rewrite_binding("root.width * 2", "$height").unwrap();
        assert_eq!(rewritten.source, "(function $height() { return root.width * 2 })");
        assert!(rewritten.sharable);
    }

    #[test]
    fn test_calls_and_closures_are_not_sharable() {
        assert!(!rewrite_binding("Math.max(a, b)", "$x").unwrap().sharable);
        assert!(!rewrite_binding("[1, 2].map(v => v)", "$x").unwrap().sharable);
        assert!(!rewrite_binding("{ var f = function() {}; 1 }", "$x").unwrap().sharable);
        assert!(rewrite_binding("a ? b.c : d + 1", "$x").unwrap().sharable);
    }

    #[test]
    fn test_block_returns_last_statement() {
        let rewritten = rewrite_binding("{ var a = 1; a + 1 }", "$w").unwrap();
        assert_eq!(rewritten.source, "(function $w() { { var a = 1; return a + 1 } })");
    }

    #[test]
    fn test_if_branches_return() {
        let rewritten = rewrite_binding("if (a) 1; else 2;", "$v").unwrap();
        assert_eq!(rewritten.source, "(function $v() { if (a) return 1; else return 2; })");
    }

    #[test]
    fn test_loops_do_not_return() {
        let rewritten = rewrite_binding("{ for (;;) { x; } y }", "$v").unwrap();
        assert_eq!(rewritten.source, "(function $v() { { for (;;) { x; } return y } })");
    }

    #[test]
    fn test_switch_returns_before_break() {
        let rewritten = rewrite_binding("switch (k) { case 1: a; break; default: b }", "$v").unwrap();
        assert_eq!(
            rewritten.source,
            "(function $v() { switch (k) { case 1: return a; break; default: return b } })"
        );
    }

    #[test]
    fn test_parse_errors_are_reported() {
        assert!(matches!(rewrite_binding("a +", "$v"), Err(CompileError::Rewrite(_))));
        assert!(matches!(rewrite_binding("a; b", "$v"), Err(CompileError::Rewrite(_))));
    }

    #[test]
    fn test_alias_paths() {
        assert_eq!(alias_path("label"), vec!["label"]);
        assert_eq!(alias_path("label.text"), vec!["label", "text"]);
        assert_eq!(alias_path("rect.font.pixelSize"), vec!["rect", "font", "pixelSize"]);
        assert!(alias_path("a[0]").is_empty());
        assert!(alias_path("a +").is_empty());
    }
}
