//! Python syntax and scope checking using tree-sitter.

use std::collections::{HashMap, HashSet};

use tree_sitter::{Node, Parser, Tree};

use super::layout;
use super::{is_builtin, source_line, StaticFindings};
use crate::config::CheckerConfig;
use crate::finding::{Finding, Severity, NO_CODE};

/// Syntax tree depth beyond which the source is rejected.
pub const MAX_TREE_DEPTH: usize = 3000;

const PRINT_WITHOUT_PARENS: &str =
    "Missing parentheses in call to 'print'. Did you mean print(...)?";
const EXEC_WITHOUT_PARENS: &str = "Missing parentheses in call to 'exec'. Did you mean exec(...)?";
const PARAMETER_WITHOUT_DEFAULT: &str =
    "parameter without a default follows parameter with a default";
const POSITIONAL_AFTER_KEYWORD: &str = "positional argument follows keyword argument";
const POSITIONAL_AFTER_UNPACKING: &str = "positional argument follows keyword argument unpacking";
const ITERABLE_AFTER_UNPACKING: &str =
    "iterable argument unpacking follows keyword argument unpacking";

/// Check Python source.
pub fn check(source: &str, config: &CheckerConfig) -> StaticFindings {
    let layout_error = layout::scan(source);
    if let Some(error) = layout_error.filter(|e| e.stops_parsing()) {
        return StaticFindings::syntax_error(error.to_finding(source));
    }

    let tree = match parse(source) {
        Ok(tree) => tree,
        Err(e) => return StaticFindings::parse_failure(e),
    };
    let root = tree.root_node();

    let tree_error = match first_syntax_error(root, source) {
        Ok(found) => found,
        Err(e) => return StaticFindings::parse_failure(e),
    };

    // The earlier of the two wins; on the same line the parser's is kept
    let error = match (tree_error, layout_error) {
        (Some(found), Some(layout)) if layout.line < found.line => Some(layout.to_finding(source)),
        (Some(found), _) => Some(found),
        (None, layout) => layout.map(|e| e.to_finding(source)),
    };
    if let Some(error) = error {
        return StaticFindings::syntax_error(error);
    }

    let mut walker = ScopeWalker::new(source.as_bytes(), config);
    walker.walk(root);
    StaticFindings::with_warnings(walker.into_warnings(source))
}

fn parse(source: &str) -> anyhow::Result<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
    parser
        .parse(source, None)
        .ok_or_else(|| anyhow::anyhow!("parser produced no syntax tree"))
}

/// Walk the tree in document order and return the first syntax error.
///
/// Fails when the tree is nested deeper than [`MAX_TREE_DEPTH`].
fn first_syntax_error(root: Node, source: &str) -> Result<Option<Finding>, String> {
    let mut cursor = root.walk();
    let mut depth = 0usize;

    loop {
        if depth > MAX_TREE_DEPTH {
            return Err(format!(
                "maximum nesting depth of {} exceeded",
                MAX_TREE_DEPTH
            ));
        }
        if let Some(error) = node_error(cursor.node(), source) {
            return Ok(Some(error));
        }

        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return Ok(None);
            }
            depth -= 1;
        }
    }
}

/// The syntax error located at this node itself, if any.
fn node_error(node: Node, source: &str) -> Option<Finding> {
    if node.is_error() || node.is_missing() {
        return Some(syntax_error(node, source));
    }
    if node.has_error() {
        return None;
    }
    rejected_construct(node).map(|(at, message)| error_at(at, message, source))
}

/// Constructs the grammar parses but the language rejects.
fn rejected_construct(node: Node) -> Option<(Node, &'static str)> {
    match node.kind() {
        "print_statement" => Some((node, PRINT_WITHOUT_PARENS)),
        "exec_statement" => Some((node, EXEC_WITHOUT_PARENS)),
        "parameters" | "lambda_parameters" => parameter_order(node),
        "argument_list" => argument_order(node),
        _ => None,
    }
}

/// A positional parameter without a default after one with a default.
fn parameter_order(params: Node) -> Option<(Node, &'static str)> {
    let mut defaulted = false;
    for (_, param) in fields(params) {
        match param.kind() {
            "default_parameter" | "typed_default_parameter" => defaulted = true,
            // Keyword-only parameters follow the star
            "list_splat_pattern" | "dictionary_splat_pattern" | "keyword_separator" => return None,
            "typed_parameter" => match param.named_child(0).map(|c| c.kind()) {
                Some("list_splat_pattern") | Some("dictionary_splat_pattern") => return None,
                _ if defaulted => return Some((param, PARAMETER_WITHOUT_DEFAULT)),
                _ => {}
            },
            "identifier" | "tuple_pattern" if defaulted => {
                return Some((param, PARAMETER_WITHOUT_DEFAULT))
            }
            _ => {}
        }
    }
    None
}

/// Call arguments out of order.
fn argument_order(args: Node) -> Option<(Node, &'static str)> {
    let mut keyword = false;
    let mut unpacked_keywords = false;
    for (_, arg) in fields(args) {
        match arg.kind() {
            "keyword_argument" => keyword = true,
            "dictionary_splat" => unpacked_keywords = true,
            "list_splat" | "parenthesized_list_splat" if unpacked_keywords => {
                return Some((arg, ITERABLE_AFTER_UNPACKING))
            }
            "list_splat" | "parenthesized_list_splat" | "comment" => {}
            _ if unpacked_keywords => return Some((arg, POSITIONAL_AFTER_UNPACKING)),
            _ if keyword => return Some((arg, POSITIONAL_AFTER_KEYWORD)),
            _ => {}
        }
    }
    None
}

/// Build the error finding for an ERROR or MISSING node.
fn syntax_error(node: Node, source: &str) -> Finding {
    let message = if node.is_missing() {
        match node.kind() {
            "string_end" => "unterminated string literal".to_string(),
            kind => format!("expected '{}'", kind),
        }
    } else if runs_to_end(node, source) {
        "unexpected EOF while parsing".to_string()
    } else {
        "invalid syntax".to_string()
    };
    error_at(node, message, source)
}

/// An error finding on the node's first line.
fn error_at(node: Node, message: impl Into<String>, source: &str) -> Finding {
    let line = node.start_position().row as u64 + 1;

    let code = source_line(source, line)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .or_else(|| {
            node.utf8_text(source.as_bytes())
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| NO_CODE.to_string());

    Finding::new(line, Severity::Error, message, code)
}

/// Whether only whitespace follows the node.
fn runs_to_end(node: Node, source: &str) -> bool {
    source
        .get(node.end_byte()..)
        .map_or(true, |rest| rest.trim().is_empty())
}

/// Named children paired with the field they occupy.
fn fields<'t>(node: Node<'t>) -> Vec<(Option<&'static str>, Node<'t>)> {
    let mut cursor = node.walk();
    let mut out = Vec::new();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            if child.is_named() {
                out.push((cursor.field_name(), child));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    out
}

/// Whether an identifier is being read, bound or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Load,
    Store,
    Del,
}

/// Pending work for the scope walk.
enum Step<'t> {
    Visit(Node<'t>, Ctx),
    Define(Node<'t>),
    /// An `as` target, which may be a bare renamed leaf
    BindTarget(Node<'t>),
    Parameters(Node<'t>),
    BindParameter(Node<'t>),
}

/// Push a step for each named child, chosen by its field.
fn each<'t, F>(node: Node<'t>, stack: &mut Vec<Step<'t>>, step: F)
where
    F: Fn(Option<&'static str>, Node<'t>) -> Option<Step<'t>>,
{
    stack.extend(
        fields(node)
            .into_iter()
            .filter_map(|(field, child)| step(field, child)),
    );
}

/// Collector of bound and read names over a flat scope.
///
/// Results are sets plus the minimum read line, so the order in which the
/// explicit stack visits nodes does not matter.
struct ScopeWalker<'a> {
    source: &'a [u8],
    config: &'a CheckerConfig,
    defined: HashSet<String>,
    /// Name -> line of its first read
    used: HashMap<String, u64>,
}

impl<'a> ScopeWalker<'a> {
    fn new(source: &'a [u8], config: &'a CheckerConfig) -> Self {
        Self {
            source,
            config,
            defined: HashSet::new(),
            used: HashMap::new(),
        }
    }

    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or("").to_string()
    }

    fn define(&mut self, node: Node) {
        let name = self.text(node);
        if !name.is_empty() {
            self.defined.insert(name);
        }
    }

    fn record(&mut self, node: Node, ctx: Ctx) {
        match ctx {
            Ctx::Store => self.define(node),
            Ctx::Del => {}
            Ctx::Load => {
                let name = self.text(node);
                if name.is_empty() {
                    return;
                }
                let line = node.start_position().row as u64 + 1;
                self.used
                    .entry(name)
                    .and_modify(|first| *first = (*first).min(line))
                    .or_insert(line);
            }
        }
    }

    fn walk(&mut self, root: Node) {
        let mut stack = vec![Step::Visit(root, Ctx::Load)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(node, ctx) => self.visit(node, ctx, &mut stack),
                Step::Define(node) => self.define(node),
                Step::BindTarget(node) => {
                    if node.named_child_count() == 0 {
                        self.define(node);
                    } else {
                        stack.push(Step::Visit(node, Ctx::Store));
                    }
                }
                Step::Parameters(node) => self.visit_parameters(node, &mut stack),
                Step::BindParameter(node) => self.bind_parameter(node, &mut stack),
            }
        }
    }

    fn visit<'t>(&mut self, node: Node<'t>, ctx: Ctx, stack: &mut Vec<Step<'t>>) {
        match node.kind() {
            "identifier" => self.record(node, ctx),

            "import_statement" | "import_from_statement" => {
                if self.config.bind_imports {
                    self.bind_imports(node);
                }
            }
            "future_import_statement" | "global_statement" | "nonlocal_statement" => {}
            "delete_statement" => each(node, stack, |_, child| Some(Step::Visit(child, Ctx::Del))),

            "function_definition" => each(node, stack, |field, child| match field {
                Some("name") => Some(Step::Define(child)),
                Some("parameters") => Some(Step::Parameters(child)),
                Some("type_parameters") => None,
                _ => Some(Step::Visit(child, Ctx::Load)),
            }),
            "class_definition" => each(node, stack, |field, child| match field {
                Some("name") => Some(Step::Define(child)),
                Some("type_parameters") => None,
                _ => Some(Step::Visit(child, Ctx::Load)),
            }),
            "lambda" => each(node, stack, |field, child| match field {
                Some("parameters") => Some(Step::Parameters(child)),
                _ => Some(Step::Visit(child, Ctx::Load)),
            }),

            "assignment" | "augmented_assignment" | "for_statement" | "for_in_clause" => {
                each(node, stack, |field, child| match field {
                    Some("left") => Some(Step::Visit(child, Ctx::Store)),
                    _ => Some(Step::Visit(child, Ctx::Load)),
                })
            }
            "named_expression" => each(node, stack, |field, child| match field {
                Some("name") => Some(Step::Visit(child, Ctx::Store)),
                _ => Some(Step::Visit(child, Ctx::Load)),
            }),
            "as_pattern" => each(node, stack, |field, child| match field {
                Some("alias") => Some(Step::BindTarget(child)),
                _ => Some(Step::Visit(child, ctx)),
            }),
            "except_clause" => each(node, stack, |field, child| match field {
                Some("alias") => Some(Step::BindTarget(child)),
                _ => Some(Step::Visit(child, Ctx::Load)),
            }),

            "keyword_argument" => each(node, stack, |field, child| match field {
                Some("name") => None,
                _ => Some(Step::Visit(child, Ctx::Load)),
            }),
            "attribute" => each(node, stack, |field, child| match field {
                Some("attribute") => None,
                _ => Some(Step::Visit(child, Ctx::Load)),
            }),
            "subscript" => each(node, stack, |_, child| Some(Step::Visit(child, Ctx::Load))),

            "case_pattern" => each(node, stack, |_, child| Some(Step::Visit(child, Ctx::Store))),
            "class_pattern" => {
                for (index, (_, child)) in fields(node).into_iter().enumerate() {
                    stack.push(Step::Visit(child, if index == 0 { Ctx::Load } else { ctx }));
                }
            }
            "keyword_pattern" => {
                for (_, child) in fields(node).into_iter().skip(1) {
                    stack.push(Step::Visit(child, ctx));
                }
            }
            "dotted_name" => {
                // Only the leading component names a variable
                let parts = fields(node);
                if let Some((_, head)) = parts.first() {
                    let head_ctx = if parts.len() > 1 { Ctx::Load } else { ctx };
                    stack.push(Step::Visit(*head, head_ctx));
                }
            }

            _ => each(node, stack, |_, child| Some(Step::Visit(child, ctx))),
        }
    }

    /// Parameter names are not bindings unless configured; defaults and
    /// annotations are always reads.
    fn visit_parameters<'t>(&self, node: Node<'t>, stack: &mut Vec<Step<'t>>) {
        for (_, param) in fields(node) {
            match param.kind() {
                "identifier"
                | "list_splat_pattern"
                | "dictionary_splat_pattern"
                | "tuple_pattern" => stack.push(Step::BindParameter(param)),
                "typed_parameter" | "default_parameter" | "typed_default_parameter" => {
                    each(param, stack, |field, child| match field {
                        Some("type") | Some("value") => Some(Step::Visit(child, Ctx::Load)),
                        _ => Some(Step::BindParameter(child)),
                    })
                }
                _ => {}
            }
        }
    }

    fn bind_parameter<'t>(&mut self, node: Node<'t>, stack: &mut Vec<Step<'t>>) {
        if !self.config.bind_parameters {
            return;
        }
        if node.kind() == "identifier" {
            self.define(node);
            return;
        }
        each(node, stack, |_, child| Some(Step::BindParameter(child)));
    }

    /// Bind the names an import statement introduces.
    fn bind_imports(&mut self, node: Node) {
        for (field, child) in fields(node) {
            if field == Some("module_name") {
                continue;
            }
            match child.kind() {
                "aliased_import" => {
                    if let Some(alias) = child.child_by_field_name("alias") {
                        self.define(alias);
                    }
                }
                "dotted_name" => {
                    if let Some((_, head)) = fields(child).first() {
                        self.define(*head);
                    }
                }
                _ => {}
            }
        }
    }

    /// Report read names that are never bound, ordered by line then name.
    fn into_warnings(self, source: &str) -> Vec<Finding> {
        let extra: HashSet<&str> = self
            .config
            .extra_builtins
            .iter()
            .map(String::as_str)
            .collect();

        let mut undefined: Vec<(u64, String)> = self
            .used
            .into_iter()
            .filter(|(name, _)| {
                !self.defined.contains(name)
                    && !is_builtin(name)
                    && !extra.contains(name.as_str())
                    && !name.starts_with('_')
            })
            .map(|(name, line)| (line, name))
            .collect();
        undefined.sort();

        undefined
            .into_iter()
            .map(|(line, name)| {
                let code = source_line(source, line).unwrap_or(NO_CODE);
                Finding::new(
                    line,
                    Severity::Warning,
                    format!(
                        "Potentially undefined name: '{}' - verify it's imported or defined elsewhere",
                        name
                    ),
                    code,
                )
            })
            .collect()
    }
}
