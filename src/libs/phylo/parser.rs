use super::error::TreeError;
use super::node::NodeId;
use super::tree::Tree;
use super::MIN_BRLEN;
use nom::{
    branch::alt,
    bytes::complete::{is_not, take_while},
    character::complete::{char, digit1, multispace0},
    combinator::{cut, map, map_res, opt, recognize},
    error::{context, ContextError, ErrorKind, FromExternalError, ParseError},
    multi::{many1, separated_list1},
    sequence::{delimited, preceded},
    IResult, Offset, Parser,
};

// ================================================================================================
// Error Handling Structures
// ================================================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum DetailedErrorKind {
    Context(&'static str),
    Nom(ErrorKind),
}

/// A custom error type for nom that accumulates context and error kinds.
/// This allows for more informative error messages when parsing fails.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailedError<'a> {
    pub errors: Vec<(&'a str, DetailedErrorKind)>,
}

impl<'a> ParseError<&'a str> for DetailedError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        DetailedError {
            errors: vec![(input, DetailedErrorKind::Nom(kind))],
        }
    }

    fn append(input: &'a str, kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, DetailedErrorKind::Nom(kind)));
        other
    }
}

impl<'a> ContextError<&'a str> for DetailedError<'a> {
    fn add_context(input: &'a str, ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, DetailedErrorKind::Context(ctx)));
        other
    }
}

impl<'a, E> FromExternalError<&'a str, E> for DetailedError<'a> {
    fn from_external_error(input: &'a str, kind: ErrorKind, _e: E) -> Self {
        DetailedError {
            errors: vec![(input, DetailedErrorKind::Nom(kind))],
        }
    }
}

// ================================================================================================
// Intermediate Structure
// ================================================================================================

/// `ParsedNode` is a temporary recursive structure used during parsing.
///
/// Parsing a recursive structure like Newick is easier when building a
/// recursive data type; the final `Tree` uses an arena-based (flat vector)
/// representation for locality and cheap cloning. After parsing completes,
/// this structure is converted into the arena via `to_tree`.
#[derive(Debug)]
struct ParsedNode {
    name: Option<String>,
    length: Option<f64>,
    children: Vec<ParsedNode>,
}

impl ParsedNode {
    fn new() -> Self {
        Self {
            name: None,
            length: None,
            children: Vec::new(),
        }
    }

    /// Converts this recursive `ParsedNode` into nodes in the provided `Tree`
    /// arena. Returns the `NodeId` of the created node.
    fn to_tree(self, tree: &mut Tree) -> NodeId {
        let id = tree.add_node();
        for child in self.children {
            let child_id = child.to_tree(tree);
            // The unwrap here is safe because `id` was just created.
            tree.add_child(id, child_id).unwrap();
        }
        if let Some(node) = tree.get_node_mut(id) {
            node.name = self.name;
            node.length = self.length;
        }
        id
    }
}

// ================================================================================================
// Parsers
// ================================================================================================

// Whitespace eater.
// This parser wraps another parser and ignores surrounding whitespace
// (spaces, tabs, newlines).
fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

// Label.
// Parses a node label/name.
// Supports:
// - Unquoted strings (stops at reserved chars: "():;,[]")
// - Single quoted strings ('example name') - internal single quotes can be escaped as ''
// - Double quoted strings ("example name")
fn parse_label(input: &str) -> IResult<&str, String, DetailedError<'_>> {
    // Unquoted labels cannot contain Newick structural characters
    let unquoted = map(
        take_while(|c: char| !"():;,[]".contains(c)),
        |s: &str| s.trim().to_string(),
    );

    let single_quoted = delimited(
        char('\''),
        map(is_not("'"), |s: &str| s.replace("''", "'")),
        char('\''),
    );

    let double_quoted = delimited(
        char('"'),
        map(is_not("\""), |s: &str| s.replace("\"\"", "\"")),
        char('"'),
    );

    // Try quoted formats first, then fall back to unquoted
    context("label", alt((single_quoted, double_quoted, unquoted))).parse(input)
}

// Length.
// Parses the branch length, which follows a colon (e.g., ":0.123").
// Supports standard floating point formats including scientific notation.
// The parsed value is floored to MIN_BRLEN.
fn parse_length(input: &str) -> IResult<&str, f64, DetailedError<'_>> {
    context(
        "length",
        preceded(
            ws(char(':')),
            // `cut` prevents backtracking once a ':' has been consumed, so a
            // malformed number reports "length" instead of a later error.
            cut(map_res(
                recognize((
                    opt(char('-')),
                    digit1,
                    opt((char('.'), digit1)),
                    opt((
                        alt((char('e'), char('E'))),
                        opt(alt((char('+'), char('-')))),
                        digit1,
                    )),
                )),
                |s: &str| s.parse::<f64>().map(|v| v.max(MIN_BRLEN)),
            )),
        ),
    )
    .parse(input)
}

// Comment.
// Newick comments are enclosed in square brackets and carry no data we keep;
// they are recognised and dropped. An opening '[' without a closing ']' is a
// hard error (unterminated comment).
fn skip_comment(input: &str) -> IResult<&str, (), DetailedError<'_>> {
    context(
        "comment",
        map(
            opt(preceded(
                ws(char('[')),
                cut((is_not("]"), char(']'))),
            )),
            |_| (),
        ),
    )
    .parse(input)
}

// Subtree.
// Recursive parser for a tree node and its children.
// General Newick Structure: (child1, child2, ...)Label:Length[Comment]
fn parse_subtree(input: &str) -> IResult<&str, ParsedNode, DetailedError<'_>> {
    // 1. Children: optional list of subtrees enclosed in parens
    let (input, children) = context(
        "children",
        opt(delimited(
            ws(char('(')),
            separated_list1(ws(char(',')), parse_subtree),
            ws(char(')')),
        )),
    )
    .parse(input)?;

    // 2. Label: optional node name. After a ')', a numeric label is a support
    // value; that interpretation happens when the tree is sealed, the parser
    // stores it as a name either way.
    let (input, label) = opt(parse_label).parse(input)?;

    // 3. Comments may appear before or after the length; both are skipped.
    let (input, _) = skip_comment(input)?;
    let (input, length) = opt(parse_length).parse(input)?;
    let (input, _) = skip_comment(input)?;

    let mut node = ParsedNode::new();
    if let Some(c) = children {
        node.children = c;
    }
    if let Some(l) = label {
        if !l.is_empty() {
            node.name = Some(l);
        }
    }
    node.length = length;

    Ok((input, node))
}

// ================================================================================================
// Entry Points
// ================================================================================================

/// Parses a single Newick tree string.
/// Expects the tree to end with a semicolon ';'. A comment block before the
/// opening '(' is allowed and skipped.
pub fn parse_newick(input: &str) -> Result<Tree, TreeError> {
    let mut parser = (skip_comment, ws(parse_subtree), ws(char(';')));

    match parser.parse(input) {
        Ok((_, (_, root_node, _))) => {
            let mut tree = Tree::new();
            let root_id = root_node.to_tree(&mut tree);
            tree.set_root(root_id);
            Ok(tree)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(make_tree_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err(TreeError::ParseError {
            message: "Incomplete input".to_string(),
            line: 0,
            column: 0,
            snippet: "".to_string(),
        }),
    }
}

/// Parses a string containing multiple Newick trees.
/// Handles standard trees ending in ';' as well as top-level comment blocks
/// `[...]` (file headers) that are not part of a tree.
pub fn parse_newick_multi(input: &str) -> Result<Vec<Tree>, TreeError> {
    // A valid tree is a subtree followed by a semicolon
    let valid_tree = map((ws(parse_subtree), ws(char(';'))), |(root, _)| Some(root));

    // "Garbage" blocks are top-level comments [ ... ] that are ignored.
    let garbage = map(
        ws(delimited(char('['), take_while(|c| c != ']'), char(']'))),
        |_| None,
    );

    let mut parser = many1(alt((valid_tree, garbage)));

    match parser.parse(input) {
        Ok((_, trees_data)) => {
            let mut trees = Vec::new();
            for root_opt in trees_data {
                if let Some(root_node) = root_opt {
                    let mut tree = Tree::new();
                    let root_id = root_node.to_tree(&mut tree);
                    tree.set_root(root_id);
                    trees.push(tree);
                }
            }
            Ok(trees)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(make_tree_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err(TreeError::ParseError {
            message: "Incomplete input".to_string(),
            line: 0,
            column: 0,
            snippet: "".to_string(),
        }),
    }
}

// Helper to convert nom errors into friendly TreeError
fn make_tree_error(input: &str, e: DetailedError) -> TreeError {
    let (remaining, _) = e.errors.first().unwrap();
    let offset = input.offset(remaining);

    // Calculate line/col
    let prefix = &input[..offset];
    let line = prefix.chars().filter(|&c| c == '\n').count() + 1;
    let last_newline = prefix.rfind('\n').map(|p| p + 1).unwrap_or(0);
    let column = offset - last_newline + 1;

    let mut msg = String::new();
    for (_, kind) in e.errors.iter().rev() {
        match kind {
            DetailedErrorKind::Context(ctx) => {
                msg.push_str(&format!("while parsing {}:\n", ctx));
            }
            DetailedErrorKind::Nom(k) => {
                msg.push_str(&format!("  error: {:?}\n", k));
            }
        }
    }

    TreeError::ParseError {
        message: msg,
        line,
        column,
        snippet: remaining.chars().take(50).collect(),
    }
}

impl Tree {
    /// Parse a Newick string into a Tree.
    pub fn from_newick(input: &str) -> Result<Self, TreeError> {
        parse_newick(input)
    }

    pub fn from_newick_multi(input: &str) -> Result<Vec<Self>, TreeError> {
        parse_newick_multi(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_simple() {
        let input = "(A,B)C;";
        let tree = Tree::from_newick(input).unwrap();
        assert_eq!(tree.len(), 3);

        let root = tree.get_node(tree.get_root().unwrap()).unwrap();
        assert_eq!(root.name.as_deref(), Some("C"));
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn test_parser_lengths() {
        let input = "(A:0.1, B:0.2e-1)Root:100;";
        let tree = Tree::from_newick(input).unwrap();

        let root = tree.get_node(tree.get_root().unwrap()).unwrap();
        assert_eq!(root.name.as_deref(), Some("Root"));
        assert_eq!(root.length, Some(100.0));

        let child1 = tree.get_node(root.children[0]).unwrap();
        assert_eq!(child1.name.as_deref(), Some("A"));
        assert_eq!(child1.length, Some(0.1));

        let child2 = tree.get_node(root.children[1]).unwrap();
        assert_eq!(child2.name.as_deref(), Some("B"));
        assert_eq!(child2.length, Some(0.02)); // 0.2e-1
    }

    #[test]
    fn test_parser_length_floor() {
        // Zero and negative lengths are floored to a tiny positive value
        let input = "(A:0.0,B:-1.5);";
        let tree = Tree::from_newick(input).unwrap();
        let root = tree.get_node(tree.get_root().unwrap()).unwrap();

        for &c in &root.children {
            let len = tree.get_node(c).unwrap().length.unwrap();
            assert!(len > 0.0);
            assert!(len <= crate::libs::phylo::MIN_BRLEN);
        }
    }

    #[test]
    fn test_parser_comments() {
        // Comments are skipped wherever they are legal
        let input = "[header comment]((A:0.1[after length],B[before length]:0.2),C);";
        let tree = Tree::from_newick(input).unwrap();
        assert_eq!(tree.len(), 5);

        let names: Vec<_> = tree
            .get_leaf_names()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_parser_unterminated_comment() {
        let input = "((A,B),C)[oops;";
        assert!(Tree::from_newick(input).is_err());
    }

    #[test]
    fn test_parser_whitespace() {
        let input = "  (  A : 0.1 ,  B  )  ;  ";
        let tree = Tree::from_newick(input).unwrap();
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_parser_quoted() {
        let input = "('Homo sapiens':0.1, \"Mus musculus\":0.2);";
        let tree = Tree::from_newick(input).unwrap();
        let root = tree.get_node(tree.get_root().unwrap()).unwrap();

        let c1 = tree.get_node(root.children[0]).unwrap();
        assert_eq!(c1.name.as_deref(), Some("Homo sapiens"));

        let c2 = tree.get_node(root.children[1]).unwrap();
        assert_eq!(c2.name.as_deref(), Some("Mus musculus"));
    }

    #[test]
    fn test_parser_support_label_kept_as_name() {
        // A numeric label after ')' is stored as a name by the parser;
        // interpretation as a support value happens downstream.
        let input = "((A,B)0.95:1.0,C);";
        let tree = Tree::from_newick(input).unwrap();
        let root = tree.get_node(tree.get_root().unwrap()).unwrap();
        let inner = tree.get_node(root.children[0]).unwrap();
        assert_eq!(inner.name.as_deref(), Some("0.95"));
    }

    #[test]
    fn test_parser_multi() {
        let input = "[two trees]\n(A,B);\n(A,(B,C));\n";
        let trees = Tree::from_newick_multi(input).unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].len(), 3);
        assert_eq!(trees[1].len(), 5);
    }

    #[test]
    fn test_parser_error() {
        // Case 1: Missing semicolon
        let input = "(A,B)C";
        let res = Tree::from_newick(input);
        match res {
            Err(TreeError::ParseError { line, column, .. }) => {
                assert_eq!(line, 1);
                // (A,B)C -> length 6. Expects ; at col 7.
                assert_eq!(column, 7);
            }
            _ => panic!("Expected ParseError, got {:?}", res),
        }

        // Case 2: Invalid length
        let input2 = "(A,B:invalid)C;";
        let res2 = Tree::from_newick(input2);
        match res2 {
            Err(TreeError::ParseError { line, message, .. }) => {
                assert_eq!(line, 1);
                assert!(message.contains("length"));
            }
            _ => panic!("Expected ParseError, got {:?}", res2),
        }

        // Case 3: Unbalanced parentheses
        assert!(Tree::from_newick("((A,B);").is_err());
        assert!(Tree::from_newick("((A,B)").is_err());
    }
}
