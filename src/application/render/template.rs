//! Interpreter for the layout mini-language.
//!
//! The language has exactly four constructs, all inline in the template
//! text: the `{{LayoutName}}` placeholder, a single `RepeatBegin … RepeatEnd`
//! iteration block, `If … ElseIf … Else … EndIf` conditionals inside the
//! repeat block, and `{{field}}` substitution. There are no user-defined
//! functions, no nested loops, and no expressions beyond one field
//! comparison per clause. Keywords are recognized only when not glued to
//! surrounding alphanumerics, so prose like "Iffy" stays literal text.

use std::borrow::Cow;

use thiserror::Error;

use crate::domain::entities::{FieldLookup, MirrorRecord};

pub const LAYOUT_NAME_PLACEHOLDER: &str = "{{LayoutName}}";

const REPEAT_BEGIN: &str = "RepeatBegin";
const REPEAT_END: &str = "RepeatEnd";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("`RepeatBegin` without matching `RepeatEnd`")]
    UnterminatedRepeat,
    #[error("`If` without matching `EndIf`")]
    UnterminatedConditional,
    #[error("malformed conditional clause near `{context}`")]
    MalformedClause { context: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBlock {
    pub output: String,
    pub items_rendered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Test {
    /// `If field`: true when the field is non-blank and not a falsy word.
    Truthy,
    Cmp { op: CmpOp, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Condition {
    field: String,
    test: Test,
}

impl Condition {
    /// A matched clause with a numeric comparison value redefines how many
    /// items the surrounding repeat block renders.
    fn numeric_limit(&self) -> Option<usize> {
        match &self.test {
            Test::Cmp { value, .. } => {
                let n: i64 = value.trim().parse().ok()?;
                usize::try_from(n).ok()
            }
            Test::Truthy => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    condition: Condition,
    body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Text(String),
    Conditional {
        clauses: Vec<Clause>,
        otherwise: Option<String>,
    },
}

/// Per-iteration view over a cached record: injects the 1-based `Counter`
/// without mutating the record itself, so concurrent renders over the shared
/// snapshot never see each other's counters.
struct ItemView<'a> {
    record: &'a MirrorRecord,
    counter: usize,
}

impl FieldLookup for ItemView<'_> {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        if name.eq_ignore_ascii_case("counter") {
            return Some(Cow::Owned(self.counter.to_string()));
        }
        self.record.field(name)
    }
}

/// Render a template body against a sorted item subset.
///
/// `default_limit` is the layout capacity when set, otherwise the subset
/// length; matched conditionals may override it mid-iteration (last write
/// wins).
pub fn render(
    template: &str,
    layout_name: &str,
    items: &[MirrorRecord],
    default_limit: usize,
) -> Result<RenderedBlock, TemplateError> {
    let body = template.replace(LAYOUT_NAME_PLACEHOLDER, layout_name);

    let Some((prefix, loop_body, suffix)) = split_repeat(&body)? else {
        return Ok(RenderedBlock {
            output: body,
            items_rendered: 0,
        });
    };

    let blocks = parse_blocks(loop_body)?;

    let mut output = String::from(prefix);
    let mut effective_limit = default_limit;
    let mut rendered = 0usize;

    for record in items {
        if rendered >= effective_limit {
            break;
        }
        let view = ItemView {
            record,
            counter: rendered + 1,
        };
        for block in &blocks {
            match block {
                Block::Text(text) => output.push_str(&substitute(text, &view)),
                Block::Conditional { clauses, otherwise } => {
                    let mut chosen: Option<&str> = None;
                    for clause in clauses {
                        if eval_condition(&clause.condition, &view) {
                            if let Some(limit) = clause.condition.numeric_limit() {
                                effective_limit = limit;
                            }
                            chosen = Some(clause.body.as_str());
                            break;
                        }
                    }
                    if let Some(branch) = chosen.or(otherwise.as_deref()) {
                        output.push_str(&substitute(branch, &view));
                    }
                }
            }
        }
        rendered += 1;
    }

    output.push_str(suffix);
    Ok(RenderedBlock {
        output,
        items_rendered: rendered,
    })
}

fn split_repeat(body: &str) -> Result<Option<(&str, &str, &str)>, TemplateError> {
    let Some(start) = find_token(body, REPEAT_BEGIN) else {
        return Ok(None);
    };
    let after = &body[start + REPEAT_BEGIN.len()..];
    let end = find_token(after, REPEAT_END).ok_or(TemplateError::UnterminatedRepeat)?;
    Ok(Some((
        &body[..start],
        &after[..end],
        &after[end + REPEAT_END.len()..],
    )))
}

/// Find a keyword occurrence bounded by non-alphanumeric characters, so plain
/// text containing the keyword as a substring is left alone.
fn find_token(haystack: &str, token: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = haystack[from..].find(token) {
        let at = from + rel;
        let before_ok = !haystack[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric());
        let after_ok = !haystack[at + token.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric());
        if before_ok && after_ok {
            return Some(at);
        }
        from = at + token.len();
    }
    None
}

/// Split the loop body into literal text and conditional blocks. Conditionals
/// do not nest; the next `ElseIf`/`Else`/`EndIf` token always belongs to the
/// open `If`.
fn parse_blocks(loop_body: &str) -> Result<Vec<Block>, TemplateError> {
    let mut blocks = Vec::new();
    let mut rest = loop_body;

    while let Some(if_at) = find_token(rest, "If") {
        if if_at > 0 {
            blocks.push(Block::Text(rest[..if_at].to_string()));
        }
        let mut cursor = &rest[if_at + "If".len()..];

        let mut clauses: Vec<Clause> = Vec::new();
        let mut otherwise: Option<String> = None;
        let mut condition = parse_condition(&mut cursor)?;

        loop {
            let (body_end, token) =
                next_branch_token(cursor).ok_or(TemplateError::UnterminatedConditional)?;
            let branch_body = cursor[..body_end].to_string();
            cursor = &cursor[body_end + token.len()..];

            match token {
                BranchToken::ElseIf => {
                    clauses.push(Clause {
                        condition,
                        body: branch_body,
                    });
                    condition = parse_condition(&mut cursor)?;
                }
                BranchToken::Else => {
                    clauses.push(Clause {
                        condition,
                        body: branch_body,
                    });
                    let (else_end, closing) =
                        next_branch_token(cursor).ok_or(TemplateError::UnterminatedConditional)?;
                    if closing != BranchToken::EndIf {
                        return Err(TemplateError::MalformedClause {
                            context: snippet(cursor),
                        });
                    }
                    otherwise = Some(cursor[..else_end].to_string());
                    cursor = &cursor[else_end + closing.len()..];
                    break;
                }
                BranchToken::EndIf => {
                    clauses.push(Clause {
                        condition,
                        body: branch_body,
                    });
                    break;
                }
            }
        }

        blocks.push(Block::Conditional { clauses, otherwise });
        rest = cursor;
    }

    if !rest.is_empty() {
        blocks.push(Block::Text(rest.to_string()));
    }
    Ok(blocks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchToken {
    ElseIf,
    Else,
    EndIf,
}

impl BranchToken {
    fn len(&self) -> usize {
        match self {
            Self::ElseIf => "ElseIf".len(),
            Self::Else => "Else".len(),
            Self::EndIf => "EndIf".len(),
        }
    }
}

/// The next branch delimiter in `text`, as (byte offset, token). The boundary
/// rule in `find_token` keeps `Else` from matching inside `ElseIf`.
fn next_branch_token(text: &str) -> Option<(usize, BranchToken)> {
    [
        (find_token(text, "ElseIf"), BranchToken::ElseIf),
        (find_token(text, "Else"), BranchToken::Else),
        (find_token(text, "EndIf"), BranchToken::EndIf),
    ]
    .into_iter()
    .filter_map(|(at, token)| at.map(|at| (at, token)))
    .min_by_key(|(at, _)| *at)
}

/// Parse `<field> [<op> <value>]` at the start of `*cursor`, advancing the
/// cursor to where the branch body begins.
fn parse_condition(cursor: &mut &str) -> Result<Condition, TemplateError> {
    let text = cursor.trim_start();

    let field_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let field = &text[..field_end];
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TemplateError::MalformedClause {
            context: snippet(text),
        });
    }

    let after_field = text[field_end..].trim_start();
    let op = [
        (">=", CmpOp::Ge),
        ("<=", CmpOp::Le),
        ("!=", CmpOp::Ne),
        ("=", CmpOp::Eq),
        (">", CmpOp::Gt),
        ("<", CmpOp::Lt),
    ]
    .into_iter()
    .find(|(symbol, _)| after_field.starts_with(symbol));

    match op {
        None => {
            // Operatorless form: the branch body starts right after the field.
            *cursor = &text[field_end..];
            Ok(Condition {
                field: field.to_string(),
                test: Test::Truthy,
            })
        }
        Some((symbol, op)) => {
            let after_op = after_field[symbol.len()..].trim_start();
            let (value, consumed) = parse_value(after_op)?;
            *cursor = &after_op[consumed..];
            Ok(Condition {
                field: field.to_string(),
                test: Test::Cmp { op, value },
            })
        }
    }
}

/// A quoted `'value'` or a bare whitespace-delimited token. Returns the value
/// and the byte length consumed from the input.
fn parse_value(text: &str) -> Result<(String, usize), TemplateError> {
    if let Some(rest) = text.strip_prefix('\'') {
        let close = rest.find('\'').ok_or(TemplateError::MalformedClause {
            context: snippet(text),
        })?;
        return Ok((rest[..close].to_string(), close + 2));
    }
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    if end == 0 {
        return Err(TemplateError::MalformedClause {
            context: snippet(text),
        });
    }
    Ok((text[..end].to_string(), end))
}

fn snippet(text: &str) -> String {
    text.chars().take(32).collect()
}

fn eval_condition(condition: &Condition, view: &dyn FieldLookup) -> bool {
    let actual = view
        .field(&condition.field)
        .map(|v| v.into_owned())
        .unwrap_or_default();
    match &condition.test {
        Test::Truthy => is_truthy(&actual),
        Test::Cmp { op, value } => compare(actual.trim(), value.trim(), *op),
    }
}

/// Truthy-and-non-blank: blank, `0`, `No`, and `false` fail the test,
/// consistent with the Yes/No flag encoding.
fn is_truthy(value: &str) -> bool {
    let trimmed = value.trim();
    !(trimmed.is_empty()
        || trimmed == "0"
        || trimmed.eq_ignore_ascii_case("no")
        || trimmed.eq_ignore_ascii_case("false"))
}

/// Numeric comparison when both operands parse as numbers, lexicographic
/// otherwise.
fn compare(actual: &str, expected: &str, op: CmpOp) -> bool {
    use std::cmp::Ordering;
    let ordering = match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => actual.cmp(expected),
    };
    match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
    }
}

/// Replace every `{{field}}` occurrence; unknown fields render empty.
fn substitute(text: &str, view: &dyn FieldLookup) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = view.field(name) {
                    output.push_str(&value);
                }
                rest = &after[end + 2..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::entities::{ContentItem, Flag, FlagSet};

    fn record(id: i64, heading: &str, rank: &str) -> MirrorRecord {
        let item = ContentItem {
            id,
            heading: heading.to_string(),
            rank: rank.to_string(),
            byline: "Rossi".to_string(),
            ..ContentItem::default()
        };
        MirrorRecord::from_item(
            &item,
            FlagSet::empty().with(Flag::Highlight(1)),
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap()
    }

    fn compact(rendered: &RenderedBlock) -> String {
        rendered.output.split_whitespace().collect()
    }

    #[test]
    fn body_without_repeat_only_substitutes_layout_name() {
        let out = render("Static for {{LayoutName}} / {{heading}}", "Sidebar", &[], 0).unwrap();
        assert_eq!(out.output, "Static for Sidebar / {{heading}}");
        assert_eq!(out.items_rendered, 0);
    }

    #[test]
    fn repeat_block_renders_each_item() {
        let items = vec![
            record(1, "first", ""),
            record(2, "second", ""),
            record(3, "third", ""),
        ];
        let out = render(
            "<ul>RepeatBegin<li>{{heading}}</li>RepeatEnd</ul>",
            "List",
            &items,
            items.len(),
        )
        .unwrap();
        assert_eq!(
            out.output,
            "<ul><li>first</li><li>second</li><li>third</li></ul>"
        );
        assert_eq!(out.items_rendered, 3);
    }

    #[test]
    fn counter_is_one_based_and_scoped() {
        let items = vec![record(1, "a", ""), record(2, "b", "")];
        let out = render("RepeatBegin {{Counter}}:{{heading}};RepeatEnd", "L", &items, 2).unwrap();
        assert_eq!(out.output, " 1:a; 2:b;");
        // The cached records themselves carry no counter field.
        assert!(items[0].field("counter").is_none());
    }

    #[test]
    fn conditional_selects_branch_on_numeric_comparison() {
        let template = "RepeatBegin If rank > 5 HIGH Else LOW EndIf RepeatEnd";
        let out = render(template, "L", &[record(1, "big", "7")], 1).unwrap();
        assert_eq!(compact(&out), "HIGH");
        let out = render(template, "L", &[record(2, "small", "3")], 1).unwrap();
        assert_eq!(compact(&out), "LOW");
    }

    #[test]
    fn elseif_chain_takes_first_match() {
        let template = "RepeatBegin If rank = 1 one ElseIf rank = 2 two ElseIf rank = 3 three Else other EndIf RepeatEnd";
        let out = render(template, "L", &[record(9, "x", "2")], 1).unwrap();
        assert_eq!(compact(&out), "two");
        let out = render(template, "L", &[record(9, "x", "9")], 1).unwrap();
        assert_eq!(compact(&out), "other");
    }

    #[test]
    fn operatorless_clause_tests_truthiness() {
        let template = "RepeatBegin If heading [{{heading}}] EndIf RepeatEnd";
        let out = render(template, "L", &[record(1, "present", "")], 1).unwrap();
        assert_eq!(compact(&out), "[present]");
        let out = render(template, "L", &[record(1, "", "")], 1).unwrap();
        assert_eq!(compact(&out), "");
        // Flag columns render Yes/No, so an unset flag is falsy here.
        let template = "RepeatBegin If highlight2 starred EndIf RepeatEnd";
        let out = render(template, "L", &[record(1, "x", "")], 1).unwrap();
        assert_eq!(compact(&out), "");
    }

    #[test]
    fn quoted_string_comparison() {
        let template = "RepeatBegin If byline = 'Rossi' match Else miss EndIf RepeatEnd";
        let out = render(template, "L", &[record(1, "x", "")], 1).unwrap();
        assert_eq!(compact(&out), "match");
        let template = "RepeatBegin If byline != 'Rossi' differs Else same EndIf RepeatEnd";
        let out = render(template, "L", &[record(1, "x", "")], 1).unwrap();
        assert_eq!(compact(&out), "same");
    }

    #[test]
    fn matched_numeric_clause_overrides_limit() {
        // Every item matches `rank > 2`, so the first iteration drops the
        // effective limit from 5 to the comparison value 2.
        let items: Vec<MirrorRecord> = (1..=5).map(|i| record(i, "h", "9")).collect();
        let template = "RepeatBegin If rank > 2 {{Counter}}; EndIf RepeatEnd";
        let out = render(template, "L", &items, 5).unwrap();
        assert_eq!(compact(&out), "1;2;");
        assert_eq!(out.items_rendered, 2);
    }

    #[test]
    fn limit_override_takes_last_write() {
        // Two conditionals both fire on every item; the later block's
        // numeric value (4) is the one that holds.
        let items: Vec<MirrorRecord> = (1..=6).map(|i| record(i, "h", "9")).collect();
        let template = "RepeatBegin If rank > 2 a EndIf If rank > 4 b EndIf {{Counter}};RepeatEnd";
        let out = render(template, "L", &items, 6).unwrap();
        assert_eq!(out.items_rendered, 4);
        assert_eq!(compact(&out), "ab1;ab2;ab3;ab4;");
    }

    #[test]
    fn default_limit_caps_iteration() {
        let items: Vec<MirrorRecord> = (1..=5).map(|i| record(i, "h", "")).collect();
        let out = render("RepeatBegin {{Counter}};RepeatEnd", "L", &items, 3).unwrap();
        assert_eq!(compact(&out), "1;2;3;");
        assert_eq!(out.items_rendered, 3);
    }

    #[test]
    fn unterminated_constructs_error() {
        assert_eq!(
            render("RepeatBegin {{heading}}", "L", &[], 0),
            Err(TemplateError::UnterminatedRepeat)
        );
        assert_eq!(
            render(
                "RepeatBegin If heading no-close RepeatEnd",
                "L",
                &[record(1, "x", "")],
                1
            ),
            Err(TemplateError::UnterminatedConditional)
        );
    }

    #[test]
    fn keywords_glued_to_text_stay_literal() {
        let out = render("Iffy Elsewhere EndIfy RepeatBeginning", "L", &[], 0).unwrap();
        assert_eq!(out.output, "Iffy Elsewhere EndIfy RepeatBeginning");
    }

    #[test]
    fn unknown_placeholder_renders_empty() {
        let out = render(
            "RepeatBegin[{{missing}}]RepeatEnd",
            "L",
            &[record(1, "x", "")],
            1,
        )
        .unwrap();
        assert_eq!(out.output, "[]");
    }
}
