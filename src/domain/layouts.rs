//! Layout definitions parsed from the external JSON layout document.

use serde::Deserialize;

use super::entities::Flag;

/// Layouts whose names start with this prefix are rendered by the menu path,
/// which lives outside this pipeline; the render engine always skips them.
pub const MENU_LAYOUT_PREFIX: &str = "Menu";

/// Wire shape of one entry in the layout document.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutRecord {
    #[serde(default)]
    pub active: bool,
    pub layout_name: String,
    #[serde(default)]
    pub layout_body: String,
    #[serde(default)]
    pub layout_order: String,
    #[serde(default)]
    pub layout_limit: u32,
    #[serde(default)]
    pub layout_file: String,
    #[serde(default)]
    pub layout_css: Option<String>,
    #[serde(default)]
    pub layout_js: Option<String>,
    #[serde(default)]
    pub layout_where: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One key of a declarative multi-key sort, e.g. `published_on desc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// How a layout name classifies the layout's selection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// `Highlight<N>`: renders the subset holding that highlight flag.
    Highlight(u8),
    /// `Group<N>`: membership driven by the layout's where clause.
    Group(u8),
    /// Reserved menu layouts, rendered elsewhere.
    Menu,
    /// Any other name: renders the full classified set.
    Plain,
}

/// A named template + selection + sort + capacity configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDefinition {
    pub name: String,
    pub active: bool,
    pub body: String,
    pub sort_spec: Vec<SortKey>,
    /// Maximum simultaneous members; 0 means unbounded.
    pub capacity: u32,
    pub output_file: String,
    pub css: Option<String>,
    pub js: Option<String>,
    pub where_clause: Option<String>,
}

impl LayoutDefinition {
    pub fn from_record(record: LayoutRecord) -> Self {
        Self {
            name: record.layout_name,
            active: record.active,
            body: record.layout_body,
            sort_spec: parse_sort_spec(&record.layout_order),
            capacity: record.layout_limit,
            output_file: record.layout_file,
            css: record.layout_css.filter(|css| !css.trim().is_empty()),
            js: record.layout_js.filter(|js| !js.trim().is_empty()),
            where_clause: record.layout_where.filter(|w| !w.trim().is_empty()),
        }
    }

    pub fn kind(&self) -> LayoutKind {
        parse_kind(&self.name)
    }

    /// The flag this layout selects on, when it is flag-scoped.
    pub fn selection_flag(&self) -> Option<Flag> {
        match self.kind() {
            LayoutKind::Highlight(n) => Flag::highlight(n),
            LayoutKind::Group(n) => Flag::group(n),
            _ => None,
        }
    }

    pub fn unbounded(&self) -> bool {
        self.capacity == 0
    }
}

fn parse_kind(name: &str) -> LayoutKind {
    let trimmed = name.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with(&MENU_LAYOUT_PREFIX.to_ascii_lowercase()) {
        return LayoutKind::Menu;
    }
    if let Some(rest) = lower.strip_prefix("highlight") {
        if let Ok(n) = rest.parse::<u8>() {
            if Flag::highlight(n).is_some() {
                return LayoutKind::Highlight(n);
            }
        }
    }
    if let Some(rest) = lower.strip_prefix("group") {
        if let Ok(n) = rest.parse::<u8>() {
            if Flag::group(n).is_some() {
                return LayoutKind::Group(n);
            }
        }
    }
    LayoutKind::Plain
}

/// Parse `"field [asc|desc], field2 [asc|desc], …"`. Unknown direction words
/// and empty segments are dropped; direction defaults to ascending.
fn parse_sort_spec(raw: &str) -> Vec<SortKey> {
    raw.split(',')
        .filter_map(|segment| {
            let mut parts = segment.split_whitespace();
            let field = parts.next()?.to_string();
            let direction = match parts.next() {
                Some(word) if word.eq_ignore_ascii_case("desc") => SortDirection::Descending,
                _ => SortDirection::Ascending,
            };
            Some(SortKey { field, direction })
        })
        .collect()
}
