//! Content items, membership flags, and the denormalized mirror record.
//!
//! Flag values travel as booleans inside the crate; the `Yes`/`No` string
//! encoding exists only at the SQL columns and inside rendered templates.

use std::borrow::Cow;

use time::OffsetDateTime;

use super::error::DomainError;

/// Number of editorial highlight slots (`highlight1` .. `highlight5`).
pub const HIGHLIGHT_SLOTS: u8 = 5;
/// Number of rule-driven group slots (`group1` .. `group5`).
pub const GROUP_SLOTS: u8 = 5;

pub const YES: &str = "Yes";
pub const NO: &str = "No";

pub fn yes_no(value: bool) -> &'static str {
    if value { YES } else { NO }
}

pub fn is_yes(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("yes")
}

/// One membership slot on a content item.
///
/// Highlight flags are editor-set on the source item; group flags are derived
/// from layout selection rules. Both families map 1:1 onto mirror columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    Highlight(u8),
    Group(u8),
}

impl Flag {
    pub fn highlight(slot: u8) -> Option<Self> {
        (1..=HIGHLIGHT_SLOTS).contains(&slot).then_some(Self::Highlight(slot))
    }

    pub fn group(slot: u8) -> Option<Self> {
        (1..=GROUP_SLOTS).contains(&slot).then_some(Self::Group(slot))
    }

    /// Mirror-table column name for this flag.
    pub fn column(&self) -> String {
        match self {
            Self::Highlight(n) => format!("highlight{n}"),
            Self::Group(n) => format!("group{n}"),
        }
    }

    /// Inverse of [`Flag::column`]; case-insensitive.
    pub fn parse_column(name: &str) -> Option<Self> {
        let name = name.trim();
        let lower = name.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("highlight") {
            return rest.parse().ok().and_then(Self::highlight);
        }
        if let Some(rest) = lower.strip_prefix("group") {
            return rest.parse().ok().and_then(Self::group);
        }
        None
    }

    /// Every flag, highlights first, in slot order.
    pub fn all() -> impl Iterator<Item = Flag> {
        (1..=HIGHLIGHT_SLOTS)
            .map(Flag::Highlight)
            .chain((1..=GROUP_SLOTS).map(Flag::Group))
    }

    fn bit(&self) -> u16 {
        match self {
            Self::Highlight(n) => 1 << (n - 1),
            Self::Group(n) => 1 << (HIGHLIGHT_SLOTS + n - 1),
        }
    }
}

/// The full set of membership flags for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagSet {
    bits: u16,
}

impl FlagSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, flag: Flag) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn set(&mut self, flag: Flag, value: bool) {
        if value {
            self.bits |= flag.bit();
        } else {
            self.bits &= !flag.bit();
        }
    }

    /// Builder-style setter, mainly for constructing fixtures.
    pub fn with(mut self, flag: Flag) -> Self {
        self.set(flag, true);
        self
    }

    /// True when at least one flag is set.
    pub fn any(&self) -> bool {
        self.bits != 0
    }

    pub fn iter_set(&self) -> impl Iterator<Item = Flag> + '_ {
        Flag::all().filter(|flag| self.get(*flag))
    }
}

/// Field access shared by the rule evaluator and the template interpreter.
///
/// Names are matched case-insensitively; flag columns resolve to `Yes`/`No`.
pub trait FieldLookup {
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// Flat article record owned by the external record store.
///
/// Date fields stay free text at this boundary; the source system stores them
/// as editor-entered strings and the pipeline only compares and substitutes
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentItem {
    pub id: i64,
    pub heading: String,
    pub standfirst: String,
    pub body: String,
    pub byline: String,
    pub menu_ref: String,
    pub rank: String,
    pub published_on: String,
    pub updated_on: String,
    /// Raw editor-set flags. Classification may revoke these, never invent.
    pub flags: FlagSet,
}

fn lookup_named_field<'a>(
    name: &str,
    heading: &'a str,
    standfirst: &'a str,
    body: &'a str,
    byline: &'a str,
    menu_ref: &'a str,
    rank: &'a str,
    published_on: &'a str,
    updated_on: &'a str,
) -> Option<&'a str> {
    let value = match name.to_ascii_lowercase().as_str() {
        "heading" => heading,
        "standfirst" => standfirst,
        "body" => body,
        "byline" => byline,
        "menu_ref" => menu_ref,
        "rank" => rank,
        "published_on" => published_on,
        "updated_on" => updated_on,
        _ => return None,
    };
    Some(value)
}

impl FieldLookup for ContentItem {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        if name.eq_ignore_ascii_case("item_id") || name.eq_ignore_ascii_case("id") {
            return Some(Cow::Owned(self.id.to_string()));
        }
        if let Some(flag) = Flag::parse_column(name) {
            return Some(Cow::Borrowed(yes_no(self.flags.get(flag))));
        }
        lookup_named_field(
            name,
            &self.heading,
            &self.standfirst,
            &self.body,
            &self.byline,
            &self.menu_ref,
            &self.rank,
            &self.published_on,
            &self.updated_on,
        )
        .map(Cow::Borrowed)
    }
}

/// Denormalized per-item row: rendering fields plus every flag column.
///
/// Exists iff at least one flag is set; an all-`No` classification deletes
/// the row instead of writing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    pub id: i64,
    pub heading: String,
    pub standfirst: String,
    pub body: String,
    pub byline: String,
    pub menu_ref: String,
    pub rank: String,
    pub published_on: String,
    pub updated_on: String,
    pub flags: FlagSet,
    pub modified_at: OffsetDateTime,
}

impl MirrorRecord {
    /// Build the mirror row for an item with its resolved flags.
    ///
    /// Rejects an empty flag set: callers must delete instead of writing an
    /// all-`No` row.
    pub fn from_item(
        item: &ContentItem,
        flags: FlagSet,
        modified_at: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        if !flags.any() {
            return Err(DomainError::invariant(format!(
                "mirror record for item {} would carry no memberships",
                item.id
            )));
        }
        Ok(Self {
            id: item.id,
            heading: item.heading.clone(),
            standfirst: item.standfirst.clone(),
            body: item.body.clone(),
            byline: item.byline.clone(),
            menu_ref: item.menu_ref.clone(),
            rank: item.rank.clone(),
            published_on: item.published_on.clone(),
            updated_on: item.updated_on.clone(),
            flags,
            modified_at,
        })
    }
}

impl FieldLookup for MirrorRecord {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        if name.eq_ignore_ascii_case("item_id") || name.eq_ignore_ascii_case("id") {
            return Some(Cow::Owned(self.id.to_string()));
        }
        if let Some(flag) = Flag::parse_column(name) {
            return Some(Cow::Borrowed(yes_no(self.flags.get(flag))));
        }
        lookup_named_field(
            name,
            &self.heading,
            &self.standfirst,
            &self.body,
            &self.byline,
            &self.menu_ref,
            &self.rank,
            &self.published_on,
            &self.updated_on,
        )
        .map(Cow::Borrowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_columns_round_trip() {
        for flag in Flag::all() {
            assert_eq!(Flag::parse_column(&flag.column()), Some(flag));
        }
        assert_eq!(Flag::parse_column("Highlight3"), Some(Flag::Highlight(3)));
        assert_eq!(Flag::parse_column("group9"), None);
        assert_eq!(Flag::parse_column("highlight0"), None);
        assert_eq!(Flag::parse_column("heading"), None);
    }

    #[test]
    fn flag_set_tracks_members() {
        let mut flags = FlagSet::empty();
        assert!(!flags.any());

        flags.set(Flag::Highlight(1), true);
        flags.set(Flag::Group(4), true);
        assert!(flags.any());
        assert!(flags.get(Flag::Highlight(1)));
        assert!(!flags.get(Flag::Highlight(2)));

        let set: Vec<Flag> = flags.iter_set().collect();
        assert_eq!(set, vec![Flag::Highlight(1), Flag::Group(4)]);

        flags.set(Flag::Highlight(1), false);
        flags.set(Flag::Group(4), false);
        assert!(!flags.any());
    }

    #[test]
    fn item_field_lookup_covers_flags_and_text() {
        let item = ContentItem {
            id: 7,
            heading: "Harvest report".into(),
            flags: FlagSet::empty().with(Flag::Highlight(2)),
            ..ContentItem::default()
        };

        assert_eq!(item.field("Heading").unwrap(), "Harvest report");
        assert_eq!(item.field("highlight2").unwrap(), YES);
        assert_eq!(item.field("highlight1").unwrap(), NO);
        assert_eq!(item.field("item_id").unwrap(), "7");
        assert!(item.field("nonexistent").is_none());
    }

    #[test]
    fn mirror_record_rejects_empty_flags() {
        let item = ContentItem::default();
        let err = MirrorRecord::from_item(&item, FlagSet::empty(), OffsetDateTime::UNIX_EPOCH);
        assert!(err.is_err());
    }

    #[test]
    fn mirror_record_copies_rendering_fields() {
        let item = ContentItem {
            id: 3,
            heading: "A".into(),
            byline: "B".into(),
            ..ContentItem::default()
        };
        let flags = FlagSet::empty().with(Flag::Group(1));
        let record = MirrorRecord::from_item(&item, flags, OffsetDateTime::UNIX_EPOCH).unwrap();
        assert_eq!(record.heading, "A");
        assert_eq!(record.byline, "B");
        assert_eq!(record.field("group1").unwrap(), YES);
    }
}
