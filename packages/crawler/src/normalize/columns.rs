//! Static origin-to-canonical column mappings.

/// Declared type of a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Decimal,
    /// Decimal written as a percentage, stored as a fraction.
    Percent,
    Date,
    /// 是/否 stored as 1/0.
    Flag,
}

impl ColumnKind {
    /// Columns that take part in junk-row detection.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnKind::Integer | ColumnKind::Decimal | ColumnKind::Percent
        )
    }
}

/// Where a canonical column comes from in the raw table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// First raw header matching any alias (after header normalization).
    Names(&'static [&'static str]),
    /// Fixed position, for layouts with duplicated header names.
    Position(usize),
}

/// One canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub origin: Origin,
    pub kind: ColumnKind,
    pub required: bool,
}

impl ColumnSpec {
    pub const fn required(name: &'static str, aliases: &'static [&'static str], kind: ColumnKind) -> Self {
        Self {
            name,
            origin: Origin::Names(aliases),
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, aliases: &'static [&'static str], kind: ColumnKind) -> Self {
        Self {
            name,
            origin: Origin::Names(aliases),
            kind,
            required: false,
        }
    }

    pub const fn positional(name: &'static str, index: usize, kind: ColumnKind) -> Self {
        Self {
            name,
            origin: Origin::Position(index),
            kind,
            required: true,
        }
    }
}

/// Ordered column specs of one source. Output tables follow this order.
#[derive(Debug, PartialEq, Eq)]
pub struct ColumnMap {
    specs: &'static [ColumnSpec],
}

impl ColumnMap {
    pub const fn new(specs: &'static [ColumnSpec]) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &'static [ColumnSpec] {
        self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Canonical column names in output order.
    pub fn canonical_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.to_string()).collect()
    }

    pub fn spec(&self, name: &str) -> Option<&'static ColumnSpec> {
        self.specs.iter().find(|s| s.name == name)
    }
}
