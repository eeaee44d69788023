//! Row and bounds types shared by adapters, the registry, and the
//! virtual-table bridge (spec §3).

use std::collections::{BTreeMap, HashMap};

use crate::filters::Filter;
use crate::value::NativeValue;

/// One row of adapter data. Keyed by column name rather than position so
/// adapters don't need to track column order by hand; `rowid` carries the
/// engine's own rowid when the adapter manages one (spec §4.3 `get_rowid`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub data: BTreeMap<String, NativeValue>,
    pub rowid: Option<i64>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&NativeValue> {
        self.data.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: NativeValue) {
        self.data.insert(column.into(), value);
    }
}

impl FromIterator<(String, NativeValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, NativeValue)>>(iter: T) -> Self {
        Row {
            data: iter.into_iter().collect(),
            rowid: None,
        }
    }
}

/// The per-column filters an adapter is asked to honor for one scan,
/// keyed by column name. Built by the virtual-table bridge out of
/// `BestIndex`/`xFilter` constraints (spec §4.5).
pub type Bounds = HashMap<String, Filter>;
