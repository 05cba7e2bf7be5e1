use crate::datum::Datum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type VarId = u64;

/// One node of an unevaluated query. Trees are immutable and share subtrees through `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Literal(Datum),
    /// Field of the implicit row.
    Field(String),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Op,
    pub args: Vec<Arc<Term>>,
    pub opts: BTreeMap<String, Arc<Term>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    // structure
    MakeArray,
    MakeObject,
    Var,
    ImplicitVar,
    Func,
    // data access
    Table,
    Get,
    GetAll,
    Between,
    // objects
    GetField,
    HasFields,
    Keys,
    Pluck,
    Without,
    Merge,
    WithFields,
    Default,
    Contains,
    Match,
    // logic
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
    Not,
    Branch,
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // arrays
    Append,
    Prepend,
    Difference,
    SetInsert,
    SetUnion,
    SetIntersection,
    SetDifference,
    InsertAt,
    SpliceAt,
    DeleteAt,
    ChangeAt,
    // sequences
    Filter,
    Map,
    ConcatMap,
    OrderBy,
    Asc,
    Desc,
    Skip,
    Limit,
    Slice,
    Nth,
    IndexesOf,
    IsEmpty,
    Union,
    Sample,
    Distinct,
    Range,
    InnerJoin,
    OuterJoin,
    EqJoin,
    Zip,
    // aggregation
    Reduce,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Group,
    Ungroup,
    // time
    Now,
    Time,
    EpochTime,
    Iso8601,
    InTimezone,
    Timezone,
    During,
    Date,
    TimeOfDay,
    Year,
    Month,
    Day,
    DayOfWeek,
    DayOfYear,
    Hours,
    Minutes,
    Seconds,
    ToIso8601,
    ToEpochTime,
    // writes
    Insert,
    Update,
    Replace,
    Delete,
    ForEach,
}

impl Op {
    /// Wire name, e.g. `concat_map`.
    #[must_use]
    pub fn name(self) -> String {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(s)) => s,
            _ => format!("{self:?}"),
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Replace | Self::Delete | Self::ForEach)
    }

    /// Operators that keep rows addressable by primary key, so writes can follow them.
    #[must_use]
    pub const fn preserves_selection(self) -> bool {
        matches!(
            self,
            Self::Get
                | Self::GetAll
                | Self::Between
                | Self::Filter
                | Self::OrderBy
                | Self::Skip
                | Self::Limit
                | Self::Slice
                | Self::Nth
                | Self::Sample
        )
    }

    /// Operators applied group by group when their receiver is grouped data.
    #[must_use]
    pub const fn is_group_aware(self) -> bool {
        matches!(
            self,
            Self::Filter
                | Self::Map
                | Self::ConcatMap
                | Self::OrderBy
                | Self::Skip
                | Self::Limit
                | Self::Slice
                | Self::Nth
                | Self::Distinct
                | Self::Count
                | Self::Sum
                | Self::Avg
                | Self::Min
                | Self::Max
                | Self::Reduce
                | Self::Pluck
                | Self::Without
                | Self::Merge
                | Self::WithFields
                | Self::HasFields
                | Self::GetField
                | Self::IsEmpty
                | Self::Contains
                | Self::Zip
                | Self::Sample
        )
    }
}

impl Term {
    #[must_use]
    pub fn call(op: Op, args: Vec<Arc<Self>>) -> Self {
        Self::Call(Call { op, args, opts: BTreeMap::new() })
    }

    #[must_use]
    pub const fn op(&self) -> Option<Op> {
        match self {
            Self::Call(c) => Some(c.op),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_literal(&self) -> Option<&Datum> {
        match self {
            Self::Literal(d) => Some(d),
            _ => None,
        }
    }

    /// Visits this node and every descendant, options included.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        if let Self::Call(c) = self {
            for a in &c.args {
                a.walk(visit);
            }
            for o in c.opts.values() {
                o.walk(visit);
            }
        }
    }
}

impl Call {
    #[must_use]
    pub fn opt(&self, name: &str) -> Option<&Arc<Term>> {
        self.opts.get(name)
    }

    /// Operands after the receiver.
    #[must_use]
    pub fn rest(&self) -> &[Arc<Term>] {
        self.args.get(1..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_snake_case() {
        assert_eq!(Op::ConcatMap.name(), "concat_map");
        assert_eq!(Op::Iso8601.name(), "iso8601");
        assert_eq!(Op::ToEpochTime.name(), "to_epoch_time");
    }

    #[test]
    fn walk_visits_arguments_and_options() {
        let mut call = Call {
            op: Op::Insert,
            args: vec![Arc::new(Term::Literal(1.into()))],
            opts: BTreeMap::new(),
        };
        call.opts.insert("durability".into(), Arc::new(Term::Literal("soft".into())));
        let t = Term::Call(call);
        let mut n = 0;
        t.walk(&mut |_| n += 1);
        assert_eq!(n, 3);
    }
}
