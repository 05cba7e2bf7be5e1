//! Fluent query construction.
//!
//! Every method returns a new `Expr` wrapping the receiver; nothing is evaluated here. Closures
//! are called once at build time with fresh variable expressions and stored as `func` terms.
use super::term::{Call, Op, Term, VarId};
use crate::datum::Datum;
use crate::errors::DbError;
use crate::storage::Durability;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VAR: AtomicU64 = AtomicU64::new(1);

/// An immutable, shareable query expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(Arc<Term>);

/// Whether a range endpoint is included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Bound {
    #[default]
    Closed,
    Open,
}

impl Bound {
    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            other => Err(DbError::InvalidArgument(format!(
                "Expected `open` or `closed` for bound but found `{other}`"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

/// Index selection for `between`, `get_all` and `eq_join`. `None` means the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub index: Option<String>,
    pub left_bound: Bound,
    pub right_bound: Bound,
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self { index: None, left_bound: Bound::Closed, right_bound: Bound::Open }
    }
}

impl IndexSpec {
    #[must_use]
    pub fn index(name: &str) -> Self {
        Self { index: Some(name.to_owned()), ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOptions {
    pub upsert: bool,
    pub durability: Option<Durability>,
    pub return_vals: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub durability: Option<Durability>,
    pub return_vals: bool,
}

fn fresh_var() -> (VarId, Expr) {
    let id = NEXT_VAR.fetch_add(1, Ordering::Relaxed);
    let var = Term::call(Op::Var, vec![Arc::new(Term::Literal(Datum::from(id)))]);
    (id, Expr(Arc::new(var)))
}

fn make_func(ids: &[VarId], body: Expr) -> Expr {
    let params = Datum::Array(ids.iter().map(|id| Datum::from(*id)).collect());
    Expr::call(Op::Func, vec![Expr::from(params), body])
}

pub(crate) fn func1<R: Into<Expr>>(f: impl FnOnce(Expr) -> R) -> Expr {
    let (id, x) = fresh_var();
    make_func(&[id], f(x).into())
}

pub(crate) fn func2<R: Into<Expr>>(f: impl FnOnce(Expr, Expr) -> R) -> Expr {
    let (a, x) = fresh_var();
    let (b, y) = fresh_var();
    make_func(&[a, b], f(x, y).into())
}

impl Expr {
    #[must_use]
    pub const fn term(&self) -> &Arc<Term> {
        &self.0
    }

    #[must_use]
    pub fn into_term(self) -> Arc<Term> {
        self.0
    }

    #[must_use]
    pub const fn from_term(term: Arc<Term>) -> Self {
        Self(term)
    }

    fn call(op: Op, args: Vec<Self>) -> Self {
        Self(Arc::new(Term::call(op, args.into_iter().map(|a| a.0).collect())))
    }

    fn chain(&self, op: Op, rest: Vec<Self>) -> Self {
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(self.clone());
        args.extend(rest);
        Self::call(op, args)
    }

    fn chain_many<I, T>(&self, op: Op, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Self>,
    {
        self.chain(op, items.into_iter().map(Into::into).collect())
    }

    /// Sets an optional argument on the outermost call. Literals are ignored.
    #[must_use]
    pub fn opt(self, name: &str, value: impl Into<Self>) -> Self {
        match self.0.as_ref() {
            Term::Call(c) => {
                let mut call: Call = c.clone();
                call.opts.insert(name.to_owned(), value.into().0);
                Self(Arc::new(Term::Call(call)))
            }
            _ => self,
        }
    }

    fn with_index(self, spec: &IndexSpec) -> Self {
        let mut out = self;
        if let Some(index) = &spec.index {
            out = out.opt("index", index.as_str());
        }
        out.opt("left_bound", spec.left_bound.as_str()).opt("right_bound", spec.right_bound.as_str())
    }

    // comparison and logic

    #[must_use]
    pub fn eq(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Eq, vec![other.into()])
    }

    #[must_use]
    pub fn ne(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Ne, vec![other.into()])
    }

    #[must_use]
    pub fn gt(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Gt, vec![other.into()])
    }

    #[must_use]
    pub fn ge(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Ge, vec![other.into()])
    }

    #[must_use]
    pub fn lt(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Lt, vec![other.into()])
    }

    #[must_use]
    pub fn le(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Le, vec![other.into()])
    }

    #[must_use]
    pub fn and(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::And, vec![other.into()])
    }

    #[must_use]
    pub fn or(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Or, vec![other.into()])
    }

    #[must_use]
    pub fn not(&self) -> Self {
        self.chain(Op::Not, vec![])
    }

    // arithmetic

    #[must_use]
    pub fn add(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Add, vec![other.into()])
    }

    #[must_use]
    pub fn sub(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Sub, vec![other.into()])
    }

    #[must_use]
    pub fn mul(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Mul, vec![other.into()])
    }

    #[must_use]
    pub fn div(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Div, vec![other.into()])
    }

    #[must_use]
    pub fn modulo(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Mod, vec![other.into()])
    }

    // objects

    /// Field of an object, or of every row of a sequence.
    #[must_use]
    pub fn field(&self, name: impl Into<Self>) -> Self {
        self.chain(Op::GetField, vec![name.into()])
    }

    #[must_use]
    pub fn has_fields<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Self>,
    {
        self.chain_many(Op::HasFields, fields)
    }

    #[must_use]
    pub fn keys(&self) -> Self {
        self.chain(Op::Keys, vec![])
    }

    #[must_use]
    pub fn pluck<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Self>,
    {
        self.chain_many(Op::Pluck, fields)
    }

    #[must_use]
    pub fn without<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Self>,
    {
        self.chain_many(Op::Without, fields)
    }

    #[must_use]
    pub fn with_fields<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Self>,
    {
        self.chain_many(Op::WithFields, fields)
    }

    #[must_use]
    pub fn merge(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Merge, vec![other.into()])
    }

    #[must_use]
    pub fn merge_with<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::Merge, vec![func1(f)])
    }

    #[must_use]
    pub fn default(&self, fallback: impl Into<Self>) -> Self {
        self.chain(Op::Default, vec![fallback.into()])
    }

    #[must_use]
    pub fn contains(&self, value: impl Into<Self>) -> Self {
        self.chain(Op::Contains, vec![value.into()])
    }

    #[must_use]
    pub fn contains_with<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::Contains, vec![func1(f)])
    }

    /// Regular expression match against a string.
    #[must_use]
    pub fn matches(&self, pattern: &str) -> Self {
        self.chain(Op::Match, vec![pattern.into()])
    }

    // arrays

    #[must_use]
    pub fn append(&self, value: impl Into<Self>) -> Self {
        self.chain(Op::Append, vec![value.into()])
    }

    #[must_use]
    pub fn prepend(&self, value: impl Into<Self>) -> Self {
        self.chain(Op::Prepend, vec![value.into()])
    }

    #[must_use]
    pub fn difference(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Difference, vec![other.into()])
    }

    #[must_use]
    pub fn set_insert(&self, value: impl Into<Self>) -> Self {
        self.chain(Op::SetInsert, vec![value.into()])
    }

    #[must_use]
    pub fn set_union(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::SetUnion, vec![other.into()])
    }

    #[must_use]
    pub fn set_intersection(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::SetIntersection, vec![other.into()])
    }

    #[must_use]
    pub fn set_difference(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::SetDifference, vec![other.into()])
    }

    #[must_use]
    pub fn insert_at(&self, index: impl Into<Self>, value: impl Into<Self>) -> Self {
        self.chain(Op::InsertAt, vec![index.into(), value.into()])
    }

    #[must_use]
    pub fn splice_at(&self, index: impl Into<Self>, values: impl Into<Self>) -> Self {
        self.chain(Op::SpliceAt, vec![index.into(), values.into()])
    }

    #[must_use]
    pub fn delete_at(&self, index: impl Into<Self>) -> Self {
        self.chain(Op::DeleteAt, vec![index.into()])
    }

    /// Removes the half-open range `[start, end)`.
    #[must_use]
    pub fn delete_range(&self, start: impl Into<Self>, end: impl Into<Self>) -> Self {
        self.chain(Op::DeleteAt, vec![start.into(), end.into()])
    }

    #[must_use]
    pub fn change_at(&self, index: impl Into<Self>, value: impl Into<Self>) -> Self {
        self.chain(Op::ChangeAt, vec![index.into(), value.into()])
    }

    // time

    #[must_use]
    pub fn in_timezone(&self, tz: &str) -> Self {
        self.chain(Op::InTimezone, vec![tz.into()])
    }

    #[must_use]
    pub fn timezone(&self) -> Self {
        self.chain(Op::Timezone, vec![])
    }

    /// `start <= t < end`.
    #[must_use]
    pub fn during(&self, start: impl Into<Self>, end: impl Into<Self>) -> Self {
        self.chain(Op::During, vec![start.into(), end.into()])
    }

    #[must_use]
    pub fn during_with(
        &self,
        start: impl Into<Self>,
        end: impl Into<Self>,
        left: Bound,
        right: Bound,
    ) -> Self {
        self.during(start, end).opt("left_bound", left.as_str()).opt("right_bound", right.as_str())
    }

    #[must_use]
    pub fn date(&self) -> Self {
        self.chain(Op::Date, vec![])
    }

    #[must_use]
    pub fn time_of_day(&self) -> Self {
        self.chain(Op::TimeOfDay, vec![])
    }

    #[must_use]
    pub fn year(&self) -> Self {
        self.chain(Op::Year, vec![])
    }

    #[must_use]
    pub fn month(&self) -> Self {
        self.chain(Op::Month, vec![])
    }

    #[must_use]
    pub fn day(&self) -> Self {
        self.chain(Op::Day, vec![])
    }

    #[must_use]
    pub fn day_of_week(&self) -> Self {
        self.chain(Op::DayOfWeek, vec![])
    }

    #[must_use]
    pub fn day_of_year(&self) -> Self {
        self.chain(Op::DayOfYear, vec![])
    }

    #[must_use]
    pub fn hours(&self) -> Self {
        self.chain(Op::Hours, vec![])
    }

    #[must_use]
    pub fn minutes(&self) -> Self {
        self.chain(Op::Minutes, vec![])
    }

    #[must_use]
    pub fn seconds(&self) -> Self {
        self.chain(Op::Seconds, vec![])
    }

    #[must_use]
    pub fn to_iso8601(&self) -> Self {
        self.chain(Op::ToIso8601, vec![])
    }

    #[must_use]
    pub fn to_epoch_time(&self) -> Self {
        self.chain(Op::ToEpochTime, vec![])
    }

    // table access

    #[must_use]
    pub fn get(&self, key: impl Into<Self>) -> Self {
        self.chain(Op::Get, vec![key.into()])
    }

    #[must_use]
    pub fn get_all<I, K>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Self>,
    {
        self.chain_many(Op::GetAll, keys)
    }

    #[must_use]
    pub fn get_all_by<I, K>(&self, keys: I, index: &str) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Self>,
    {
        self.get_all(keys).opt("index", index)
    }

    /// Rows with `lower <= key < upper` on the primary key. `null` bounds are open-ended.
    #[must_use]
    pub fn between(&self, lower: impl Into<Self>, upper: impl Into<Self>) -> Self {
        self.between_with(lower, upper, &IndexSpec::default())
    }

    #[must_use]
    pub fn between_with(
        &self,
        lower: impl Into<Self>,
        upper: impl Into<Self>,
        spec: &IndexSpec,
    ) -> Self {
        self.chain(Op::Between, vec![lower.into(), upper.into()]).with_index(spec)
    }

    // sequences

    /// Keeps rows matching `predicate`: an expression over the implicit row, a function, or an
    /// object matched field by field.
    #[must_use]
    pub fn filter(&self, predicate: impl Into<Self>) -> Self {
        self.chain(Op::Filter, vec![predicate.into()])
    }

    #[must_use]
    pub fn filter_with<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::Filter, vec![func1(f)])
    }

    #[must_use]
    pub fn map<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::Map, vec![func1(f)])
    }

    #[must_use]
    pub fn concat_map<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::ConcatMap, vec![func1(f)])
    }

    /// Sorts by one or more keys. Strings are ascending fields; see `r::asc` and `r::desc`.
    #[must_use]
    pub fn order_by<I, K>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Self>,
    {
        self.chain_many(Op::OrderBy, keys)
    }

    #[must_use]
    pub fn skip(&self, n: impl Into<Self>) -> Self {
        self.chain(Op::Skip, vec![n.into()])
    }

    #[must_use]
    pub fn limit(&self, n: impl Into<Self>) -> Self {
        self.chain(Op::Limit, vec![n.into()])
    }

    #[must_use]
    pub fn slice(&self, start: impl Into<Self>, end: impl Into<Self>) -> Self {
        self.chain(Op::Slice, vec![start.into(), end.into()])
    }

    #[must_use]
    pub fn slice_from(&self, start: impl Into<Self>) -> Self {
        self.chain(Op::Slice, vec![start.into()])
    }

    #[must_use]
    pub fn nth(&self, index: impl Into<Self>) -> Self {
        self.chain(Op::Nth, vec![index.into()])
    }

    #[must_use]
    pub fn indexes_of(&self, value: impl Into<Self>) -> Self {
        self.chain(Op::IndexesOf, vec![value.into()])
    }

    #[must_use]
    pub fn indexes_of_with<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::IndexesOf, vec![func1(f)])
    }

    #[must_use]
    pub fn is_empty(&self) -> Self {
        self.chain(Op::IsEmpty, vec![])
    }

    #[must_use]
    pub fn union(&self, other: impl Into<Self>) -> Self {
        self.chain(Op::Union, vec![other.into()])
    }

    #[must_use]
    pub fn sample(&self, n: impl Into<Self>) -> Self {
        self.chain(Op::Sample, vec![n.into()])
    }

    #[must_use]
    pub fn distinct(&self) -> Self {
        self.chain(Op::Distinct, vec![])
    }

    #[must_use]
    pub fn inner_join<R: Into<Self>>(
        &self,
        other: impl Into<Self>,
        f: impl FnOnce(Expr, Expr) -> R,
    ) -> Self {
        self.chain(Op::InnerJoin, vec![other.into(), func2(f)])
    }

    #[must_use]
    pub fn outer_join<R: Into<Self>>(
        &self,
        other: impl Into<Self>,
        f: impl FnOnce(Expr, Expr) -> R,
    ) -> Self {
        self.chain(Op::OuterJoin, vec![other.into(), func2(f)])
    }

    /// Joins rows whose `left_field` equals the right side's primary key.
    #[must_use]
    pub fn eq_join(&self, left_field: impl Into<Self>, right: impl Into<Self>) -> Self {
        self.chain(Op::EqJoin, vec![left_field.into(), right.into()])
    }

    #[must_use]
    pub fn eq_join_index(
        &self,
        left_field: impl Into<Self>,
        right: impl Into<Self>,
        index: &str,
    ) -> Self {
        self.eq_join(left_field, right).opt("index", index)
    }

    #[must_use]
    pub fn zip(&self) -> Self {
        self.chain(Op::Zip, vec![])
    }

    #[must_use]
    pub fn reduce<R: Into<Self>>(&self, f: impl FnOnce(Expr, Expr) -> R) -> Self {
        self.chain(Op::Reduce, vec![func2(f)])
    }

    #[must_use]
    pub fn reduce_with_base<R: Into<Self>>(
        &self,
        f: impl FnOnce(Expr, Expr) -> R,
        base: impl Into<Self>,
    ) -> Self {
        self.chain(Op::Reduce, vec![func2(f), base.into()])
    }

    #[must_use]
    pub fn count(&self) -> Self {
        self.chain(Op::Count, vec![])
    }

    /// Counts elements equal to `value`.
    #[must_use]
    pub fn count_value(&self, value: impl Into<Self>) -> Self {
        self.chain(Op::Count, vec![value.into()])
    }

    #[must_use]
    pub fn count_with<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::Count, vec![func1(f)])
    }

    #[must_use]
    pub fn sum(&self) -> Self {
        self.chain(Op::Sum, vec![])
    }

    #[must_use]
    pub fn sum_by(&self, selector: impl Into<Self>) -> Self {
        self.chain(Op::Sum, vec![selector.into()])
    }

    #[must_use]
    pub fn avg(&self) -> Self {
        self.chain(Op::Avg, vec![])
    }

    #[must_use]
    pub fn avg_by(&self, selector: impl Into<Self>) -> Self {
        self.chain(Op::Avg, vec![selector.into()])
    }

    #[must_use]
    pub fn min(&self) -> Self {
        self.chain(Op::Min, vec![])
    }

    /// Row with the smallest selected value.
    #[must_use]
    pub fn min_by(&self, selector: impl Into<Self>) -> Self {
        self.chain(Op::Min, vec![selector.into()])
    }

    #[must_use]
    pub fn max(&self) -> Self {
        self.chain(Op::Max, vec![])
    }

    #[must_use]
    pub fn max_by(&self, selector: impl Into<Self>) -> Self {
        self.chain(Op::Max, vec![selector.into()])
    }

    #[must_use]
    pub fn group(&self, selector: impl Into<Self>) -> Self {
        self.chain(Op::Group, vec![selector.into()])
    }

    /// Groups by several selectors at once; group keys are arrays.
    #[must_use]
    pub fn group_by<I, S>(&self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Self>,
    {
        self.chain_many(Op::Group, selectors)
    }

    #[must_use]
    pub fn group_with<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::Group, vec![func1(f)])
    }

    #[must_use]
    pub fn ungroup(&self) -> Self {
        self.chain(Op::Ungroup, vec![])
    }

    #[must_use]
    pub fn for_each<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::ForEach, vec![func1(f)])
    }

    // writes

    #[must_use]
    pub fn insert(&self, docs: impl Into<Self>) -> Self {
        self.chain(Op::Insert, vec![docs.into()])
    }

    #[must_use]
    pub fn insert_with(&self, docs: impl Into<Self>, opts: &InsertOptions) -> Self {
        let mut out = self.insert(docs);
        if opts.upsert {
            out = out.opt("upsert", true);
        }
        out.with_write_options(&WriteOptions {
            durability: opts.durability,
            return_vals: opts.return_vals,
        })
    }

    #[must_use]
    pub fn update(&self, patch: impl Into<Self>) -> Self {
        self.chain(Op::Update, vec![patch.into()])
    }

    #[must_use]
    pub fn update_with<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::Update, vec![func1(f)])
    }

    #[must_use]
    pub fn replace(&self, doc: impl Into<Self>) -> Self {
        self.chain(Op::Replace, vec![doc.into()])
    }

    #[must_use]
    pub fn replace_with<R: Into<Self>>(&self, f: impl FnOnce(Expr) -> R) -> Self {
        self.chain(Op::Replace, vec![func1(f)])
    }

    #[must_use]
    pub fn delete(&self) -> Self {
        self.chain(Op::Delete, vec![])
    }

    /// Applies durability and `return_vals` to a write.
    #[must_use]
    pub fn with_write_options(self, opts: &WriteOptions) -> Self {
        let mut out = self;
        if let Some(d) = opts.durability {
            out = out.opt("durability", d.as_str());
        }
        if opts.return_vals {
            out = out.opt("return_vals", true);
        }
        out
    }
}

impl From<Datum> for Expr {
    fn from(d: Datum) -> Self {
        Self(Arc::new(Term::Literal(d)))
    }
}

impl From<serde_json::Value> for Expr {
    fn from(v: serde_json::Value) -> Self {
        Self::from(Datum::from(v))
    }
}

impl From<&Self> for Expr {
    fn from(e: &Self) -> Self {
        e.clone()
    }
}

impl<T: Into<Self>> From<Vec<T>> for Expr {
    fn from(items: Vec<T>) -> Self {
        Self::call(Op::MakeArray, items.into_iter().map(Into::into).collect())
    }
}

macro_rules! literal_from {
    ($($t:ty),* $(,)?) => {
        $(impl From<$t> for Expr {
            fn from(v: $t) -> Self {
                Self::from(Datum::from(v))
            }
        })*
    };
}

literal_from!(bool, f64, i32, u32, i64, u64, usize, &str, String);

/// Query entry points, used as `r::table("users")`.
pub mod r {
    use super::{Expr, Op, Term, func1};
    use std::sync::Arc;

    #[must_use]
    pub fn table(name: &str) -> Expr {
        Expr::call(Op::Table, vec![name.into()])
    }

    #[must_use]
    pub fn expr(value: impl Into<Expr>) -> Expr {
        value.into()
    }

    /// The implicit row of the innermost enclosing function.
    #[must_use]
    pub fn row() -> Expr {
        Expr::call(Op::ImplicitVar, vec![])
    }

    /// Field of the implicit row.
    #[must_use]
    pub fn field(name: &str) -> Expr {
        Expr(Arc::new(Term::Field(name.to_owned())))
    }

    #[must_use]
    pub fn func<R: Into<Expr>>(f: impl FnOnce(Expr) -> R) -> Expr {
        func1(f)
    }

    #[must_use]
    pub fn func2<R: Into<Expr>>(f: impl FnOnce(Expr, Expr) -> R) -> Expr {
        super::func2(f)
    }

    #[must_use]
    pub fn object<I, K, V>(pairs: I) -> Expr
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Expr>,
    {
        let mut out = Expr::call(Op::MakeObject, vec![]);
        for (k, v) in pairs {
            let key: String = k.into();
            out = out.opt(&key, v);
        }
        out
    }

    #[must_use]
    pub fn array<I, T>(items: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::call(Op::MakeArray, items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn asc(selector: impl Into<Expr>) -> Expr {
        Expr::call(Op::Asc, vec![selector.into()])
    }

    #[must_use]
    pub fn desc(selector: impl Into<Expr>) -> Expr {
        Expr::call(Op::Desc, vec![selector.into()])
    }

    #[must_use]
    pub fn branch(test: impl Into<Expr>, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
        Expr::call(Op::Branch, vec![test.into(), then.into(), otherwise.into()])
    }

    #[must_use]
    pub fn and<I, T>(terms: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::call(Op::And, terms.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn or<I, T>(terms: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::call(Op::Or, terms.into_iter().map(Into::into).collect())
    }

    /// Current time, fixed once per query.
    #[must_use]
    pub fn now() -> Expr {
        Expr::call(Op::Now, vec![])
    }

    /// Midnight of a calendar date in `tz`.
    #[must_use]
    pub fn time(year: i32, month: u32, day: u32, tz: &str) -> Expr {
        Expr::call(Op::Time, vec![year.into(), month.into(), day.into(), tz.into()])
    }

    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn time_hms(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: f64,
        tz: &str,
    ) -> Expr {
        Expr::call(
            Op::Time,
            vec![
                year.into(),
                month.into(),
                day.into(),
                hour.into(),
                minute.into(),
                second.into(),
                tz.into(),
            ],
        )
    }

    #[must_use]
    pub fn epoch_time(seconds: impl Into<Expr>) -> Expr {
        Expr::call(Op::EpochTime, vec![seconds.into()])
    }

    #[must_use]
    pub fn iso8601(text: impl Into<Expr>) -> Expr {
        Expr::call(Op::Iso8601, vec![text.into()])
    }

    /// `0, 1, 2, …` without end.
    #[must_use]
    pub fn range() -> Expr {
        Expr::call(Op::Range, vec![])
    }

    #[must_use]
    pub fn range_to(end: impl Into<Expr>) -> Expr {
        Expr::call(Op::Range, vec![end.into()])
    }

    #[must_use]
    pub fn range_between(start: impl Into<Expr>, end: impl Into<Expr>) -> Expr {
        Expr::call(Op::Range, vec![start.into(), end.into()])
    }
}
