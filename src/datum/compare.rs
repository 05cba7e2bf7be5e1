use super::Datum;
use crate::errors::DbError;
use std::cmp::Ordering;

// Cross-type order ranks types by name: ARRAY < BOOL < NULL < NUMBER < OBJECT < PTYPE<TIME> < STRING.
const fn type_rank(v: &Datum) -> u8 {
    match v {
        Datum::Array(_) => 0,
        Datum::Bool(_) => 1,
        Datum::Null => 2,
        Datum::Number(_) => 3,
        Datum::Object(_) => 4,
        Datum::Time(_) => 5,
        Datum::String(_) => 6,
    }
}

fn cmp_numbers(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

/// Total order over all values. Used for keys, grouping, `distinct` and storage.
#[must_use]
pub fn compare_total(a: &Datum, b: &Datum) -> Ordering {
    match (a, b) {
        (Datum::Null, Datum::Null) => Ordering::Equal,
        (Datum::Bool(x), Datum::Bool(y)) => x.cmp(y),
        (Datum::Number(x), Datum::Number(y)) => cmp_numbers(*x, *y),
        (Datum::String(x), Datum::String(y)) => x.cmp(y),
        (Datum::Time(x), Datum::Time(y)) => x.cmp(y),
        (Datum::Array(x), Datum::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_total(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Datum::Object(x), Datum::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_total(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Order between values of the same type; anything else is a `TypeMismatch`.
pub fn compare_strict(a: &Datum, b: &Datum) -> Result<Ordering, DbError> {
    match (a, b) {
        (Datum::Array(x), Datum::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_strict(l, r)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ if type_rank(a) == type_rank(b) => Ok(compare_total(a, b)),
        _ => Err(DbError::TypeMismatch(format!(
            "Cannot compare {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        compare_total(self, other) == Ordering::Equal
    }
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_total(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::object;
    use crate::errors::ErrorKind;

    #[test]
    fn cross_type_rank_follows_type_names() {
        let mut v = vec![
            Datum::from("s"),
            Datum::Null,
            Datum::from(1),
            Datum::Bool(true),
            Datum::Array(vec![]),
            object([("a", 1)]),
        ];
        v.sort();
        let names: Vec<_> = v.iter().map(Datum::type_name).collect();
        assert_eq!(names, ["ARRAY", "BOOL", "NULL", "NUMBER", "OBJECT", "STRING"]);
    }

    #[test]
    fn numbers_ignore_sign_of_zero() {
        assert_eq!(Datum::Number(0.0), Datum::Number(-0.0));
        assert_eq!(Datum::from(1), Datum::from(1.0));
    }

    #[test]
    fn strict_rejects_mixed_types() {
        let err = compare_strict(&Datum::from(1), &Datum::from("1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(
            compare_strict(&Datum::from("a"), &Datum::from("b")).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn arrays_compare_lexicographically() {
        let a = Datum::Array(vec![1.into(), 2.into()]);
        let b = Datum::Array(vec![1.into(), 3.into()]);
        let c = Datum::Array(vec![1.into()]);
        assert_eq!(compare_strict(&a, &b).unwrap(), Ordering::Less);
        assert_eq!(compare_strict(&c, &a).unwrap(), Ordering::Less);
    }
}
