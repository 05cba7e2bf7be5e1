use super::{Datum, Object, time};
use crate::errors::DbError;
use bson::Bson;
use serde_json::{Map, Number, Value};

const PTYPE_KEY: &str = "$reql_type$";
// Integers up to 2^53 round-trip exactly through f64.
const MAX_SAFE_INT: f64 = 9_007_199_254_740_992.0;

impl From<Value> for Datum {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(a) => Self::Array(a.into_iter().map(Self::from).collect()),
            Value::Object(o) => {
                if let Some(t) = time_from_pseudo(&o) {
                    return Self::Time(t);
                }
                Self::Object(o.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

fn time_from_pseudo(o: &Map<String, Value>) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    if o.get(PTYPE_KEY).and_then(Value::as_str) != Some("TIME") {
        return None;
    }
    let epoch = o.get("epoch_time")?.as_f64()?;
    let tz = o.get("timezone").and_then(Value::as_str).unwrap_or("+00:00");
    let offset = time::parse_timezone(tz).ok()?;
    time::from_epoch(epoch, offset).ok()
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < MAX_SAFE_INT {
        #[allow(clippy::cast_possible_truncation)]
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

impl From<Datum> for Value {
    fn from(d: Datum) -> Self {
        match d {
            Datum::Null => Self::Null,
            Datum::Bool(b) => Self::Bool(b),
            Datum::Number(n) => number_to_json(n),
            Datum::String(s) => Self::String(s),
            Datum::Array(a) => Self::Array(a.into_iter().map(Self::from).collect()),
            Datum::Object(o) => Self::Object(o.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
            Datum::Time(t) => {
                let mut m = Map::new();
                m.insert(PTYPE_KEY.into(), Self::String("TIME".into()));
                m.insert("epoch_time".into(), number_to_json(time::to_epoch(&t)));
                m.insert("timezone".into(), Self::String(time::format_timezone(t.offset())));
                Self::Object(m)
            }
        }
    }
}

impl TryFrom<Bson> for Datum {
    type Error = DbError;

    #[allow(clippy::cast_precision_loss)]
    fn try_from(b: Bson) -> Result<Self, Self::Error> {
        Ok(match b {
            Bson::Null | Bson::Undefined => Self::Null,
            Bson::Boolean(v) => Self::Bool(v),
            Bson::Int32(i) => Self::Number(f64::from(i)),
            Bson::Int64(i) => Self::Number(i as f64),
            Bson::Double(f) => Self::Number(f),
            Bson::Decimal128(d) => Self::Number(d.to_string().parse::<f64>().unwrap_or(f64::NAN)),
            Bson::String(s) | Bson::Symbol(s) => Self::String(s),
            Bson::ObjectId(oid) => Self::String(oid.to_hex()),
            Bson::Array(a) => Self::Array(a.into_iter().map(Self::try_from).collect::<Result<_, _>>()?),
            Bson::Document(d) => {
                let mut out = Object::new();
                for (k, v) in d {
                    out.insert(k, Self::try_from(v)?);
                }
                Self::Object(out)
            }
            Bson::DateTime(dt) => {
                let millis = dt.timestamp_millis() as f64;
                Self::Time(time::from_epoch(millis / 1000.0, time::utc())?)
            }
            other => {
                return Err(DbError::TypeMismatch(format!(
                    "BSON value of type {:?} has no document representation",
                    other.element_type()
                )));
            }
        })
    }
}

impl From<Datum> for Bson {
    fn from(d: Datum) -> Self {
        match d {
            Datum::Null => Self::Null,
            Datum::Bool(b) => Self::Boolean(b),
            Datum::Number(n) => {
                if n.fract() == 0.0 && n.abs() < MAX_SAFE_INT {
                    #[allow(clippy::cast_possible_truncation)]
                    return Self::Int64(n as i64);
                }
                Self::Double(n)
            }
            Datum::String(s) => Self::String(s),
            Datum::Array(a) => Self::Array(a.into_iter().map(Self::from).collect()),
            Datum::Object(o) => {
                let mut doc = bson::Document::new();
                for (k, v) in o {
                    doc.insert(k, Self::from(v));
                }
                Self::Document(doc)
            }
            Datum::Time(t) => Self::DateTime(bson::DateTime::from_millis(t.timestamp_millis())),
        }
    }
}

impl TryFrom<bson::Document> for Datum {
    type Error = DbError;

    fn try_from(doc: bson::Document) -> Result<Self, Self::Error> {
        Self::try_from(Bson::Document(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_numbers_serialize_as_integers() {
        let v = Value::from(Datum::from(json!({"a": 1, "b": 1.5})));
        assert_eq!(v, json!({"a": 1, "b": 1.5}));
    }

    #[test]
    fn time_pseudo_type_is_recognized() {
        let d = Datum::from(json!({"$reql_type$": "TIME", "epoch_time": 0, "timezone": "+02:00"}));
        let t = d.expect_time().unwrap();
        assert_eq!(t.timestamp(), 0);
        assert_eq!(time::format_timezone(t.offset()), "+02:00");
        assert_eq!(Value::from(d)["timezone"], json!("+02:00"));
    }

    #[test]
    fn malformed_pseudo_type_stays_an_object() {
        let d = Datum::from(json!({"$reql_type$": "TIME"}));
        assert!(d.as_object().is_some());
    }

    #[test]
    fn bson_documents_convert_both_ways() {
        let doc = bson::doc! {"name": "ada", "age": 36_i32, "tags": ["x"]};
        let d = Datum::try_from(doc).unwrap();
        assert_eq!(d, Datum::from(json!({"name": "ada", "age": 36, "tags": ["x"]})));
        let back = Bson::from(d);
        assert_eq!(back.as_document().and_then(|d| d.get_i64("age").ok()), Some(36));
    }

    #[test]
    fn serde_round_trip_through_json_text() {
        let d: Datum = serde_json::from_str(r#"{"a":[1,null,true]}"#).unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), r#"{"a":[1,null,true]}"#);
    }
}
