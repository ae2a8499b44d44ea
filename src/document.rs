//! Store-native values inside JSON documents.
//!
//! Object ids and dates are carried in MongoDB extended-JSON form (`{"$oid": ...}`,
//! `{"$date": ...}`) while a document is on its way to or from the store, and flattened
//! back to plain strings before they reach a client.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

pub const OID_KEY: &str = "$oid";
pub const DATE_KEY: &str = "$date";

/// 12-byte object identifier: 4 bytes of seconds, 5 random bytes, 3 bytes of counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidObjectId(pub String);

impl fmt::Display for InvalidObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a 24 character hex object id", self.0)
    }
}

impl std::error::Error for InvalidObjectId {}

static OID_COUNTER: AtomicU32 = AtomicU32::new(0);

impl ObjectId {
    pub fn new() -> Self {
        let secs = Utc::now().timestamp() as u32;
        let random = uuid::Uuid::new_v4();
        let count = OID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&random.as_bytes()[..5]);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        ObjectId(bytes)
    }

    /// True when `s` is exactly 24 hexadecimal characters.
    pub fn is_valid(s: &str) -> bool {
        s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_valid(s) {
            return Err(InvalidObjectId(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidObjectId(s.to_string()))?;
        }
        Ok(ObjectId(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn oid_value(oid: &ObjectId) -> Value {
    let mut m = Map::new();
    m.insert(OID_KEY.to_string(), Value::String(oid.to_hex()));
    Value::Object(m)
}

pub fn date_value(dt: &DateTime<Utc>) -> Value {
    let mut m = Map::new();
    m.insert(
        DATE_KEY.to_string(),
        Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Value::Object(m)
}

fn single_key<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    match v {
        Value::Object(m) if m.len() == 1 => m.get(key).and_then(Value::as_str),
        _ => None,
    }
}

pub fn as_oid(v: &Value) -> Option<ObjectId> {
    single_key(v, OID_KEY).and_then(|s| s.parse().ok())
}

pub fn as_date(v: &Value) -> Option<DateTime<Utc>> {
    single_key(v, DATE_KEY).and_then(parse_datetime)
}

/// Parses RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]` (UTC) or `YYYY-MM-DD` (midnight UTC).
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|naive| naive.and_utc())
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Replace native values with their plain string form, recursively.
pub fn to_plain(value: Value) -> Value {
    if let Some(oid) = as_oid(&value) {
        return Value::String(oid.to_hex());
    }
    if let Some(s) = single_key(&value, DATE_KEY) {
        return Value::String(s.to_string());
    }
    match value {
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, to_plain(v))).collect()),
        Value::Array(items) => Value::Array(items.into_iter().map(to_plain).collect()),
        other => other,
    }
}

/// Look up a dotted path (`address.city`) inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, part| match current {
        Value::Object(m) => m.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Equality as the store sees it: numbers compare numerically, native values by content.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            if let (Some(x), Some(y)) = (as_date(a), as_date(b)) {
                return x == y;
            }
            xm.len() == ym.len()
                && xm.iter().all(|(k, v)| ym.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

/// Cross-type rank used for sorting, lowest first.
fn type_rank(v: &Value) -> u8 {
    if as_oid(v).is_some() {
        return 6;
    }
    if as_date(v).is_some() {
        return 8;
    }
    match v {
        Value::Null => 0,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
        Value::Bool(_) => 7,
    }
}

/// Total order over document values: null < numbers < strings < objects < arrays
/// < object ids < booleans < dates.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match ra {
        6 => as_oid(a).cmp(&as_oid(b)),
        8 => as_date(a).cmp(&as_date(b)),
        _ => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Array(xs), Value::Array(ys)) => {
                for (x, y) in xs.iter().zip(ys) {
                    let ord = compare_values(x, y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                xs.len().cmp(&ys.len())
            }
            (Value::Object(xm), Value::Object(ym)) => {
                for ((xk, xv), (yk, yv)) in xm.iter().zip(ym) {
                    let ord = xk.cmp(yk).then_with(|| compare_values(xv, yv));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                xm.len().cmp(&ym.len())
            }
            _ => Ordering::Equal,
        },
    }
}
