use compact_str::CompactString;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl ValueType {
    /// SQLite column affinity used for primary key and index columns.
    pub fn affinity(self) -> &'static str {
        match self {
            ValueType::Integer | ValueType::Boolean => "INTEGER",
            ValueType::Float => "REAL",
            ValueType::Text => "TEXT",
        }
    }
}

/// A scalar as seen by index tables and the expression evaluator. Absent
/// values are represented by `Option::None` at the call sites, never here.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(CompactString),
    Boolean(bool),
}

impl Value {
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Integer(_) => 1,
            Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Boolean(_) => ValueType::Boolean,
        }
    }

    /// Ordering as SQLite applies it to index columns: numeric comparison
    /// for floats (so `-0.0 == 0.0`) and byte-wise comparison for text.
    pub fn sql_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Integer(a), Value::Float(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Float(a), Value::Integer(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            _ => self.cmp(other),
        }
    }

    /// `None` for a NaN float. SQLite binds NaN as NULL, so NaN is absent
    /// everywhere a value is read or compared.
    pub fn known(self) -> Option<Value> {
        match self {
            Value::Float(v) if v.is_nan() => None,
            value => Some(value),
        }
    }

    /// Converts a decoded scalar to the declared column type where the
    /// encoding lost that distinction (floats written as integers).
    pub(crate) fn coerce(self, value_type: ValueType) -> Value {
        match (self, value_type) {
            (Value::Integer(v), ValueType::Float) => Value::Float(v as f64),
            (Value::Integer(v), ValueType::Boolean) => Value::Boolean(v != 0),
            (value, _) => value,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            _ => Ordering::Equal,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_rank().hash(state);
        match self {
            Value::Boolean(v) => v.hash(state),
            Value::Integer(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
        }
    }
}

/// Rust types that can appear as field values, literals and index columns.
pub trait DslValue: Clone + Send + Sync + 'static {
    const VALUE_TYPE: ValueType;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

/// Marker for types that support `+`, `-` and `*` in expressions.
pub trait Arithmetic: DslValue {}

macro_rules! integer_dsl_value {
    ($($ty:ty),*) => {
        $(
            impl DslValue for $ty {
                const VALUE_TYPE: ValueType = ValueType::Integer;

                fn into_value(self) -> Value {
                    Value::Integer(i64::from(self))
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::Integer(v) => <$ty>::try_from(*v).ok(),
                        _ => None,
                    }
                }
            }

            impl Arithmetic for $ty {}
        )*
    };
}

integer_dsl_value!(i8, i16, i32, i64, u8, u16, u32);

impl DslValue for f64 {
    const VALUE_TYPE: ValueType = ValueType::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl Arithmetic for f64 {}

impl DslValue for f32 {
    const VALUE_TYPE: ValueType = ValueType::Float;

    fn into_value(self) -> Value {
        Value::Float(f64::from(self))
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v as f32),
            _ => None,
        }
    }
}

impl Arithmetic for f32 {}

impl DslValue for bool {
    const VALUE_TYPE: ValueType = ValueType::Boolean;

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl DslValue for String {
    const VALUE_TYPE: ValueType = ValueType::Text;

    fn into_value(self) -> Value {
        Value::Text(self.into())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v.to_string()),
            _ => None,
        }
    }
}
