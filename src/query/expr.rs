use crate::atom::types::{Arithmetic, DslValue, Value, ValueType};
use crate::codec::{EncodedAtom, extract_field};
use crate::error::AtomError;
use crate::query::plan::{Order, OrderBy};
use crate::storage::quote_ident;
use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Getter<E> = Arc<dyn Fn(&E) -> Option<Value> + Send + Sync>;

/// How much of a predicate the present index tables can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUsefulness {
    /// Pushable into the index scan; rows need no re-check.
    Full,
    /// Some sub-predicate is index backed, the whole still needs evaluation.
    Partial,
    None,
}

/// Three-valued result of a boolean expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truth {
    pub result: bool,
    pub unknown: bool,
}

impl Truth {
    pub const UNKNOWN: Truth = Truth {
        result: false,
        unknown: true,
    };

    /// Filters admit a row only on a known `true`.
    pub fn admits(self) -> bool {
        self.result && !self.unknown
    }

    fn from_value(value: Option<Value>) -> Self {
        match value {
            Some(Value::Boolean(result)) => Truth {
                result,
                unknown: false,
            },
            _ => Truth::UNKNOWN,
        }
    }
}

/// What an expression is evaluated against: a live atom or a scanned record.
pub enum Evaluable<'a, E> {
    Object(&'a E),
    Encoded(&'a EncodedAtom<E>),
}

impl<E> Clone for Evaluable<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Evaluable<'_, E> {}

impl<E: DeserializeOwned> Evaluable<'_, E> {
    fn field(&self, field: &FieldRef<E>) -> Result<Option<Value>, AtomError> {
        match self {
            Evaluable::Object(atom) => Ok(field.get(atom)),
            Evaluable::Encoded(encoded) => {
                if field.direct && !encoded.is_decoded() {
                    let value = extract_field(encoded.bytes(), &field.name)?;
                    return Ok(value.map(|value| value.coerce(field.value_type)));
                }
                Ok(field.get(encoded.atom()?))
            }
        }
    }
}

/// Type-erased projection of one indexable value out of an atom.
pub(crate) struct FieldRef<E> {
    pub(crate) name: Arc<str>,
    pub(crate) value_type: ValueType,
    getter: Getter<E>,
    /// The value can be read straight from the encoded record by name.
    pub(crate) direct: bool,
}

impl<E> FieldRef<E> {
    pub(crate) fn new(name: impl Into<Arc<str>>, value_type: ValueType, getter: Getter<E>) -> Self {
        Self {
            name: name.into(),
            value_type,
            getter,
            direct: false,
        }
    }

    /// NaN reads as absent, the way SQLite stores it.
    pub(crate) fn get(&self, atom: &E) -> Option<Value> {
        (self.getter)(atom).and_then(Value::known)
    }

    /// Column reference inside the index table for this field.
    pub(crate) fn column_sql(&self, table: &str) -> String {
        format!(
            "{}.{}",
            quote_ident(&index_table_name(table, &self.name)),
            quote_ident(&self.name)
        )
    }
}

impl<E> Clone for FieldRef<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            value_type: self.value_type,
            getter: self.getter.clone(),
            direct: self.direct,
        }
    }
}

pub(crate) fn index_table_name(table: &str, index: &str) -> String {
    format!("{table}__{index}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
}

impl ArithOp {
    fn sql(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
        }
    }

    fn apply(self, lhs: &Value, rhs: &Value) -> Option<Value> {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => match self {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
            }
            .map(Value::Integer),
            (Value::Float(a), Value::Float(b)) => {
                let result = match self {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                };
                // SQLite stores NaN as NULL.
                (!result.is_nan()).then_some(Value::Float(result))
            }
            _ => None,
        }
    }
}

pub(crate) enum Node<E> {
    Literal(Value),
    Field(FieldRef<E>),
    Not(Box<Node<E>>),
    IsNull(Box<Node<E>>),
    IsNotNull(Box<Node<E>>),
    Compare(CompareOp, Box<Node<E>>, Box<Node<E>>),
    Arith(ArithOp, ValueType, Box<Node<E>>, Box<Node<E>>),
    In(Box<Node<E>>, Vec<Value>),
    And(Box<Node<E>>, Box<Node<E>>),
    Or(Box<Node<E>>, Box<Node<E>>),
}

impl<E> Clone for Node<E> {
    fn clone(&self) -> Self {
        match self {
            Node::Literal(v) => Node::Literal(v.clone()),
            Node::Field(f) => Node::Field(f.clone()),
            Node::Not(n) => Node::Not(n.clone()),
            Node::IsNull(n) => Node::IsNull(n.clone()),
            Node::IsNotNull(n) => Node::IsNotNull(n.clone()),
            Node::Compare(op, l, r) => Node::Compare(*op, l.clone(), r.clone()),
            Node::Arith(op, ty, l, r) => Node::Arith(*op, *ty, l.clone(), r.clone()),
            Node::In(n, set) => Node::In(n.clone(), set.clone()),
            Node::And(l, r) => Node::And(l.clone(), r.clone()),
            Node::Or(l, r) => Node::Or(l.clone(), r.clone()),
        }
    }
}

impl<E> fmt::Debug for Node<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(v) => write!(f, "{v:?}"),
            Node::Field(field) => write!(f, "{}", field.name),
            Node::Not(n) => write!(f, "NOT ({n:?})"),
            Node::IsNull(n) => write!(f, "({n:?} IS NULL)"),
            Node::IsNotNull(n) => write!(f, "({n:?} IS NOT NULL)"),
            Node::Compare(op, l, r) => write!(f, "({l:?} {} {r:?})", op.sql()),
            Node::Arith(op, _, l, r) => write!(f, "({l:?} {} {r:?})", op.sql()),
            Node::In(n, set) => write!(f, "({n:?} IN {set:?})"),
            Node::And(l, r) => write!(f, "({l:?} AND {r:?})"),
            Node::Or(l, r) => write!(f, "({l:?} OR {r:?})"),
        }
    }
}

impl<E> Node<E> {
    pub(crate) fn can_use_partial_index(&self, available: &HashSet<String>) -> IndexUsefulness {
        use IndexUsefulness as U;
        let all_full = |nodes: &[&Node<E>]| {
            if nodes
                .iter()
                .all(|n| n.can_use_partial_index(available) == U::Full)
            {
                U::Full
            } else {
                U::None
            }
        };
        match self {
            Node::Literal(_) => U::Full,
            Node::Field(field) => {
                if available.contains(field.name.as_ref()) {
                    U::Full
                } else {
                    U::None
                }
            }
            Node::Not(n) | Node::IsNull(n) | Node::IsNotNull(n) | Node::In(n, _) => {
                all_full(&[&**n])
            }
            Node::Compare(_, l, r) | Node::Arith(_, _, l, r) => all_full(&[&**l, &**r]),
            Node::And(l, r) => {
                match (
                    l.can_use_partial_index(available),
                    r.can_use_partial_index(available),
                ) {
                    (U::Full, U::Full) => U::Full,
                    (U::None, U::None) => U::None,
                    _ => U::Partial,
                }
            }
            Node::Or(l, r) => {
                match (
                    l.can_use_partial_index(available),
                    r.can_use_partial_index(available),
                ) {
                    (U::Full, U::Full) => U::Full,
                    (U::None, _) | (_, U::None) => U::None,
                    _ => U::Partial,
                }
            }
        }
    }

    /// True when SQL alone cannot be trusted to answer exactly.
    pub(crate) fn use_scan_to_refine(&self) -> bool {
        match self {
            Node::Literal(_) | Node::Field(_) => false,
            Node::Arith(..) => true,
            Node::Not(n) | Node::IsNull(n) | Node::IsNotNull(n) | Node::In(n, _) => {
                n.use_scan_to_refine()
            }
            Node::Compare(_, l, r) | Node::And(l, r) | Node::Or(l, r) => {
                l.use_scan_to_refine() || r.use_scan_to_refine()
            }
        }
    }

    pub(crate) fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldRef<E>>) {
        match self {
            Node::Literal(_) => {}
            Node::Field(field) => {
                if !out.iter().any(|f| f.name == field.name) {
                    out.push(field);
                }
            }
            Node::Not(n) | Node::IsNull(n) | Node::IsNotNull(n) | Node::In(n, _) => {
                n.collect_fields(out)
            }
            Node::Compare(_, l, r)
            | Node::Arith(_, _, l, r)
            | Node::And(l, r)
            | Node::Or(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
        }
    }

    /// Renders this subtree as a filter fragment, appending bindings for
    /// the positional `?N` placeholders it introduces.
    pub(crate) fn to_sql(&self, table: &str, params: &mut Vec<Value>) -> String {
        match self {
            Node::Literal(value) => {
                params.push(value.clone());
                format!("?{}", params.len())
            }
            Node::Field(field) => field.column_sql(table),
            Node::Not(n) => format!("NOT ({})", n.to_sql(table, params)),
            Node::IsNull(n) => format!("({} IS NULL)", n.to_sql(table, params)),
            Node::IsNotNull(n) => format!("({} IS NOT NULL)", n.to_sql(table, params)),
            Node::Compare(op, l, r) => {
                let lhs = l.to_sql(table, params);
                let rhs = r.to_sql(table, params);
                format!("({lhs} {} {rhs})", op.sql())
            }
            Node::Arith(op, ty, l, r) => {
                let lhs = l.to_sql(table, params);
                let rhs = r.to_sql(table, params);
                let expr = format!("({lhs} {} {rhs})", op.sql());
                if *ty == ValueType::Integer {
                    // SQLite promotes overflowing integer arithmetic to REAL.
                    format!("(CASE WHEN typeof({expr}) = 'integer' THEN {expr} END)")
                } else {
                    expr
                }
            }
            Node::In(n, set) => {
                let lhs = n.to_sql(table, params);
                let mut placeholders = Vec::with_capacity(set.len());
                for value in set {
                    params.push(value.clone());
                    placeholders.push(format!("?{}", params.len()));
                }
                format!("({lhs} IN ({}))", placeholders.join(", "))
            }
            Node::And(l, r) => {
                let lhs = l.to_sql(table, params);
                let rhs = r.to_sql(table, params);
                format!("({lhs} AND {rhs})")
            }
            Node::Or(l, r) => {
                let lhs = l.to_sql(table, params);
                let rhs = r.to_sql(table, params);
                format!("({lhs} OR {rhs})")
            }
        }
    }
}

impl<E: DeserializeOwned> Node<E> {
    /// `Ok(None)` is the unknown state; `Err` is a record that failed to decode.
    pub(crate) fn eval(&self, object: Evaluable<'_, E>) -> Result<Option<Value>, AtomError> {
        let value = match self {
            Node::Literal(value) => value.clone().known(),
            Node::Field(field) => object.field(field)?,
            Node::Not(n) => match n.eval(object)? {
                Some(Value::Boolean(b)) => Some(Value::Boolean(!b)),
                _ => None,
            },
            Node::IsNull(n) => Some(Value::Boolean(n.eval(object)?.is_none())),
            Node::IsNotNull(n) => Some(Value::Boolean(n.eval(object)?.is_some())),
            Node::Compare(op, l, r) => match (l.eval(object)?, r.eval(object)?) {
                (Some(lhs), Some(rhs)) => Some(Value::Boolean(op.holds(lhs.sql_cmp(&rhs)))),
                _ => None,
            },
            Node::Arith(op, _, l, r) => match (l.eval(object)?, r.eval(object)?) {
                (Some(lhs), Some(rhs)) => op.apply(&lhs, &rhs),
                _ => None,
            },
            Node::In(n, set) => {
                // An empty list never matches, not even an unknown operand.
                if set.is_empty() {
                    return Ok(Some(Value::Boolean(false)));
                }
                let Some(value) = n.eval(object)? else {
                    return Ok(None);
                };
                if set.iter().any(|c| value.sql_cmp(c) == Ordering::Equal) {
                    Some(Value::Boolean(true))
                } else if set.iter().any(|c| c.clone().known().is_none()) {
                    // A NaN candidate binds as NULL.
                    None
                } else {
                    Some(Value::Boolean(false))
                }
            }
            Node::And(l, r) => {
                let lhs = Truth::from_value(l.eval(object)?);
                if !lhs.unknown && !lhs.result {
                    return Ok(Some(Value::Boolean(false)));
                }
                let rhs = Truth::from_value(r.eval(object)?);
                if !rhs.unknown && !rhs.result {
                    return Ok(Some(Value::Boolean(false)));
                }
                (!lhs.unknown && !rhs.unknown).then_some(Value::Boolean(true))
            }
            Node::Or(l, r) => {
                let lhs = Truth::from_value(l.eval(object)?);
                if lhs.admits() {
                    return Ok(Some(Value::Boolean(true)));
                }
                let rhs = Truth::from_value(r.eval(object)?);
                if rhs.admits() {
                    return Ok(Some(Value::Boolean(true)));
                }
                (!lhs.unknown && !rhs.unknown).then_some(Value::Boolean(false))
            }
        };
        Ok(value)
    }
}

/// A typed expression over atoms of type `E` producing a `T`.
pub struct Expr<E, T> {
    pub(crate) node: Node<E>,
    _type: PhantomData<fn() -> T>,
}

impl<E, T> Clone for Expr<E, T> {
    fn clone(&self) -> Self {
        Expr::from_node(self.node.clone())
    }
}

impl<E, T> fmt::Debug for Expr<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt(f)
    }
}

/// Anything usable as an operand of type `T`: expressions, fields and
/// plain `T` literals.
pub trait Operand<E, T> {
    fn into_expr(self) -> Expr<E, T>;
}

impl<E, T> Operand<E, T> for Expr<E, T> {
    fn into_expr(self) -> Expr<E, T> {
        self
    }
}

impl<E, T> Operand<E, T> for Field<E, T> {
    fn into_expr(self) -> Expr<E, T> {
        Expr::from_node(Node::Field(self.inner))
    }
}

impl<E, T> Operand<E, T> for &Field<E, T> {
    fn into_expr(self) -> Expr<E, T> {
        Expr::from_node(Node::Field(self.inner.clone()))
    }
}

impl<E, T: DslValue> Operand<E, T> for T {
    fn into_expr(self) -> Expr<E, T> {
        Expr::from_node(Node::Literal(self.into_value()))
    }
}

impl<E> Operand<E, String> for &str {
    fn into_expr(self) -> Expr<E, String> {
        Expr::from_node(Node::Literal(Value::Text(self.into())))
    }
}

/// A literal usable on the left-hand side: `lit(100).gt(Monster::mana())`.
pub fn lit<E, T: DslValue>(value: T) -> Expr<E, T> {
    Expr::from_node(Node::Literal(value.into_value()))
}

impl<E, T> Expr<E, T> {
    pub(crate) fn from_node(node: Node<E>) -> Self {
        Self {
            node,
            _type: PhantomData,
        }
    }

    fn compare(self, op: CompareOp, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        Expr::from_node(Node::Compare(
            op,
            Box::new(self.node),
            Box::new(rhs.into_expr().node),
        ))
    }

    pub fn eq(self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.compare(CompareOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.compare(CompareOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.compare(CompareOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.compare(CompareOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.compare(CompareOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.compare(CompareOp::Ge, rhs)
    }

    pub fn is_null(self) -> Expr<E, bool> {
        Expr::from_node(Node::IsNull(Box::new(self.node)))
    }

    pub fn is_not_null(self) -> Expr<E, bool> {
        Expr::from_node(Node::IsNotNull(Box::new(self.node)))
    }

    pub fn in_(self, values: impl IntoIterator<Item = T>) -> Expr<E, bool>
    where
        T: DslValue,
    {
        let set = values.into_iter().map(DslValue::into_value).collect();
        Expr::from_node(Node::In(Box::new(self.node), set))
    }

    pub fn can_use_partial_index(&self, available: &HashSet<String>) -> IndexUsefulness {
        self.node.can_use_partial_index(available)
    }

    pub fn use_scan_to_refine(&self) -> bool {
        self.node.use_scan_to_refine()
    }
}

impl<E: DeserializeOwned, T: DslValue> Expr<E, T> {
    /// Evaluates to the typed value, `None` when unknown. Fails only when an
    /// encoded record cannot be read.
    pub fn value(&self, object: Evaluable<'_, E>) -> Result<Option<T>, AtomError> {
        Ok(self.node.eval(object)?.and_then(|v| T::from_value(&v)))
    }
}

impl<E> Expr<E, bool> {
    pub fn and(self, rhs: impl Operand<E, bool>) -> Expr<E, bool> {
        Expr::from_node(Node::And(
            Box::new(self.node),
            Box::new(rhs.into_expr().node),
        ))
    }

    pub fn or(self, rhs: impl Operand<E, bool>) -> Expr<E, bool> {
        Expr::from_node(Node::Or(
            Box::new(self.node),
            Box::new(rhs.into_expr().node),
        ))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr<E, bool> {
        Expr::from_node(Node::Not(Box::new(self.node)))
    }
}

impl<E: DeserializeOwned> Expr<E, bool> {
    pub fn evaluate(&self, object: Evaluable<'_, E>) -> Result<Truth, AtomError> {
        Ok(Truth::from_value(self.node.eval(object)?))
    }

    /// Shorthand for evaluating against a live atom and admitting only a
    /// known `true`.
    pub fn matches(&self, atom: &E) -> bool {
        self.evaluate(Evaluable::Object(atom)).is_ok_and(Truth::admits)
    }
}

impl<E, T: Arithmetic> Expr<E, T> {
    fn arith(self, op: ArithOp, rhs: impl Operand<E, T>) -> Expr<E, T> {
        Expr::from_node(Node::Arith(
            op,
            T::VALUE_TYPE,
            Box::new(self.node),
            Box::new(rhs.into_expr().node),
        ))
    }
}

impl<E, T: Arithmetic, R: Operand<E, T>> std::ops::Add<R> for Expr<E, T> {
    type Output = Expr<E, T>;

    fn add(self, rhs: R) -> Expr<E, T> {
        self.arith(ArithOp::Add, rhs)
    }
}

impl<E, T: Arithmetic, R: Operand<E, T>> std::ops::Sub<R> for Expr<E, T> {
    type Output = Expr<E, T>;

    fn sub(self, rhs: R) -> Expr<E, T> {
        self.arith(ArithOp::Sub, rhs)
    }
}

impl<E, T: Arithmetic, R: Operand<E, T>> std::ops::Mul<R> for Expr<E, T> {
    type Output = Expr<E, T>;

    fn mul(self, rhs: R) -> Expr<E, T> {
        self.arith(ArithOp::Mul, rhs)
    }
}

impl<E, R: Operand<E, bool>> std::ops::BitAnd<R> for Expr<E, bool> {
    type Output = Expr<E, bool>;

    fn bitand(self, rhs: R) -> Expr<E, bool> {
        self.and(rhs)
    }
}

impl<E, R: Operand<E, bool>> std::ops::BitOr<R> for Expr<E, bool> {
    type Output = Expr<E, bool>;

    fn bitor(self, rhs: R) -> Expr<E, bool> {
        self.or(rhs)
    }
}

impl<E> std::ops::Not for Expr<E, bool> {
    type Output = Expr<E, bool>;

    fn not(self) -> Expr<E, bool> {
        Expr::not(self)
    }
}

/// A named, typed projection of an atom. Index names are field names.
pub struct Field<E, T> {
    pub(crate) inner: FieldRef<E>,
    _type: PhantomData<fn() -> T>,
}

impl<E, T> Clone for Field<E, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _type: PhantomData,
        }
    }
}

impl<E, T> fmt::Debug for Field<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.inner.name).finish()
    }
}

impl<E: 'static, T: DslValue> Field<E, T> {
    pub fn new<F>(name: &str, get: F) -> Self
    where
        F: Fn(&E) -> T + Send + Sync + 'static,
    {
        Self::from_getter(name, Arc::new(move |atom: &E| Some(get(atom).into_value())))
    }

    /// A field whose value may be absent; absent values are unknown.
    pub fn optional<F>(name: &str, get: F) -> Self
    where
        F: Fn(&E) -> Option<T> + Send + Sync + 'static,
    {
        Self::from_getter(
            name,
            Arc::new(move |atom: &E| get(atom).map(DslValue::into_value)),
        )
    }

    pub(crate) fn from_getter(name: &str, getter: Getter<E>) -> Self {
        Self {
            inner: FieldRef::new(name, T::VALUE_TYPE, getter),
            _type: PhantomData,
        }
    }
}

impl<E, T> Field<E, T> {
    /// Marks the field as a top-level scalar of the encoded record, so
    /// scans can read it without decoding the whole atom.
    pub fn with_direct_extraction(mut self) -> Self {
        self.inner.direct = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn expr(&self) -> Expr<E, T> {
        Expr::from_node(Node::Field(self.inner.clone()))
    }

    pub fn ascending(&self) -> OrderBy<E> {
        OrderBy::new(self.inner.clone(), Order::Asc)
    }

    pub fn descending(&self) -> OrderBy<E> {
        OrderBy::new(self.inner.clone(), Order::Desc)
    }

    pub fn eq(&self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.expr().eq(rhs)
    }

    pub fn ne(&self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.expr().ne(rhs)
    }

    pub fn lt(&self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.expr().lt(rhs)
    }

    pub fn le(&self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.expr().le(rhs)
    }

    pub fn gt(&self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.expr().gt(rhs)
    }

    pub fn ge(&self, rhs: impl Operand<E, T>) -> Expr<E, bool> {
        self.expr().ge(rhs)
    }

    pub fn is_null(&self) -> Expr<E, bool> {
        self.expr().is_null()
    }

    pub fn is_not_null(&self) -> Expr<E, bool> {
        self.expr().is_not_null()
    }

    pub fn in_(&self, values: impl IntoIterator<Item = T>) -> Expr<E, bool>
    where
        T: DslValue,
    {
        self.expr().in_(values)
    }

    pub(crate) fn into_ref(self) -> FieldRef<E> {
        self.inner
    }
}

impl<E: DeserializeOwned, T: DslValue> Field<E, T> {
    pub fn get(&self, atom: &E) -> Option<T> {
        self.inner.get(atom).and_then(|v| T::from_value(&v))
    }
}

impl<E> Field<E, bool> {
    pub fn and(&self, rhs: impl Operand<E, bool>) -> Expr<E, bool> {
        self.expr().and(rhs)
    }

    pub fn or(&self, rhs: impl Operand<E, bool>) -> Expr<E, bool> {
        self.expr().or(rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> Expr<E, bool> {
        self.expr().not()
    }
}

impl<E, T: Arithmetic, R: Operand<E, T>> std::ops::Add<R> for Field<E, T> {
    type Output = Expr<E, T>;

    fn add(self, rhs: R) -> Expr<E, T> {
        self.into_expr().arith(ArithOp::Add, rhs)
    }
}

impl<E, T: Arithmetic, R: Operand<E, T>> std::ops::Sub<R> for Field<E, T> {
    type Output = Expr<E, T>;

    fn sub(self, rhs: R) -> Expr<E, T> {
        self.into_expr().arith(ArithOp::Sub, rhs)
    }
}

impl<E, T: Arithmetic, R: Operand<E, T>> std::ops::Mul<R> for Field<E, T> {
    type Output = Expr<E, T>;

    fn mul(self, rhs: R) -> Expr<E, T> {
        self.into_expr().arith(ArithOp::Mul, rhs)
    }
}

impl<E> From<Field<E, bool>> for Expr<E, bool> {
    fn from(field: Field<E, bool>) -> Self {
        field.into_expr()
    }
}
