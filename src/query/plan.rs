use crate::error::AtomError;
use crate::query::expr::{Expr, FieldRef, Node};
use std::fmt;

/// Maximum nesting depth for filter expressions to prevent stack overflow
const MAX_EXPR_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// One ordering term. Unknown values sort first ascending, last descending.
pub struct OrderBy<E> {
    pub(crate) field: FieldRef<E>,
    pub(crate) order: Order,
}

impl<E> OrderBy<E> {
    pub(crate) fn new(field: FieldRef<E>, order: Order) -> Self {
        Self { field, order }
    }

    pub fn field_name(&self) -> &str {
        &self.field.name
    }

    pub fn order(&self) -> Order {
        self.order
    }
}

impl<E> Clone for OrderBy<E> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            order: self.order,
        }
    }
}

impl<E> fmt::Debug for OrderBy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.field.name, self.order)
    }
}

/// A typed query over atoms of type `E`.
pub struct Query<E> {
    pub(crate) filter: Option<Expr<E, bool>>,
    pub(crate) order_by: Vec<OrderBy<E>>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: usize,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<E> Query<E> {
    pub fn all() -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn filter(predicate: impl Into<Expr<E, bool>>) -> Self {
        Self {
            filter: Some(predicate.into()),
            ..Self::all()
        }
    }

    pub fn order_by(mut self, order: OrderBy<E>) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    pub fn predicate(&self) -> Option<&Expr<E, bool>> {
        self.filter.as_ref()
    }

    /// Rows the executor must hold before slicing off the offset.
    pub(crate) fn window(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_add(self.offset))
    }

    /// Validates that the filter depth does not exceed MAX_EXPR_DEPTH.
    pub fn validate_depth(&self) -> Result<(), AtomError> {
        let Some(filter) = &self.filter else {
            return Ok(());
        };
        let depth = depth(&filter.node);
        if depth > MAX_EXPR_DEPTH {
            return Err(AtomError::InvalidQuery {
                reason: format!(
                    "expression depth {depth} exceeds maximum allowed depth of {MAX_EXPR_DEPTH}"
                ),
            });
        }
        Ok(())
    }
}

fn depth<E>(node: &Node<E>) -> usize {
    match node {
        Node::Literal(_) | Node::Field(_) => 1,
        Node::Not(n) | Node::IsNull(n) | Node::IsNotNull(n) | Node::In(n, _) => 1 + depth(n),
        Node::Compare(_, l, r)
        | Node::Arith(_, _, l, r)
        | Node::And(l, r)
        | Node::Or(l, r) => 1 + depth(l).max(depth(r)),
    }
}

impl<E> From<Expr<E, bool>> for Query<E> {
    fn from(predicate: Expr<E, bool>) -> Self {
        Query::filter(predicate)
    }
}
