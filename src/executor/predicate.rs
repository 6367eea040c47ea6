use std::cmp::Ordering;

use crate::storage::schema::TableSchema;
use crate::types::error::{DatabaseError, Result};
use crate::types::row::Row;
use crate::types::value::{compare_values, Value};

/// Comparison operators for predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    IsNull,
    IsNotNull,
}

/// Logical operators for combining predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// A predicate expression for filtering rows in `get`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Column comparison: column_name op value
    Comparison {
        column_name: String,
        op: ComparisonOp,
        value: Value,
    },
    /// Logical combination of predicates
    Logical {
        op: LogicalOp,
        left: Box<Predicate>,
        right: Option<Box<Predicate>>, // None for NOT
    },
    /// Always true
    True,
}

impl Predicate {
    pub fn eq(column_name: impl Into<String>, value: Value) -> Self {
        Self::cmp(column_name, ComparisonOp::Equal, value)
    }

    pub fn ne(column_name: impl Into<String>, value: Value) -> Self {
        Self::cmp(column_name, ComparisonOp::NotEqual, value)
    }

    pub fn lt(column_name: impl Into<String>, value: Value) -> Self {
        Self::cmp(column_name, ComparisonOp::LessThan, value)
    }

    pub fn le(column_name: impl Into<String>, value: Value) -> Self {
        Self::cmp(column_name, ComparisonOp::LessThanOrEqual, value)
    }

    pub fn gt(column_name: impl Into<String>, value: Value) -> Self {
        Self::cmp(column_name, ComparisonOp::GreaterThan, value)
    }

    pub fn ge(column_name: impl Into<String>, value: Value) -> Self {
        Self::cmp(column_name, ComparisonOp::GreaterThanOrEqual, value)
    }

    pub fn is_null(column_name: impl Into<String>) -> Self {
        Self::cmp(column_name, ComparisonOp::IsNull, Value::Null)
    }

    pub fn is_not_null(column_name: impl Into<String>) -> Self {
        Self::cmp(column_name, ComparisonOp::IsNotNull, Value::Null)
    }

    pub fn cmp(column_name: impl Into<String>, op: ComparisonOp, value: Value) -> Self {
        Self::Comparison {
            column_name: column_name.into(),
            op,
            value,
        }
    }

    pub fn and(left: Predicate, right: Predicate) -> Self {
        Self::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Some(Box::new(right)),
        }
    }

    pub fn or(left: Predicate, right: Predicate) -> Self {
        Self::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Some(Box::new(right)),
        }
    }

    pub fn not(predicate: Predicate) -> Self {
        Self::Logical {
            op: LogicalOp::Not,
            left: Box::new(predicate),
            right: None,
        }
    }

    /// Check every referenced column exists before any row is touched.
    pub fn validate_against_schema(&self, schema: &TableSchema) -> Result<()> {
        match self {
            Predicate::Comparison { column_name, .. } => {
                if schema.get_column(column_name).is_none() {
                    return Err(DatabaseError::ColumnNotFound {
                        name: column_name.clone(),
                        table: schema.table_name.clone(),
                    });
                }
                Ok(())
            }
            Predicate::Logical { left, right, .. } => {
                left.validate_against_schema(schema)?;
                if let Some(right) = right {
                    right.validate_against_schema(schema)?;
                }
                Ok(())
            }
            Predicate::True => Ok(()),
        }
    }

    /// Evaluate the predicate against a row using the table schema.
    pub fn evaluate(&self, row: &Row, schema: &TableSchema) -> Result<bool> {
        match self {
            Predicate::Comparison {
                column_name,
                op,
                value,
            } => {
                let index = schema.get_column_index(column_name).ok_or_else(|| {
                    DatabaseError::ColumnNotFound {
                        name: column_name.clone(),
                        table: schema.table_name.clone(),
                    }
                })?;
                let row_value = row.get_value(index).unwrap_or(&Value::Null);
                Ok(compare(row_value, *op, value))
            }
            Predicate::Logical { op, left, right } => match op {
                LogicalOp::And => {
                    let right = right.as_ref().expect("AND has two operands");
                    Ok(left.evaluate(row, schema)? && right.evaluate(row, schema)?)
                }
                LogicalOp::Or => {
                    let right = right.as_ref().expect("OR has two operands");
                    Ok(left.evaluate(row, schema)? || right.evaluate(row, schema)?)
                }
                LogicalOp::Not => Ok(!left.evaluate(row, schema)?),
            },
            Predicate::True => Ok(true),
        }
    }

    /// Strict-equality constraints usable for index selection: every
    /// `column = literal` term that must hold for the predicate to hold.
    /// Only top-level terms and AND branches qualify; anything reachable
    /// through OR or NOT cannot drive an index probe.
    pub fn equality_constraints(&self) -> Vec<(&str, &Value)> {
        let mut found = Vec::new();
        self.collect_equalities(&mut found);
        found
    }

    fn collect_equalities<'a>(&'a self, found: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Predicate::Comparison {
                column_name,
                op: ComparisonOp::Equal,
                value,
            } if !value.is_null() => found.push((column_name.as_str(), value)),
            Predicate::Logical {
                op: LogicalOp::And,
                left,
                right,
            } => {
                left.collect_equalities(found);
                if let Some(right) = right {
                    right.collect_equalities(found);
                }
            }
            _ => {}
        }
    }
}

fn compare(row_value: &Value, op: ComparisonOp, literal: &Value) -> bool {
    match op {
        ComparisonOp::IsNull => return row_value.is_null(),
        ComparisonOp::IsNotNull => return !row_value.is_null(),
        _ => {}
    }
    // NULL never compares equal, less, or greater to anything.
    if row_value.is_null() || literal.is_null() {
        return false;
    }
    let ord = compare_values(row_value, literal);
    match op {
        ComparisonOp::Equal => ord == Ordering::Equal,
        ComparisonOp::NotEqual => ord != Ordering::Equal,
        ComparisonOp::LessThan => ord == Ordering::Less,
        ComparisonOp::LessThanOrEqual => ord != Ordering::Greater,
        ComparisonOp::GreaterThan => ord == Ordering::Greater,
        ComparisonOp::GreaterThanOrEqual => ord != Ordering::Less,
        ComparisonOp::IsNull | ComparisonOp::IsNotNull => unreachable!(),
    }
}
