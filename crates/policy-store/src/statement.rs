//! Parameterized SQL statements rendered to plain strings.
//!
//! The helper binary only accepts a single statement string, so values are
//! bound by rendering them as SQL literals in place of `?` placeholders.

use std::fmt;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Int(value) => write!(f, "{value}"),
            SqlValue::Text(value) => write!(f, "'{}'", value.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    template: &'static str,
    values: Vec<SqlValue>,
}

impl Statement {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            values: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Renders the statement. Placeholders inside quoted literals of the
    /// template are left alone.
    pub fn render(&self) -> Result<String, StoreError> {
        let mut output = String::with_capacity(self.template.len() + self.values.len() * 8);
        let mut values = self.values.iter();
        let mut placeholders = 0usize;
        let mut in_literal = false;

        for ch in self.template.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    output.push(ch);
                }
                '?' if !in_literal => {
                    placeholders += 1;
                    match values.next() {
                        Some(value) => output.push_str(&value.to_string()),
                        None => {
                            return Err(StoreError::Binding {
                                placeholders: self.count_placeholders(),
                                bound: self.values.len(),
                            })
                        }
                    }
                }
                _ => output.push(ch),
            }
        }

        if placeholders != self.values.len() {
            return Err(StoreError::Binding {
                placeholders,
                bound: self.values.len(),
            });
        }
        Ok(output)
    }

    fn count_placeholders(&self) -> usize {
        let mut in_literal = false;
        self.template
            .chars()
            .filter(|ch| {
                if *ch == '\'' {
                    in_literal = !in_literal;
                }
                *ch == '?' && !in_literal
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_values_in_order() {
        let sql = Statement::new("UPDATE policies SET logging=? WHERE uid=?")
            .bind(false)
            .bind(10_050)
            .render()
            .unwrap();
        assert_eq!(sql, "UPDATE policies SET logging=0 WHERE uid=10050");
    }

    #[test]
    fn escapes_text() {
        let sql = Statement::new("SELECT * FROM strings WHERE key=?")
            .bind("it's")
            .render()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM strings WHERE key='it''s'");
    }

    #[test]
    fn ignores_placeholders_in_literals() {
        let sql = Statement::new("SELECT '?' AS mark, uid FROM policies WHERE uid=?")
            .bind(1)
            .render()
            .unwrap();
        assert_eq!(sql, "SELECT '?' AS mark, uid FROM policies WHERE uid=1");
    }

    #[test]
    fn rejects_arity_mismatch() {
        let missing = Statement::new("DELETE FROM policies WHERE uid=?").render();
        assert!(matches!(
            missing,
            Err(StoreError::Binding {
                placeholders: 1,
                bound: 0
            })
        ));

        let extra = Statement::new("DELETE FROM policies").bind(3).render();
        assert!(matches!(
            extra,
            Err(StoreError::Binding {
                placeholders: 0,
                bound: 1
            })
        ));
    }
}
