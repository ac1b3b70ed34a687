use std::borrow::Cow;

use crate::error::DbError;
use crate::translation::{
    PlaceholderStyle, TranslationMode, count_placeholders, translate_placeholders,
};
use crate::types::Value;

/// Query text plus the positional parameters bound to it.
///
/// Parameters bind left-to-right to positions `1..=N`:
/// ```rust
/// use sql_bridge::prelude::*;
///
/// let stmt = Statement::new("INSERT INTO points (player, amount) VALUES (?1, ?2)")
///     .bind("steve")
///     .bind(25);
/// assert_eq!(stmt.params().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    translation: TranslationMode,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            translation: TranslationMode::default(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            translation: TranslationMode::default(),
        }
    }

    /// Append the parameter for the next position.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    #[must_use]
    pub fn with_translation(mut self, translation: TranslationMode) -> Self {
        self.translation = translation;
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    #[must_use]
    pub fn translation(&self) -> TranslationMode {
        self.translation
    }

    /// Number of parameters the statement text expects on a backend using
    /// `style`, given the instance's translation default.
    #[must_use]
    pub fn placeholder_count(&self, style: PlaceholderStyle, translate_default: bool) -> usize {
        count_placeholders(&self.sql, style, self.translation.resolve(translate_default))
    }

    /// Check the parameter count against the placeholders.
    ///
    /// # Errors
    /// Returns [`DbError::Binding`] when the counts differ.
    pub fn check_binding(
        &self,
        style: PlaceholderStyle,
        translate_default: bool,
    ) -> Result<(), DbError> {
        let expected = self.placeholder_count(style, translate_default);
        if expected == self.params.len() {
            Ok(())
        } else {
            Err(DbError::Binding {
                sql: self.sql.clone(),
                expected,
                actual: self.params.len(),
            })
        }
    }

    /// Validate the binding and render the text for a backend.
    pub(crate) fn prepare(
        &self,
        style: PlaceholderStyle,
        translate_default: bool,
    ) -> Result<PreparedSql<'_>, DbError> {
        self.check_binding(style, translate_default)?;
        Ok(PreparedSql {
            text: translate_placeholders(
                &self.sql,
                style,
                self.translation.resolve(translate_default),
            ),
            statement: self,
        })
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

/// A statement whose binding has been checked, with backend-ready text.
///
/// Errors are always reported against the original statement text.
#[derive(Debug)]
pub(crate) struct PreparedSql<'a> {
    pub text: Cow<'a, str>,
    pub statement: &'a Statement,
}

impl PreparedSql<'_> {
    pub fn params(&self) -> &[Value] {
        self.statement.params()
    }

    pub fn execution_error(&self, message: impl ToString) -> DbError {
        DbError::execution(self.statement.sql(), self.params().len(), message)
    }
}
