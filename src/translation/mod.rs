use std::borrow::Cow;

mod parsers;
mod scanner;

pub(crate) use scanner::{Marker, scan_placeholders};

/// Target placeholder style for translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1` or `?`.
    Sqlite,
}

/// How to resolve translation for one statement relative to the instance default.
///
/// # Examples
/// ```rust
/// use sql_bridge::prelude::*;
///
/// // JSON operators like `?|` must reach PostgreSQL untouched.
/// let stmt = Statement::new("SELECT doc ?| array['a'] FROM t WHERE id = $1")
///     .bind(1)
///     .with_translation(TranslationMode::ForceOff);
/// # let _ = stmt;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationMode {
    /// Follow the configured instance default.
    #[default]
    InstanceDefault,
    /// Force translation on.
    ForceOn,
    /// Force translation off.
    ForceOff,
}

impl TranslationMode {
    #[must_use]
    pub fn resolve(self, instance_default: bool) -> bool {
        match self {
            TranslationMode::InstanceDefault => instance_default,
            TranslationMode::ForceOn => true,
            TranslationMode::ForceOff => false,
        }
    }
}

/// Whether `marker` is a bound parameter when `sql` runs on `target`.
///
/// `SQLite` accepts every form natively. PostgreSQL only understands `$N`;
/// `?N` is rewritten when translation is on, and a bare `?` is never a
/// parameter there since `?`, `?|` and `?&` are jsonb operators.
fn binds(marker: Marker, target: PlaceholderStyle, enabled: bool) -> bool {
    match (target, marker) {
        (PlaceholderStyle::Sqlite, _) | (PlaceholderStyle::Postgres, Marker::DollarNumbered(_)) => {
            true
        }
        (PlaceholderStyle::Postgres, Marker::QuestionNumbered(_)) => enabled,
        (PlaceholderStyle::Postgres, Marker::Anonymous) => false,
    }
}

/// Number of positional parameters `sql` expects on `target`.
///
/// This is the highest position any placeholder binds to, so `?1 ... ?1`
/// expects one parameter and `?, ?` expects two on `SQLite`.
#[must_use]
pub fn count_placeholders(sql: &str, target: PlaceholderStyle, enabled: bool) -> usize {
    scan_placeholders(sql)
        .iter()
        .filter(|p| binds(p.marker, target, enabled))
        .map(|p| p.position)
        .max()
        .unwrap_or(0)
}

/// Rewrite positional placeholders into the style `target` understands.
///
/// `?N` becomes `$N` for PostgreSQL; `$N` becomes `?N` for `SQLite`. A bare
/// `?` is left alone for PostgreSQL. Quoted strings, comments and
/// dollar-quoted bodies are skipped. Returns a borrowed `Cow` when nothing
/// needs to change.
#[must_use]
pub fn translate_placeholders(sql: &str, target: PlaceholderStyle, enabled: bool) -> Cow<'_, str> {
    if !enabled {
        return Cow::Borrowed(sql);
    }

    let mut out: Option<String> = None;
    let mut copied_to = 0;
    for placeholder in scan_placeholders(sql) {
        let replacement = match (target, placeholder.marker) {
            (PlaceholderStyle::Postgres, Marker::QuestionNumbered(n)) => format!("${n}"),
            (PlaceholderStyle::Sqlite, Marker::DollarNumbered(n)) => format!("?{n}"),
            _ => continue,
        };
        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        buf.push_str(&sql[copied_to..placeholder.start]);
        buf.push_str(&replacement);
        copied_to = placeholder.end;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_to..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}
