//! Minimal template language for rename paths
//!
//! Supports `{{ var }}` substitutions and single-level
//! `{% if var %}...{% endif %}` blocks. Rendering never fails: unknown
//! variables become empty text and malformed directives stay literal.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fmt;

static IF_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{%\s*if\s+([A-Za-z0-9_]+)\s*%\}([\s\S]*?)\{%\s*endif\s*%\}")
        .expect("if-block pattern is a valid regex")
});

static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("variable pattern is a valid regex")
});

static HORIZONTAL_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+").expect("whitespace pattern is a valid regex"));

static SPACE_BEFORE_SLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" +/").expect("separator pattern is a valid regex"));

/// A value that can be bound to a template variable
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Number(i64),
    List(Vec<String>),
}

impl Value {
    /// Truthiness used by `{% if %}` blocks
    ///
    /// Null is false, text is false when blank, lists are false when empty.
    /// Everything else, including the number zero, is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Text(text) => !text.trim().is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Number(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(text) => f.write_str(text),
            Value::Number(n) => write!(f, "{n}"),
            Value::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Flat variable bindings for [`render`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    values: BTreeMap<String, Value>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(Value::is_truthy)
    }
}

/// Renders a template against a context
///
/// Conditional blocks are resolved first, then substitutions. The output has
/// runs of spaces and tabs collapsed, spaces before `/` removed and outer
/// whitespace trimmed.
///
/// # Examples
///
/// ```
/// use emby_meta::{render_template, TemplateContext};
///
/// let template = "{{ title }}{% if year %} ({{ year }}){% endif %}";
/// let ctx = TemplateContext::new().with("title", "Foo").with("year", "2020");
/// assert_eq!(render_template(template, &ctx), "Foo (2020)");
/// ```
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    let with_blocks = IF_BLOCK_RE.replace_all(template, |caps: &Captures<'_>| {
        if ctx.is_truthy(&caps[1]) {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    let substituted = VARIABLE_RE.replace_all(&with_blocks, |caps: &Captures<'_>| {
        ctx.get(&caps[1]).map(Value::to_string).unwrap_or_default()
    });

    let collapsed = HORIZONTAL_SPACE_RE.replace_all(&substituted, " ");
    SPACE_BEFORE_SLASH_RE
        .replace_all(&collapsed, "/")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TITLE_YEAR: &str = "{{ title }}{% if year %} ({{ year }}){% endif %}";

    #[test]
    fn test_conditional_removed_when_empty() {
        let ctx = TemplateContext::new().with("title", "Foo").with("year", "");
        assert_eq!(render(TITLE_YEAR, &ctx), "Foo");
    }

    #[test]
    fn test_conditional_kept_when_set() {
        let ctx = TemplateContext::new().with("title", "Foo").with("year", "2020");
        assert_eq!(render(TITLE_YEAR, &ctx), "Foo (2020)");
    }

    #[test]
    fn test_missing_variable_is_empty() {
        assert_eq!(render("{{ missing }}", &TemplateContext::new()), "");
        assert_eq!(render("a{{missing}}b", &TemplateContext::new()), "ab");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("   ").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Number(0).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::List(vec!["a".into()]).is_truthy());
    }

    #[test]
    fn test_zero_is_truthy_in_blocks() {
        let ctx = TemplateContext::new().with("season", 0u32);
        assert_eq!(render("{% if season %}S{{ season }}{% endif %}", &ctx), "S0");
    }

    #[test]
    fn test_nested_endif_closes_first_if() {
        let ctx = TemplateContext::new().with("a", "1");
        let out = render("{% if a %}x{% if b %}y{% endif %}z{% endif %}", &ctx);
        assert_eq!(out, "x{% if b %}yz{% endif %}");
    }

    #[test]
    fn test_whitespace_cleanup() {
        let ctx = TemplateContext::new().with("title", "Foo").with("sub", "");
        assert_eq!(render("  {{ title }}  \t{{ sub }} /Season 1  ", &ctx), "Foo/Season 1");
    }

    #[test]
    fn test_malformed_directives_stay_literal() {
        let ctx = TemplateContext::new().with("title", "Foo");
        assert_eq!(render("{{ title-x }} {% if %}", &ctx), "{{ title-x }} {% if %}");
    }

    #[test]
    fn test_list_and_number_substitution() {
        let ctx = TemplateContext::new()
            .with("tags", vec!["a".to_string(), "b".to_string()])
            .with("n", 7u32);
        assert_eq!(render("{{ tags }}-{{ n }}", &ctx), "a,b-7");
    }
}
