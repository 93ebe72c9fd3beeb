//! Read options shared by `find`-style operations.

use dynadoc_engine::{Error as EngineError, SortSpec};
use serde_json::Value;

/// Skip, limit, ordering and population of a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Documents to drop from the front of the result
    pub skip: usize,
    /// Maximum documents to return
    pub limit: Option<usize>,
    /// Post-read ordering
    pub sort: Option<SortSpec>,
    /// Reference or virtual fields to resolve
    pub populate: Vec<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Populate a space-separated list of fields.
    pub fn populate(mut self, fields: &str) -> Self {
        self.populate
            .extend(fields.split_whitespace().map(str::to_string));
        self
    }

    /// Parse an options object such as
    /// `{"skip": 10, "limit": 5, "sort": "-age", "populate": "owner"}`.
    pub fn from_value(value: &Value) -> Result<Self, EngineError> {
        let Some(fields) = value.as_object() else {
            return match value {
                Value::Null => Ok(Self::default()),
                other => Err(EngineError::data_format(format!("invalid options {other}"))),
            };
        };

        let mut options = Self::default();
        for (key, value) in fields {
            match key.as_str() {
                "skip" => options.skip = count(key, value)?,
                "limit" => options.limit = Some(count(key, value)?),
                "sort" => options.sort = SortSpec::from_value(value)?,
                "populate" => match value {
                    Value::String(s) => options = options.populate(s),
                    Value::Array(items) => {
                        for item in items {
                            let field = item.as_str().ok_or_else(|| {
                                EngineError::data_format(format!("invalid populate entry {item}"))
                            })?;
                            options = options.populate(field);
                        }
                    }
                    other => {
                        return Err(EngineError::data_format(format!(
                            "invalid populate {other}"
                        )))
                    }
                },
                other => tracing::debug!(option = other, "ignoring unknown read option"),
            }
        }
        Ok(options)
    }
}

fn count(key: &str, value: &Value) -> Result<usize, EngineError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| EngineError::data_format(format!("{key} must be a non-negative integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_options_object() {
        let options = QueryOptions::from_value(&json!({
            "skip": 2,
            "limit": 5,
            "sort": {"age": -1},
            "populate": "owner members"
        }))
        .unwrap();
        assert_eq!(options.skip, 2);
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.sort, Some(SortSpec::descending("age")));
        assert_eq!(options.populate, vec!["owner", "members"]);
    }

    #[test]
    fn rejects_negative_limit() {
        assert!(QueryOptions::from_value(&json!({"limit": -1})).is_err());
        assert_eq!(
            QueryOptions::from_value(&Value::Null).unwrap(),
            QueryOptions::default()
        );
    }
}
