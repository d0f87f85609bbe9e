//! Tool descriptors and parameter validation.
//!
//! Every tool declares its parameters once, at registration. Arguments coming
//! from the host are checked against that declaration before any handler runs:
//! all violations are collected, defaults are filled in and integer clamps are
//! applied. The handler then deserializes the validated [`Params`] into its own
//! typed request struct.

use crate::error::{ToolError, ValidationError};
use crate::protocol::{ToolAnnotations, ToolDefinition};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

/// Declared type of a parameter.
#[derive(Debug, Clone)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    StringList,
    /// A string restricted to a fixed set of values.
    Enum(&'static [&'static str]),
}

impl ParamKind {
    fn expected(&self) -> String {
        match self {
            ParamKind::String => "string".to_string(),
            ParamKind::Integer => "integer".to_string(),
            ParamKind::Boolean => "boolean".to_string(),
            ParamKind::StringList => "array of strings".to_string(),
            ParamKind::Enum(allowed) => format!("one of [{}]", allowed.join(", ")),
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Integer => json!({ "type": "integer" }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::StringList => json!({ "type": "array", "items": { "type": "string" } }),
            ParamKind::Enum(allowed) => json!({ "type": "string", "enum": allowed }),
        }
    }
}

/// Declaration of one named parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
    /// Inclusive bounds; out-of-range integers are clamped, not rejected.
    pub clamp: Option<(i64, i64)>,
    pub pattern: Option<Regex>,
    /// Set when `pattern()` was given an invalid expression.
    pub(crate) invalid_pattern: Option<String>,
    /// Reject empty or whitespace-only strings.
    pub non_empty: bool,
}

impl ParamSpec {
    fn new(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            description: "",
            clamp: None,
            pattern: None,
            invalid_pattern: None,
            non_empty: false,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, ParamKind::String)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, ParamKind::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, ParamKind::Boolean)
    }

    pub fn string_list(name: &'static str) -> Self {
        Self::new(name, ParamKind::StringList)
    }

    pub fn one_of(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self::new(name, ParamKind::Enum(allowed))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn clamp(mut self, min: i64, max: i64) -> Self {
        self.clamp = Some((min, max));
        self
    }

    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    /// Require string values to match `pattern`.
    ///
    /// An invalid expression is reported when the tool is registered.
    pub fn pattern(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => self.pattern = Some(re),
            Err(e) => self.invalid_pattern = Some(format!("{}: {}", pattern, e)),
        }
        self
    }

    fn json_schema(&self) -> Value {
        let mut schema = self.kind.json_schema();
        if !self.description.is_empty() {
            schema["description"] = json!(self.description);
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        if let Some((min, max)) = self.clamp {
            schema["minimum"] = json!(min);
            schema["maximum"] = json!(max);
        }
        if let Some(re) = &self.pattern {
            schema["pattern"] = json!(re.as_str());
        }
        if self.non_empty {
            schema["minLength"] = json!(1);
        }
        schema
    }

    /// Check one supplied value, returning the (possibly clamped) value.
    fn check(&self, value: &Value, errors: &mut ValidationError) -> Option<Value> {
        let expected = self.kind.expected();
        match &self.kind {
            ParamKind::String | ParamKind::Enum(_) => {
                let Some(s) = value.as_str() else {
                    errors.push(self.name, format!("must be {}", expected));
                    return None;
                };
                if let ParamKind::Enum(allowed) = &self.kind {
                    if !allowed.iter().any(|a| *a == s) {
                        errors.push(self.name, format!("must be {}, got '{}'", expected, s));
                        return None;
                    }
                }
                if self.non_empty && s.trim().is_empty() {
                    errors.push(self.name, "must not be empty");
                    return None;
                }
                if let Some(re) = &self.pattern {
                    if !re.is_match(s) {
                        errors.push(self.name, format!("does not match pattern {}", re.as_str()));
                        return None;
                    }
                }
                Some(value.clone())
            }
            ParamKind::Integer => {
                let Some(n) = as_integer(value) else {
                    errors.push(self.name, format!("must be {}", expected));
                    return None;
                };
                let n = match self.clamp {
                    Some((min, max)) => n.clamp(min as i128, max as i128),
                    None => n,
                };
                match i64::try_from(n) {
                    Ok(n) => Some(json!(n)),
                    Err(_) => {
                        errors.push(self.name, "is out of range");
                        None
                    }
                }
            }
            ParamKind::Boolean => {
                if value.is_boolean() {
                    Some(value.clone())
                } else {
                    errors.push(self.name, format!("must be {}", expected));
                    None
                }
            }
            ParamKind::StringList => {
                let ok = value
                    .as_array()
                    .is_some_and(|items| items.iter().all(Value::is_string));
                if ok {
                    Some(value.clone())
                } else {
                    errors.push(self.name, format!("must be {}", expected));
                    None
                }
            }
        }
    }
}

/// Integers arrive as JSON numbers; accept `10.0` but not `10.5`.
fn as_integer(value: &Value) -> Option<i128> {
    if let Some(n) = value.as_i64() {
        return Some(n as i128);
    }
    if let Some(n) = value.as_u64() {
        return Some(n as i128);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f.is_finite() {
        Some(f as i128)
    } else {
        None
    }
}

/// Immutable description of a tool, registered once at startup.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    /// Reject arguments that are not declared.
    pub strict: bool,
    /// The tool performs no upstream writes.
    pub read_only: bool,
}

impl ToolDescriptor {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            params: Vec::new(),
            strict: false,
            read_only: true,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Mark the tool as having an upstream side effect.
    pub fn side_effecting(mut self) -> Self {
        self.read_only = false;
        self
    }

    /// Validate host-supplied arguments against the declaration.
    ///
    /// Fails closed: any violation rejects the whole invocation and every
    /// violation is reported.
    pub fn validate(&self, arguments: &Value) -> Result<Params, ValidationError> {
        let empty = Map::new();
        let supplied = match arguments {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => return Err(ValidationError::field("arguments", "must be an object")),
        };

        let mut errors = ValidationError::new();
        let mut values = Map::new();

        for spec in &self.params {
            match supplied.get(spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        errors.push(spec.name, "is required");
                    } else if let Some(default) = &spec.default {
                        values.insert(spec.name.to_string(), default.clone());
                    }
                }
                Some(value) => {
                    if let Some(checked) = spec.check(value, &mut errors) {
                        values.insert(spec.name.to_string(), checked);
                    }
                }
            }
        }

        if self.strict {
            for key in supplied.keys() {
                if !self.params.iter().any(|p| p.name == key) {
                    errors.push(key.as_str(), "is not a recognized parameter");
                }
            }
        }

        if errors.is_empty() {
            Ok(Params { values })
        } else {
            Err(errors)
        }
    }

    /// JSON Schema advertised in `tools/list`.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.params {
            properties.insert(spec.name.to_string(), spec.json_schema());
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if self.strict {
            schema["additionalProperties"] = json!(false);
        }
        schema
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            input_schema: self.input_schema(),
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(self.read_only),
                idempotent_hint: Some(self.read_only),
            }),
        }
    }
}

/// Arguments that passed validation, with defaults applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Map<String, Value>,
}

impl Params {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    /// Deserialize into the handler's typed request.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.values))
            .map_err(|e| ValidationError::field("arguments", e.to_string()).into())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: &[&str] = &["open", "closed", "all"];

    fn list_issues() -> ToolDescriptor {
        ToolDescriptor::new("list_issues", "List issues")
            .param(ParamSpec::string("owner").required())
            .param(ParamSpec::string("repo").required())
            .param(ParamSpec::one_of("state", STATES).default_value("open"))
            .param(ParamSpec::integer("limit").default_value(10).clamp(1, 100))
    }

    #[test]
    fn test_missing_required_fields_are_all_reported() {
        let err = list_issues().validate(&json!({})).unwrap_err();
        assert_eq!(err.fields(), vec!["owner", "repo"]);
    }

    #[test]
    fn test_wrong_type_names_expected_type() {
        let err = list_issues()
            .validate(&json!({"owner": 1, "repo": "r", "limit": "ten"}))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["owner", "limit"]);
        assert!(err.violations[0].reason.contains("string"));
        assert!(err.violations[1].reason.contains("integer"));
    }

    #[test]
    fn test_defaults_applied() {
        let params = list_issues()
            .validate(&json!({"owner": "o", "repo": "r"}))
            .unwrap();
        assert_eq!(params.str("state"), Some("open"));
        assert_eq!(params.i64("limit"), Some(10));
    }

    #[test]
    fn test_limit_is_clamped() {
        let d = list_issues();
        let high = d
            .validate(&json!({"owner": "o", "repo": "r", "limit": 500}))
            .unwrap();
        assert_eq!(high.i64("limit"), Some(100));

        let low = d
            .validate(&json!({"owner": "o", "repo": "r", "limit": -3}))
            .unwrap();
        assert_eq!(low.i64("limit"), Some(1));

        let huge = d
            .validate(&json!({"owner": "o", "repo": "r", "limit": u64::MAX}))
            .unwrap();
        assert_eq!(huge.i64("limit"), Some(100));
    }

    #[test]
    fn test_enum_outside_set_rejected() {
        let err = list_issues()
            .validate(&json!({"owner": "o", "repo": "r", "state": "merged"}))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["state"]);
        assert!(err.violations[0].reason.contains("open, closed, all"));
    }

    #[test]
    fn test_extra_fields_ignored_unless_strict() {
        let args = json!({"owner": "o", "repo": "r", "extra": true});
        assert!(list_issues().validate(&args).is_ok());

        let err = list_issues().strict().validate(&args).unwrap_err();
        assert_eq!(err.fields(), vec!["extra"]);
    }

    #[test]
    fn test_null_counts_as_omitted() {
        let params = list_issues()
            .validate(&json!({"owner": "o", "repo": "r", "state": null}))
            .unwrap();
        assert_eq!(params.str("state"), Some("open"));
    }

    #[test]
    fn test_non_empty_and_pattern() {
        let d = ToolDescriptor::new("t", "t")
            .param(ParamSpec::string("title").required().non_empty())
            .param(ParamSpec::string("owner").pattern(r"^[A-Za-z0-9_.-]+$"));
        let err = d
            .validate(&json!({"title": "   ", "owner": "../etc"}))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["title", "owner"]);
    }

    #[test]
    fn test_non_object_arguments() {
        let err = list_issues().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.fields(), vec!["arguments"]);
    }

    #[test]
    fn test_input_schema() {
        let schema = list_issues().input_schema();
        assert_eq!(schema["required"], json!(["owner", "repo"]));
        assert_eq!(schema["properties"]["limit"]["maximum"], json!(100));
        assert_eq!(schema["properties"]["state"]["default"], json!("open"));
    }

    #[test]
    fn test_into_typed() {
        #[derive(serde::Deserialize)]
        struct Req {
            owner: String,
            limit: u32,
        }
        let req: Req = list_issues()
            .validate(&json!({"owner": "o", "repo": "r", "limit": 7}))
            .unwrap()
            .into_typed()
            .unwrap();
        assert_eq!(req.owner, "o");
        assert_eq!(req.limit, 7);
    }
}
