//! Argument sets and command-line composition

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::argument::Argument;
use crate::error::{Error, Result};

/// Caller-supplied `name -> value` overrides applied just before composition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeArguments(BTreeMap<String, String>);

impl RuntimeArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a `name=value` pair as given on a command line
    pub fn parse_pair(pair: &str) -> Result<(String, String)> {
        match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(Error::config(format!(
                "expected name=value, got '{}'",
                pair
            ))),
        }
    }
}

impl FromIterator<(String, String)> for RuntimeArguments {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered argument list plus rendering rules for one app.
///
/// In raw mode the legacy convention applies: `arguments[0]` holds the
/// executable path and `arguments[1]` the literal tail passed verbatim.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Configuration {
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub delimiter: String,

    #[serde(default)]
    pub is_raw: bool,

    #[serde(default)]
    arguments: Vec<Argument>,
}

impl Configuration {
    /// Build a configuration, checking every conditional requirement.
    pub fn new(
        prefix: impl Into<String>,
        delimiter: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Result<Self> {
        let config = Self {
            prefix: prefix.into(),
            delimiter: delimiter.into(),
            is_raw: false,
            arguments,
        };
        config.check()?;
        Ok(config)
    }

    /// Build a raw pass-through configuration
    pub fn raw(arguments: Vec<Argument>) -> Self {
        Self {
            prefix: String::new(),
            delimiter: String::new(),
            is_raw: true,
            arguments,
        }
    }

    /// Verify construction-time invariants (used after deserialization).
    pub fn check(&self) -> Result<()> {
        for arg in &self.arguments {
            arg.condition()?;
        }
        Ok(())
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }

    pub fn argument_mut(&mut self, name: &str) -> Option<&mut Argument> {
        self.arguments.iter_mut().find(|a| a.name == name)
    }

    /// Set an argument's value by name
    pub fn set_value(&mut self, name: &str, value: Option<String>) -> Result<()> {
        let arg = self
            .argument_mut(name)
            .ok_or_else(|| Error::UnknownArgument {
                name: name.to_string(),
            })?;
        arg.value = value;
        Ok(())
    }

    /// Arguments that belong in persisted configuration
    pub fn persistable_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| !a.is_runtime_argument)
    }

    /// Whether there is anything for a user to configure
    pub fn is_configurable(&self) -> bool {
        self.persistable_arguments().next().is_some()
    }

    pub fn mark_saved(&mut self) {
        for arg in &mut self.arguments {
            arg.mark_saved();
        }
    }

    pub fn changed_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.is_value_changed())
    }

    /// Compose the command-line string for the current values.
    ///
    /// Runtime overrides are applied to a working copy, so stored values are
    /// left untouched. Validation failures surface as [`Error::Argument`].
    pub fn generate_argument_string(&self, runtime: &RuntimeArguments) -> Result<String> {
        let mut arguments = self.arguments.clone();

        for (name, value) in runtime.iter() {
            match arguments.iter_mut().find(|a| a.name == name) {
                Some(arg) => arg.value = Some(value.to_string()),
                None => tracing::debug!("Ignoring runtime argument for unknown name: {}", name),
            }
        }

        if self.is_raw {
            return Ok(match arguments.as_slice() {
                [_, tail] => tail.value_str().to_string(),
                _ => String::new(),
            });
        }

        // Conditional requirements depend on current data; recompute every time.
        let mut gated = vec![false; arguments.len()];
        for i in 0..arguments.len() {
            let Some((other, literal)) = arguments[i].condition()? else {
                continue;
            };
            let met = arguments
                .iter()
                .find(|a| a.name == other)
                .is_some_and(|a| a.value_str() == literal);
            arguments[i].required = met;
            gated[i] = !met;
        }

        let selected: Vec<&Argument> = arguments
            .iter()
            .zip(&gated)
            .filter(|(a, gated)| !**gated && (a.required || !a.is_empty()))
            .map(|(a, _)| a)
            .collect();

        for arg in &selected {
            arg.validate()?;
        }

        let mut out = String::new();
        for arg in selected {
            out.push(' ');
            if arg.is_empty() {
                // Flag-style: bare name, no prefix.
                out.push_str(&arg.name);
                continue;
            }
            out.push_str(&self.prefix);
            out.push_str(&arg.name);
            out.push_str(&self.delimiter);

            let mapped = arg.mapped_value();
            if arg.is_multi && mapped.contains(' ') {
                for token in mapped.split(' ').filter(|t| !t.is_empty()) {
                    out.push(' ');
                    out.push_str(&quote(token));
                }
            } else {
                out.push_str(&quote(mapped));
            }
        }

        Ok(out)
    }
}

/// Wrap a value in double quotes, escaping embedded quotes
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Split a composed argument string into argv tokens.
///
/// Inverse of the quoting used by [`Configuration::generate_argument_string`]:
/// whitespace separates tokens, double quotes group, `\"` inside quotes is a
/// literal quote.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: Vec<Argument>) -> Configuration {
        Configuration::new("--", "=", args).unwrap()
    }

    fn int_arg(name: &str, value: &str) -> Argument {
        Argument::new(name, "int").unwrap().with_value(value)
    }

    #[test]
    fn test_compose_prefixed_tokens() {
        let c = config(vec![
            int_arg("port", "8080"),
            Argument::new("host", "string").unwrap().with_value("local host"),
        ]);
        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, " --port=\"8080\" --host=\"local host\"");
    }

    #[test]
    fn test_compose_skips_optional_empty() {
        let c = config(vec![
            Argument::new("skip", "string").unwrap(),
            int_arg("n", "1"),
        ]);
        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, " --n=\"1\"");
    }

    #[test]
    fn test_compose_required_empty_allowed_is_flag() {
        let c = config(vec![Argument::new("verbose", "bool")
            .unwrap()
            .required()
            .empty_allowed()]);
        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, " verbose");
    }

    #[test]
    fn test_compose_multi_value() {
        let c = config(vec![Argument::new("files", "string")
            .unwrap()
            .multi()
            .with_value("a b")]);
        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, " --files= \"a\" \"b\"");
    }

    #[test]
    fn test_compose_uses_mapped_value() {
        let c = config(vec![Argument::new("mode", "selection[fast|slow]")
            .unwrap()
            .map_value("fast", "1")
            .with_value("fast")]);
        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, " --mode=\"1\"");
    }

    #[test]
    fn test_compose_is_idempotent() {
        let c = config(vec![int_arg("a", "1"), int_arg("b", "2")]);
        let first = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        let second = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_runtime_override_applied_before_validation() {
        let c = config(vec![Argument::new("n", "int[0..10]")
            .unwrap()
            .with_value("5")]);

        let rt = RuntimeArguments::new().with("n", "7");
        assert_eq!(c.generate_argument_string(&rt).unwrap(), " --n=\"7\"");

        let rt = RuntimeArguments::new().with("n", "70");
        let err = c.generate_argument_string(&rt).unwrap_err();
        assert!(err.argument_error().is_some());

        // Stored value untouched
        assert_eq!(c.argument("n").unwrap().value_str(), "5");
    }

    #[test]
    fn test_validation_failure_aborts_with_argument() {
        let c = config(vec![
            int_arg("ok", "1"),
            Argument::new("T", "int[0..10]").unwrap().required().with_value("15"),
        ]);
        let err = c.generate_argument_string(&RuntimeArguments::new()).unwrap_err();
        assert_eq!(err.argument_error().unwrap().argument.name, "T");
    }

    #[test]
    fn test_conditional_requirement_follows_other_value() {
        let mut c = config(vec![
            Argument::new("mode", "selection[debug|release]")
                .unwrap()
                .with_value("debug"),
            Argument::new("trace", "bool")
                .unwrap()
                .empty_allowed()
                .required_on("mode=debug"),
        ]);

        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, " --mode=\"debug\" trace");

        c.set_value("mode", Some("release".into())).unwrap();
        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, " --mode=\"release\"");
    }

    #[test]
    fn test_conditional_requirement_ignores_stored_flag() {
        let c = config(vec![
            Argument::new("mode", "string").unwrap().with_value("a"),
            Argument::new("extra", "string")
                .unwrap()
                .required()
                .with_value("x")
                .required_on("mode=b"),
        ]);
        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, " --mode=\"a\"");
    }

    #[test]
    fn test_conditional_required_empty_fails() {
        let c = config(vec![
            Argument::new("mode", "string").unwrap().with_value("b"),
            Argument::new("extra", "string").unwrap().required_on("mode=b"),
        ]);
        let err = c.generate_argument_string(&RuntimeArguments::new()).unwrap_err();
        assert_eq!(err.argument_error().unwrap().argument.name, "extra");
    }

    #[test]
    fn test_new_rejects_malformed_condition() {
        let result = Configuration::new(
            "--",
            "=",
            vec![Argument::new("a", "string").unwrap().required_on("oops")],
        );
        assert!(matches!(result, Err(Error::InvalidCondition { .. })));
    }

    #[test]
    fn test_raw_mode_two_arguments() {
        let c = Configuration::raw(vec![
            Argument::new("exe", "file").unwrap().with_value("/bin/tool"),
            Argument::new("tail", "string")
                .unwrap()
                .with_value("-x \"quoted\" --y"),
        ]);
        let out = c.generate_argument_string(&RuntimeArguments::new()).unwrap();
        assert_eq!(out, "-x \"quoted\" --y");
    }

    #[test]
    fn test_raw_mode_wrong_count_is_empty() {
        let one = Configuration::raw(vec![Argument::new("exe", "file")
            .unwrap()
            .with_value("/bin/tool")]);
        assert_eq!(
            one.generate_argument_string(&RuntimeArguments::new()).unwrap(),
            ""
        );

        let three = Configuration::raw(vec![
            Argument::new("a", "string").unwrap().with_value("1"),
            Argument::new("b", "string").unwrap().with_value("2"),
            Argument::new("c", "string").unwrap().with_value("3"),
        ]);
        assert_eq!(
            three.generate_argument_string(&RuntimeArguments::new()).unwrap(),
            ""
        );
    }

    #[test]
    fn test_raw_mode_skips_validation() {
        let c = Configuration::raw(vec![
            Argument::new("exe", "file").unwrap(),
            Argument::new("tail", "int[0..1]").unwrap().with_value("not a number"),
        ]);
        assert_eq!(
            c.generate_argument_string(&RuntimeArguments::new()).unwrap(),
            "not a number"
        );
    }

    #[test]
    fn test_persistable_excludes_runtime_arguments() {
        let c = config(vec![
            int_arg("a", "1"),
            Argument::new("session", "string").unwrap().runtime(),
        ]);
        let names: Vec<_> = c.persistable_arguments().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
        assert!(c.is_configurable());

        let only_runtime = config(vec![Argument::new("s", "string").unwrap().runtime()]);
        assert!(!only_runtime.is_configurable());
    }

    #[test]
    fn test_changed_arguments_after_mark_saved() {
        let mut c = config(vec![int_arg("a", "1"), int_arg("b", "2")]);
        c.mark_saved();
        assert_eq!(c.changed_arguments().count(), 0);

        c.set_value("b", Some("3".into())).unwrap();
        let changed: Vec<_> = c.changed_arguments().map(|a| a.name.as_str()).collect();
        assert_eq!(changed, vec!["b"]);
    }

    #[test]
    fn test_set_value_unknown_argument() {
        let mut c = config(vec![]);
        assert!(matches!(
            c.set_value("nope", None),
            Err(Error::UnknownArgument { .. })
        ));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            RuntimeArguments::parse_pair("port=80").unwrap(),
            ("port".to_string(), "80".to_string())
        );
        assert_eq!(
            RuntimeArguments::parse_pair("expr=a=b").unwrap(),
            ("expr".to_string(), "a=b".to_string())
        );
        assert!(RuntimeArguments::parse_pair("novalue").is_err());
        assert!(RuntimeArguments::parse_pair("=x").is_err());
    }

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line(" --port=\"8080\" --host=\"local host\" --verbose"),
            vec!["--port=8080", "--host=local host", "--verbose"]
        );
        assert_eq!(
            split_command_line(" --files= \"a\" \"b\""),
            vec!["--files=", "a", "b"]
        );
        assert_eq!(split_command_line("\"\""), vec![""]);
        assert_eq!(
            split_command_line(&format!("--q={}", quote("say \"hi\""))),
            vec!["--q=say \"hi\""]
        );
        assert!(split_command_line("   ").is_empty());
    }
}
