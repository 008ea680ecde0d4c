//! Parameter inspection: argument printing and exclusivity rules
//!
//! Rust functions carry no runtime signature, so callers describe the
//! operation with a [`Signature`] and the call with [`CallArgs`].

use std::collections::BTreeSet;
use std::fmt::Debug;

use crate::error::ArgumentError;
use crate::report::{default_reporter, Event, Phase, SharedReporter};

/// Strip module paths from a `std::any::type_name` rendering.
///
/// `alloc::vec::Vec<alloc::string::String>` becomes `Vec<String>`.
pub fn short_type_name(full: &str) -> String {
    fn last_segment(path: &str) -> &str {
        path.rsplit("::").next().unwrap_or(path)
    }

    let mut out = String::with_capacity(full.len());
    let mut path = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            path.push(c);
        } else {
            out.push_str(last_segment(&path));
            path.clear();
            out.push(c);
        }
    }
    out.push_str(last_segment(&path));
    out
}

/// A declared parameter of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
}

/// Declared shape of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    name: String,
    params: Vec<Param>,
    returns: Option<String>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }

    /// Declare a parameter whose type name is taken from `T`.
    pub fn typed_param<T: ?Sized>(self, name: impl Into<String>) -> Self {
        self.param(name, short_type_name(std::any::type_name::<T>()))
    }

    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.returns = Some(type_name.into());
        self
    }

    pub fn returns_type<T: ?Sized>(self) -> Self {
        self.returns(short_type_name(std::any::type_name::<T>()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    pub fn param_type(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.type_name.as_str())
    }

    pub fn return_type(&self) -> Option<&str> {
        self.returns.as_deref()
    }
}

/// A captured argument or return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedValue {
    pub rendered: String,
    pub type_name: String,
}

impl CapturedValue {
    pub fn of<V: Debug + ?Sized>(value: &V) -> Self {
        Self {
            rendered: format!("{value:?}"),
            type_name: short_type_name(std::any::type_name::<V>()),
        }
    }
}

/// The arguments of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<CapturedValue>,
    keyword: Vec<(String, CapturedValue)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg<V: Debug + ?Sized>(mut self, value: &V) -> Self {
        self.positional.push(CapturedValue::of(value));
        self
    }

    pub fn kwarg<V: Debug + ?Sized>(mut self, name: impl Into<String>, value: &V) -> Self {
        self.keyword.push((name.into(), CapturedValue::of(value)));
        self
    }

    pub fn positional(&self) -> &[CapturedValue] {
        &self.positional
    }

    pub fn keyword(&self) -> &[(String, CapturedValue)] {
        &self.keyword
    }

    pub fn keyword_names(&self) -> impl Iterator<Item = &str> {
        self.keyword.iter().map(|(name, _)| name.as_str())
    }
}

/// Reports the arguments and return value of calls.
#[derive(Clone)]
pub struct ParameterPrinter {
    show_types: bool,
    include_return: bool,
    reporter: SharedReporter,
}

impl ParameterPrinter {
    pub fn new(show_types: bool, include_return: bool) -> Self {
        Self {
            show_types,
            include_return,
            reporter: default_reporter(),
        }
    }

    pub fn reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    fn argument_lines(&self, signature: &Signature, args: &CallArgs) -> Vec<String> {
        let mut lines = vec!["Positional arguments:".to_string()];
        for (i, value) in args.positional().iter().enumerate() {
            let index = i + 1;
            if self.show_types {
                lines.push(format!(
                    "\tArgument {index}: value \"{}\", type {}",
                    value.rendered, value.type_name
                ));
            } else {
                lines.push(format!("\tArgument {index}: value \"{}\"", value.rendered));
            }
        }

        lines.push(String::new());
        lines.push("Keyword arguments:".to_string());
        for (key, value) in args.keyword() {
            if self.show_types {
                let supposed = signature.param_type(key).unwrap_or("Any");
                lines.push(format!(
                    "\tArgument {key}: value \"{}\", supposed type {supposed}, real type {}",
                    value.rendered, value.type_name
                ));
            } else {
                lines.push(format!("\tArgument {key}: value \"{}\"", value.rendered));
            }
        }
        lines
    }

    fn return_lines(&self, signature: &Signature, output: &CapturedValue) -> Vec<String> {
        let value = if self.show_types {
            let supposed = signature.return_type().unwrap_or("Any");
            format!(
                "\t\"{}\", supposed type {supposed}, real type {}",
                output.rendered, output.type_name
            )
        } else {
            format!("\t\"{}\"", output.rendered)
        };
        vec!["Return value:".to_string(), value]
    }

    /// Report `args`, run `f`, then report its return value.
    pub fn call<T: Debug>(&self, signature: &Signature, args: &CallArgs, f: impl FnOnce() -> T) -> T {
        self.reporter.report(
            &Event::new(Phase::Parameters, signature.name())
                .with_lines(self.argument_lines(signature, args)),
        );

        let output = f();
        if self.include_return {
            let captured = CapturedValue::of(&output);
            self.reporter.report(
                &Event::new(Phase::Return, signature.name())
                    .with_lines(self.return_lines(signature, &captured)),
            );
        }
        output
    }
}

/// A compatibility rule between keyword arguments.
///
/// When every `compatible` argument is supplied, none of the `incompatible`
/// ones may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    compatible: Vec<String>,
    incompatible: Vec<String>,
}

impl Argument {
    pub fn new<I, J, S, T>(compatible: I, incompatible: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            compatible: compatible.into_iter().map(Into::into).collect(),
            incompatible: incompatible.into_iter().map(Into::into).collect(),
        }
    }

    pub fn compatible(&self) -> &[String] {
        &self.compatible
    }

    pub fn incompatible(&self) -> &[String] {
        &self.incompatible
    }

    /// Every argument named by the rule, without duplicates.
    pub fn arguments(&self) -> BTreeSet<&str> {
        self.compatible
            .iter()
            .chain(&self.incompatible)
            .map(String::as_str)
            .collect()
    }

    fn is_violated_by(&self, provided: &BTreeSet<&str>) -> bool {
        let group_present = self
            .compatible
            .iter()
            .all(|name| provided.contains(name.as_str()));
        let conflict = self
            .incompatible
            .iter()
            .any(|name| provided.contains(name.as_str()));
        group_present && conflict
    }
}

/// Rejects calls whose keyword arguments break a set of [`Argument`] rules.
#[derive(Debug, Clone)]
pub struct ExclusiveParameters {
    signature: Signature,
    rules: Vec<Argument>,
}

impl ExclusiveParameters {
    pub fn new(signature: Signature, rules: impl IntoIterator<Item = Argument>) -> Self {
        Self {
            signature,
            rules: rules.into_iter().collect(),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Check the keyword argument names supplied to one call.
    pub fn validate_names<'a, I>(&self, provided: I) -> Result<(), ArgumentError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unknown: BTreeSet<&str> = self
            .rules
            .iter()
            .flat_map(Argument::arguments)
            .filter(|name| !self.signature.has_param(name))
            .collect();
        if !unknown.is_empty() {
            return Err(ArgumentError::InvalidArguments(format!(
                "Parameters not accepted by function {}: {:?}",
                self.signature.name(),
                unknown
            )));
        }

        let provided: BTreeSet<&str> = provided.into_iter().collect();
        if let Some(rule) = self.rules.iter().find(|rule| rule.is_violated_by(&provided)) {
            return Err(ArgumentError::InvalidArguments(format!(
                "Incompatible arguments used together: {:?} and {:?}",
                rule.compatible, rule.incompatible
            )));
        }
        Ok(())
    }

    pub fn validate(&self, args: &CallArgs) -> Result<(), ArgumentError> {
        self.validate_names(args.keyword_names())
    }

    /// Validate `args`, then run `f`.
    pub fn call<T>(&self, args: &CallArgs, f: impl FnOnce() -> T) -> Result<T, ArgumentError> {
        self.validate(args)?;
        Ok(f())
    }
}
