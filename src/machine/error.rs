use std::fmt;

use crate::EntityId;

pub type Result<T> = std::result::Result<T, Error>;

/// Identifies where a runtime error surfaced: the rule being fired and
/// the event that triggered it. Filled in at the dispatch boundary.
#[derive(Debug, Default, Clone)]
pub struct RuleContext {
    pub rule: Option<String>,
    pub event: Option<String>,
}

impl RuleContext {
    pub fn empty() -> RuleContext {
        RuleContext::default()
    }
}

/// Runtime machine error.
#[derive(Debug, Clone)]
pub struct Error {
    pub context: RuleContext,
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            context: RuleContext::empty(),
            kind,
        }
    }

    /// Attaches rule and event context if none is present yet, so the
    /// innermost frame wins.
    pub fn with_context(mut self, rule: &str, event: &str) -> Self {
        if self.context.rule.is_none() {
            self.context.rule = Some(rule.to_string());
        }
        if self.context.event.is_none() {
            self.context.event = Some(event.to_string());
        }
        self
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// `call` named a function that is neither a built-in, a
    /// module-level function, nor bound to an entity argument.
    UnknownFunction(String),
    /// A bound-function lookup failed on the given entity.
    UnknownBoundFunction(EntityId, String),
    NoSuchEntity(EntityId),
    BadArity {
        function: String,
        expected: usize,
        got: usize,
    },
    /// A recurring schedule was requested without a positive interval.
    RecurringWithoutInterval(String),
    CoreError(String),
    Other(String),
}

impl From<crate::error::Error> for Error {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::NoSuchEntity(id) => Error::new(ErrorKind::NoSuchEntity(id)),
            other => Error::new(ErrorKind::CoreError(other.to_string())),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        match &self.kind {
            ErrorKind::UnknownFunction(name) => {
                fmt_err_msg(formatter, &self.context, &format!("unknown function: {}", name))
            }
            ErrorKind::UnknownBoundFunction(entity, name) => fmt_err_msg(
                formatter,
                &self.context,
                &format!("no function \"{}\" bound to entity {}", name, entity),
            ),
            ErrorKind::NoSuchEntity(id) => {
                fmt_err_msg(formatter, &self.context, &format!("no such entity: {}", id))
            }
            ErrorKind::BadArity {
                function,
                expected,
                got,
            } => fmt_err_msg(
                formatter,
                &self.context,
                &format!(
                    "function {} takes {} arguments, got {}",
                    function, expected, got
                ),
            ),
            ErrorKind::RecurringWithoutInterval(event) => fmt_err_msg(
                formatter,
                &self.context,
                &format!(
                    "recurring schedule of \"{}\" requires a positive interval",
                    event
                ),
            ),
            ErrorKind::CoreError(msg) => {
                fmt_err_msg(formatter, &self.context, &format!("core error: {}", msg))
            }
            ErrorKind::Other(msg) => fmt_err_msg(formatter, &self.context, msg),
        }
    }
}

fn fmt_err_msg(
    formatter: &mut fmt::Formatter,
    context: &RuleContext,
    message: &str,
) -> std::result::Result<(), fmt::Error> {
    let rule = match &context.rule {
        Some(value) => value.as_str(),
        None => "unknown",
    };
    let event = match &context.event {
        Some(value) => value.as_str(),
        None => "unknown",
    };
    write!(
        formatter,
        "rule: {}, event: {} - {}",
        rule, event, message
    )
}
