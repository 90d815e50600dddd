//! Command definitions.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::complete::Completer;
use crate::parser::Parser;
use crate::{ArgvError, Result};

/// Value validator for options and parameters.
///
/// Returns a short error description ("invalid int32 value") on
/// rejection; the parser wraps it with the option or parameter name and
/// the offending value.
pub type Validator = fn(&str) -> std::result::Result<(), String>;

/// Command handler, invoked by [`Command::run`] after a successful
/// parse.
pub type Handler = Arc<dyn Fn(&Invocation) -> anyhow::Result<()> + Send + Sync>;

/// A named option (`-c`, `--long`, `--long=value`).
#[derive(Clone, Default)]
pub struct Opt {
    /// Option name, including the leading dash(es).
    pub name: String,

    /// Alternative names for the same option.
    pub aliases: Vec<String>,

    /// Single-line description.
    pub help: String,

    /// Names of options this option conflicts with.
    pub conflicts: Vec<String>,

    /// Names of options this option requires.
    pub requires: Vec<String>,

    /// Value validator. An option without a validator takes no value.
    pub validate: Option<Validator>,

    /// Value completer.
    pub complete: Option<Completer>,
}

impl Opt {
    /// Returns true if the option takes a value.
    pub(crate) fn with_value(&self) -> bool {
        self.validate.is_some()
    }

    pub(crate) fn verify(&self) -> Result<()> {
        let valid_short = self.name.len() == 2
            && self.name.starts_with('-')
            && self.name[1..].chars().all(|c| c.is_ascii_alphanumeric());
        let valid_long = self.name.len() >= 3 && self.name.starts_with("--");

        if valid_short || valid_long {
            Ok(())
        } else {
            Err(ArgvError::InvalidOptionName(self.name.clone()))
        }
    }
}

impl fmt::Debug for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opt")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish()
    }
}

/// A positional parameter.
///
/// The parameter name encodes its disposition: `[name]` is optional,
/// `name...` (or `[name...]`) is repeated.
#[derive(Clone, Default)]
pub struct Parameter {
    /// Parameter name, with the `[...]` / `...` decorations.
    pub name: String,

    /// Single-line description.
    pub help: String,

    /// Value validator.
    pub validate: Option<Validator>,

    /// Value completer.
    pub complete: Option<Completer>,
}

impl Parameter {
    /// Returns true if the parameter is optional (`[name]`).
    pub(crate) fn optional(&self) -> bool {
        self.name.starts_with('[') && self.name.ends_with(']')
    }

    /// Returns true if the parameter is required.
    pub(crate) fn required(&self) -> bool {
        !self.optional()
    }

    /// Returns true if the parameter may repeat (`name...`).
    pub(crate) fn repeated(&self) -> bool {
        let inner = self
            .name
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(&self.name);
        inner.ends_with("...")
    }

    pub(crate) fn verify(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ArgvError::InvalidParameterName(String::new()));
        }
        Ok(())
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter").field("name", &self.name).finish()
    }
}

/// A command definition.
///
/// Every command must have a name and may have options and either
/// positional parameters or sub-commands (the two are mutually
/// exclusive):
///
/// ```text
/// command [options] [params]
/// command [options] sub-command ...
/// ```
#[derive(Clone, Default)]
pub struct Command {
    /// Command name.
    pub name: String,

    /// Single-line description.
    pub help: String,

    /// Long description.
    pub description: String,

    /// Options, if any.
    pub options: Vec<Opt>,

    /// Positional parameters, if any.
    pub parameters: Vec<Parameter>,

    /// Sub-commands, if any.
    pub sub_commands: Vec<Command>,

    /// Handler, called by [`Command::run`]. A command without a
    /// handler dispatches to its selected sub-command.
    pub handler: Option<Handler>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("parameters", &self.parameters)
            .field("sub_commands", &self.sub_commands)
            .finish()
    }
}

impl Command {
    /// Checks correctness of the command definition and returns the
    /// first error found.
    pub fn verify(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ArgvError::MissedCommandName);
        }

        if !self.parameters.is_empty() && !self.sub_commands.is_empty() {
            return Err(ArgvError::ParametersAndSubCommands(self.name.clone()));
        }

        self.verify_options()?;
        self.verify_parameters()?;
        self.verify_sub_commands()
    }

    fn verify_options(&self) -> Result<()> {
        let mut names = HashSet::new();
        for opt in &self.options {
            opt.verify()?;
            for name in std::iter::once(&opt.name).chain(opt.aliases.iter()) {
                if !names.insert(name.clone()) {
                    return Err(ArgvError::DuplicatedOption(name.clone()));
                }
            }
        }
        Ok(())
    }

    fn verify_parameters(&self) -> Result<()> {
        let mut names = HashSet::new();
        for param in &self.parameters {
            param.verify()?;
            if !names.insert(param.name.clone()) {
                return Err(ArgvError::DuplicatedParameter(param.name.clone()));
            }
        }

        // Disposition: no optional after repeated, no required after
        // optional, at most one repeated.
        let mut repeated: Option<&Parameter> = None;
        let mut optional: Option<&Parameter> = None;

        for param in &self.parameters {
            if param.optional() {
                if let Some(rept) = repeated {
                    return Err(ArgvError::OptionalAfterRepeated {
                        optional: param.name.clone(),
                        repeated: rept.name.clone(),
                    });
                }
                optional = Some(param);
            } else if let Some(opt) = optional {
                return Err(ArgvError::RequiredAfterOptional {
                    required: param.name.clone(),
                    optional: opt.name.clone(),
                });
            }

            if param.repeated() {
                if let Some(rept) = repeated {
                    return Err(ArgvError::RepeatedTwice {
                        first: rept.name.clone(),
                        second: param.name.clone(),
                    });
                }
                repeated = Some(param);
            }
        }

        Ok(())
    }

    fn verify_sub_commands(&self) -> Result<()> {
        let mut names = HashSet::new();
        for sub in &self.sub_commands {
            if !names.insert(sub.name.clone()) {
                return Err(ArgvError::DuplicatedSubCommand(sub.name.clone()));
            }
            sub.verify()?;
        }
        Ok(())
    }

    /// Parses the argv against this command and returns the
    /// [`Invocation`], or the first error encountered.
    pub fn parse(&self, argv: &[String]) -> Result<Invocation> {
        self.verify()?;
        Parser::new(self, argv).parse()
    }

    /// Parses the argv, then invokes the handler.
    ///
    /// A command without a handler dispatches to the selected
    /// sub-command; a leaf without a handler is an "unhandled command"
    /// error.
    pub fn run(&self, argv: &[String]) -> anyhow::Result<()> {
        let inv = self.parse(argv)?;

        if let Some(handler) = &self.handler {
            return handler(&inv);
        }

        if let Some(idx) = inv.sub_index {
            return self.sub_commands[idx].run(&inv.sub_argv);
        }

        let mut line = vec![self.name.clone()];
        line.extend_from_slice(argv);
        Err(ArgvError::UnhandledCommand(line.join(" ")).into())
    }

    /// Finds a sub-command by (possibly abbreviated) name.
    ///
    /// An exact match wins even when longer sub-command names share the
    /// prefix; otherwise all prefix matches are returned and ambiguity
    /// resolution is up to the caller.
    pub fn find_sub_command_candidates(&self, name: &str) -> Vec<usize> {
        let mut inexact = Vec::new();
        for (i, sub) in self.sub_commands.iter().enumerate() {
            if sub.name == name {
                return vec![i];
            }
            if sub.name.starts_with(name) {
                inexact.push(i);
            }
        }
        inexact
    }

    /// Finds a sub-command by name, resolving unambiguous
    /// abbreviations.
    pub fn find_sub_command(&self, name: &str) -> Result<&Command> {
        let candidates = self.find_sub_command_candidates(name);
        match candidates.len() {
            0 => Err(ArgvError::UnknownSubCommand(name.to_string())),
            1 => Ok(&self.sub_commands[candidates[0]]),
            _ => Err(ArgvError::AmbiguousSubCommand(name.to_string())),
        }
    }

    pub(crate) fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub(crate) fn has_sub_commands(&self) -> bool {
        !self.sub_commands.is_empty()
    }

    pub(crate) fn find_option(&self, name: &str) -> Option<(usize, &Opt)> {
        self.options.iter().enumerate().find(|(_, opt)| {
            opt.name == name || opt.aliases.iter().any(|a| a == name)
        })
    }
}

/// The result of a successful parse: option and parameter values by
/// name, plus the selected sub-command, if any.
///
/// An option's values are reachable under its primary name and all of
/// its aliases. A repeated parameter holds one value per occurrence.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub(crate) cmd_name: String,
    pub(crate) by_name: HashMap<String, Vec<String>>,
    pub(crate) sub_index: Option<usize>,
    pub(crate) sub_name: Option<String>,
    pub(crate) sub_argv: Vec<String>,
}

impl Invocation {
    /// Returns the name of the parsed command.
    pub fn command(&self) -> &str {
        &self.cmd_name
    }

    /// Returns true if the option or parameter was present.
    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the first value of the option or parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Returns all values of the option or parameter.
    pub fn values(&self, name: &str) -> &[String] {
        self.by_name.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Returns the selected sub-command name and its argv.
    pub fn sub_command(&self) -> Option<(&str, &[String])> {
        self.sub_name
            .as_deref()
            .map(|name| (name, self.sub_argv.as_slice()))
    }
}
