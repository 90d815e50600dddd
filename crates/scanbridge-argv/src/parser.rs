//! The argv parser.

use std::collections::{BTreeMap, HashMap};

use crate::command::{Command, Invocation};
use crate::complete::CompleterFlags;
use crate::{ArgvError, Result};

// Bookkeeping notes.
//
// opt_conflicts["-opt1"] -> "-opt2" means that the previously processed
// option "-opt2" has declared "-opt1" as conflicting.
//
// opt_required["-opt1"] -> "-opt2" means that the previously processed
// option "-opt2" has declared "-opt1" as required.
//
// Both maps are ordered so that the first reported error does not
// depend on hash order: with a fixed command and argv the parser is a
// pure function.
pub(crate) struct Parser<'a> {
    cmd: &'a Command,
    argv: &'a [String],
    next: usize,
    opt_conflicts: BTreeMap<String, String>,
    opt_required: BTreeMap<String, String>,
    options: Vec<OptVal>,
    parameters: Vec<(usize, String)>,
    sub_index: Option<usize>,
    sub_argv: Vec<String>,
}

struct OptVal {
    opt_index: usize,
    values: Vec<String>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(cmd: &'a Command, argv: &'a [String]) -> Self {
        Self {
            cmd,
            argv,
            next: 0,
            opt_conflicts: BTreeMap::new(),
            opt_required: BTreeMap::new(),
            options: Vec::new(),
            parameters: Vec::new(),
            sub_index: None,
            sub_argv: Vec::new(),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Invocation> {
        let (params_min, params_max) = self.params_info();

        let mut done_options = false;
        let mut param_values: Vec<String> = Vec::new();

        while !self.done() {
            let arg = self.next_arg();

            if !done_options && arg == "--" {
                done_options = true;
            } else if !done_options && is_short_option(&arg) {
                self.handle_short_option(&arg)?;
            } else if !done_options && is_long_option(&arg) {
                self.handle_long_option(&arg)?;
            } else if self.cmd.has_sub_commands() {
                self.handle_sub_command(&arg)?;
            } else if param_values.len() < params_max {
                param_values.push(arg);
            } else {
                return Err(ArgvError::UnexpectedParameter(arg));
            }
        }

        if param_values.len() < params_min {
            let missed = &self.cmd.parameters[param_values.len()];
            return Err(ArgvError::MissedParameter(missed.name.clone()));
        }

        if self.cmd.has_sub_commands() && self.sub_index.is_none() {
            return Err(ArgvError::MissedSubCommandName);
        }

        if self.cmd.has_parameters() {
            self.handle_parameters(&param_values)?;
        }

        let by_name = self.build_by_name();

        // Requirements can only be checked when parsing is done.
        for (required, by_whom) in &self.opt_required {
            if !by_name.contains_key(required) {
                return Err(ArgvError::MissedRequiredOption(
                    required.clone(),
                    by_whom.clone(),
                ));
            }
        }

        Ok(Invocation {
            cmd_name: self.cmd.name.clone(),
            by_name,
            sub_index: self.sub_index,
            sub_name: self
                .sub_index
                .map(|i| self.cmd.sub_commands[i].name.clone()),
            sub_argv: self.sub_argv,
        })
    }

    /// Auto-completion for the in-progress last argument.
    ///
    /// Returns candidate suffixes to append to the last argument, plus
    /// hint flags from the completer that produced them.
    pub(crate) fn complete(mut self) -> (Vec<String>, CompleterFlags) {
        let mut done_options = false;
        let mut param_count = 0usize;
        let mut param_last = String::new();
        let mut compl: Option<(Vec<String>, CompleterFlags)> = None;

        while !self.done() {
            let arg = self.next_arg();

            let done = if !done_options && arg == "--" {
                done_options = true;
                false
            } else if !done_options && (is_short_option(&arg) || is_long_option(&arg)) {
                let (done, c) = self.complete_option(&arg);
                if c.is_some() {
                    compl = c;
                }
                done
            } else {
                param_last = arg;
                if !self.done() {
                    param_count += 1;
                }
                false
            };

            if done {
                return compl.unwrap_or_default();
            }
        }

        if compl.is_none() {
            if self.cmd.has_parameters() {
                compl = self.complete_parameter(&param_last, param_count);
            } else if self.cmd.has_sub_commands() && param_count == 0 {
                compl = Some(complete_sub_command(self.cmd, &param_last));
            }
        }

        compl.unwrap_or_default()
    }

    fn handle_short_option(&mut self, arg: &str) -> Result<()> {
        let (name, val, novalue) = split_opt_val(arg);

        let Some((idx, opt)) = self.cmd.find_option(&name) else {
            return Err(ArgvError::UnknownOption(name));
        };

        // Two simple cases: the argument carries no inline value, or
        // the option takes a value (so the argument cannot be a
        // combined multi-option one). Both are handled by fetching the
        // next argument as the value when one is required.
        if novalue || opt.with_value() {
            let (val, novalue) = if novalue && opt.with_value() {
                self.next_value()
            } else {
                (val, novalue)
            };
            return self.append_opt_val(idx, &name, &val, novalue);
        }

        // Short options without values can be combined: -cru is
        // equivalent to -c -r -u.
        for c in name[1..].chars().chain(val.chars()) {
            let name2 = format!("-{}", c);
            let Some((idx2, _)) = self.cmd.find_option(&name2) else {
                return Err(ArgvError::UnknownOption(name2));
            };
            self.append_opt_val(idx2, &name2, "", true)?;
        }

        Ok(())
    }

    fn handle_long_option(&mut self, arg: &str) -> Result<()> {
        let (name, val, novalue) = split_opt_val(arg);

        let Some((idx, opt)) = self.cmd.find_option(&name) else {
            return Err(ArgvError::UnknownOption(name));
        };

        let (val, novalue) = if novalue && opt.with_value() {
            self.next_value()
        } else {
            (val, novalue)
        };

        self.append_opt_val(idx, &name, &val, novalue)
    }

    fn handle_sub_command(&mut self, arg: &str) -> Result<()> {
        let candidates = self.cmd.find_sub_command_candidates(arg);

        match candidates.len() {
            0 => return Err(ArgvError::UnknownSubCommand(arg.to_string())),
            1 => {}
            _ => return Err(ArgvError::AmbiguousSubCommand(arg.to_string())),
        }

        self.sub_index = Some(candidates[0]);
        self.sub_argv = self.argv[self.next..].to_vec();
        Ok(())
    }

    fn handle_parameters(&mut self, param_values: &[String]) -> Result<()> {
        let params = &self.cmd.parameters;
        let n = param_values.len();

        // Assign a descriptor to every value: descriptors before the
        // repeated one bind left to right, descriptors after it bind
        // right to left, the repeated one soaks up the middle.
        let mut descs: Vec<Option<usize>> = vec![None; n];
        let mut rept: Option<usize> = None;

        for i in 0..n {
            descs[i] = Some(i);
            if params[i].repeated() {
                rept = Some(i);
                break;
            }
        }

        if let Some(rept) = rept {
            let mut i = n;
            let mut j = params.len();
            while j > 0 && !params[j - 1].repeated() {
                i -= 1;
                j -= 1;
                descs[i] = Some(j);
            }

            for slot in descs.iter_mut().skip(rept + 1) {
                if slot.is_none() {
                    *slot = Some(rept);
                }
            }
        }

        // Validate and save, one by one.
        for (value, desc) in param_values.iter().zip(descs.iter()) {
            let desc = desc.expect("every parameter value has a descriptor");
            let param = &params[desc];

            if let Some(validate) = param.validate {
                validate(value).map_err(|err| ArgvError::ParameterValue {
                    name: param.name.clone(),
                    err,
                    value: value.clone(),
                })?;
            }

            self.parameters.push((desc, value.clone()));
        }

        Ok(())
    }

    fn append_opt_val(&mut self, opt_index: usize, name: &str, value: &str, novalue: bool) -> Result<()> {
        let opt = &self.cmd.options[opt_index];

        if novalue && opt.with_value() {
            return Err(ArgvError::OptionRequiresOperand(name.to_string()));
        }

        if !novalue {
            if let Some(validate) = opt.validate {
                validate(value).map_err(|err| ArgvError::OptionValue {
                    err,
                    name: name.to_string(),
                    value: value.to_string(),
                })?;
            }
        }

        if let Some(conflict) = self.opt_conflicts.get(name) {
            return Err(ArgvError::OptionConflict(name.to_string(), conflict.clone()));
        }

        match self.options.iter_mut().find(|v| v.opt_index == opt_index) {
            Some(optval) => optval.values.push(value.to_string()),
            None => self.options.push(OptVal {
                opt_index,
                values: vec![value.to_string()],
            }),
        }

        for conflict in &opt.conflicts {
            self.opt_conflicts
                .entry(conflict.clone())
                .or_insert_with(|| name.to_string());
        }
        for required in &opt.requires {
            self.opt_required
                .entry(required.clone())
                .or_insert_with(|| name.to_string());
        }

        Ok(())
    }

    fn build_by_name(&self) -> HashMap<String, Vec<String>> {
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();

        for optval in &self.options {
            let opt = &self.cmd.options[optval.opt_index];
            by_name.insert(opt.name.clone(), optval.values.clone());
            for alias in &opt.aliases {
                by_name.insert(alias.clone(), optval.values.clone());
            }
        }

        // Repeated parameters may contribute multiple values under the
        // same name.
        for (desc, value) in &self.parameters {
            let name = self.cmd.parameters[*desc].name.clone();
            by_name.entry(name).or_default().push(value.clone());
        }

        by_name
    }

    fn complete_option(&mut self, arg: &str) -> (bool, Option<(Vec<String>, CompleterFlags)>) {
        let (name, val, novalue) = split_opt_val(arg);

        let Some((_, opt)) = self.cmd.find_option(&name) else {
            // Unknown option. If this is the final argument, offer
            // option-name completion; otherwise synchronization is
            // lost and completion stops.
            if self.done() {
                return (false, Some((complete_option_name(self.cmd, arg), CompleterFlags::NONE)));
            }
            return (true, None);
        };

        if !opt.with_value() {
            return (false, None);
        }

        let val = if novalue { self.next_arg() } else { val };

        if self.done() {
            let compl = opt.complete.as_ref().map(|c| c(&val));
            return (true, compl);
        }

        (false, None)
    }

    fn complete_parameter(
        &self,
        arg: &str,
        n: usize,
    ) -> Option<(Vec<String>, CompleterFlags)> {
        let param = self
            .cmd
            .parameters
            .iter()
            .enumerate()
            .find(|(i, p)| *i == n || p.repeated())
            .map(|(_, p)| p)?;

        param.complete.as_ref().map(|c| c(arg))
    }

    fn params_info(&self) -> (usize, usize) {
        let mut params_min = 0;
        let mut unlimited = false;

        for param in &self.cmd.parameters {
            if param.required() {
                params_min += 1;
            }
            if param.repeated() {
                unlimited = true;
            }
        }

        let params_max = if unlimited {
            usize::MAX
        } else {
            self.cmd.parameters.len()
        };

        (params_min, params_max)
    }

    fn done(&self) -> bool {
        self.next == self.argv.len() || self.sub_index.is_some()
    }

    fn next_arg(&mut self) -> String {
        let arg = self.argv.get(self.next).cloned().unwrap_or_default();
        if self.next < self.argv.len() {
            self.next += 1;
        }
        arg
    }

    fn next_value(&mut self) -> (String, bool) {
        if !self.done() {
            (self.next_arg(), false)
        } else {
            (String::new(), true)
        }
    }
}

fn is_short_option(arg: &str) -> bool {
    let mut chars = arg.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('-'), Some(c)) if c != '-'
    )
}

fn is_long_option(arg: &str) -> bool {
    arg.len() >= 3 && arg.starts_with("--")
}

// Splits an option argument into name and value when they share the
// argument: -cVAL for short options, --long=val for long ones.
fn split_opt_val(arg: &str) -> (String, String, bool) {
    if is_short_option(arg) {
        // The name is the dash plus one (possibly multi-byte)
        // character; the rest of the argument is the inline value.
        let boundary = arg
            .char_indices()
            .nth(2)
            .map(|(i, _)| i)
            .unwrap_or(arg.len());
        let name = arg[..boundary].to_string();
        let val = arg[boundary..].to_string();
        let novalue = val.is_empty();
        (name, val, novalue)
    } else if is_long_option(arg) {
        match arg.split_once('=') {
            Some((name, val)) => (name.to_string(), val.to_string(), false),
            None => (arg.to_string(), String::new(), true),
        }
    } else {
        (arg.to_string(), String::new(), true)
    }
}

fn complete_option_name(cmd: &Command, arg: &str) -> Vec<String> {
    let mut compl = Vec::new();
    for opt in &cmd.options {
        for name in std::iter::once(&opt.name).chain(opt.aliases.iter()) {
            if name.len() > arg.len() && name.starts_with(arg) {
                compl.push(name[arg.len()..].to_string());
            }
        }
    }
    compl
}

fn complete_sub_command(cmd: &Command, arg: &str) -> (Vec<String>, CompleterFlags) {
    let compl = cmd
        .sub_commands
        .iter()
        .filter(|sub| sub.name.len() > arg.len() && sub.name.starts_with(arg))
        .map(|sub| sub.name[arg.len()..].to_string())
        .collect();
    (compl, CompleterFlags::NONE)
}

impl Command {
    /// Returns completion candidates for the final, possibly
    /// incomplete argument of the given argv.
    ///
    /// Candidates are suffixes to append to the final argument. The
    /// returned flags hint how the shell should insert them (for
    /// example, [`CompleterFlags::NO_SPACE`] suppresses the trailing
    /// space after a partial filesystem path).
    pub fn complete(&self, argv: &[String]) -> (Vec<String>, CompleterFlags) {
        Parser::new(self, argv).complete()
    }
}
