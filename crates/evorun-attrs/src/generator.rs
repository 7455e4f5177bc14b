//! The population command language.
//!
//! Two command forms synthesize a set of attribute records against a scope:
//!
//! * star form, `*N;func`: one function applied uniformly to every
//!   attribute, `func` one of `min`, `max` or `rand_<seed>`;
//! * hash form, `#N;attr1_func1;attr2_func2;...`: each attribute driven
//!   independently, per-attribute functions additionally allowing
//!   `value_<literal>`.
//!
//! A bare positive integer `N` is shorthand for `*N;min`, and a size-less
//! command (`*min`) is shorthand for size 1.

use std::sync::Arc;

use evorun_core::attributes::{Attributes, SetOfAttributes};
use evorun_core::errors::{ErrorInfo, EvoError};
use evorun_core::rng::Prg;
use evorun_core::value::Value;

use crate::range::{AttributeRange, AttrsScope};

/// Per-attribute generation rule.
#[derive(Debug, Clone, PartialEq)]
pub enum GenFunction {
    /// The range minimum.
    Min,
    /// The range maximum.
    Max,
    /// Independent uniform draws from a generator seeded with the payload.
    Rand(u64),
    /// A fixed literal, validated against the attribute's range.
    Value(Value),
}

impl GenFunction {
    fn command_token(&self) -> Result<String, EvoError> {
        match self {
            GenFunction::Min => Ok("min".to_string()),
            GenFunction::Max => Ok("max".to_string()),
            GenFunction::Rand(seed) => Ok(format!("rand_{seed}")),
            GenFunction::Value(value) => Ok(format!("value_{}", value.to_text()?)),
        }
    }

    /// One value source per rule; `Rand` owns its freshly seeded generator
    /// so that repeated `create` calls draw identical sequences.
    fn value_source(&self) -> Box<dyn FnMut(&AttributeRange) -> Value + '_> {
        match self {
            GenFunction::Min => Box::new(|range| range.min()),
            GenFunction::Max => Box::new(|range| range.max()),
            GenFunction::Value(value) => Box::new(move |_| value.clone()),
            GenFunction::Rand(seed) => {
                let mut prg = Prg::new(*seed);
                Box::new(move |range| range.rand(&mut prg))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct AttrCmd {
    position: usize,
    name: String,
    func: GenFunction,
}

#[derive(Debug, Clone)]
enum Mode {
    SameForAll(GenFunction),
    PerAttr(Vec<AttrCmd>),
}

/// A parsed population command bound to its attribute scope.
///
/// The command and scope are immutable after a successful parse, and
/// generation is stateless: every [`create`](AttrsGenerator::create) call
/// seeds fresh generators from the parsed seeds, so repeated calls yield
/// identical populations.
#[derive(Debug, Clone)]
pub struct AttrsGenerator {
    scope: AttrsScope,
    command: String,
    size: usize,
    mode: Mode,
}

impl AttrsGenerator {
    /// Parses a command string against the given scope.
    pub fn parse(scope: &AttrsScope, cmd: &str) -> Result<Self, EvoError> {
        if cmd.is_empty() {
            return Err(EvoError::Parse(cmd_info(cmd, "the command cannot be empty")));
        }

        // a bare positive integer is shorthand for "*N;min"
        if let Ok(size) = cmd.parse::<i64>() {
            let size = check_size(cmd, size)?;
            return Ok(Self {
                scope: scope.clone(),
                command: format!("*{size};min"),
                size,
                mode: Mode::SameForAll(GenFunction::Min),
            });
        }

        let marker = match cmd.chars().next() {
            Some(c @ ('*' | '#')) => c,
            _ => {
                return Err(EvoError::Parse(cmd_info(
                    cmd,
                    "the command must start with '*' or '#' or be a positive integer",
                )))
            }
        };

        let mut tokens: Vec<&str> = cmd.split(';').collect();
        let head = tokens[0].get(1..).unwrap_or("");
        let size = match head.parse::<i64>() {
            Ok(size) => {
                tokens.remove(0);
                check_size(cmd, size)?
            }
            Err(_) => {
                // size-less command, e.g. "*min": the head is the first rule
                tokens[0] = head;
                1
            }
        };

        match marker {
            '*' => Self::parse_star(scope, cmd, size, &tokens),
            _ => Self::parse_hash(scope, cmd, size, &tokens),
        }
    }

    fn parse_star(
        scope: &AttrsScope,
        cmd: &str,
        size: usize,
        tokens: &[&str],
    ) -> Result<Self, EvoError> {
        let [token] = tokens else {
            return Err(EvoError::Parse(cmd_info(
                cmd,
                "a star command takes exactly one function: '*N;[min|max|rand_seed]'",
            )));
        };
        let func = match *token {
            "min" => GenFunction::Min,
            "max" => GenFunction::Max,
            other => match other.strip_prefix("rand_") {
                Some(seed) => GenFunction::Rand(parse_seed(cmd, seed)?),
                None => {
                    return Err(EvoError::Parse(cmd_info(
                        cmd,
                        "unknown function; expected 'min', 'max' or 'rand_seed'",
                    )))
                }
            },
        };
        let command = format!("*{size};{}", func.command_token()?);
        Ok(Self {
            scope: scope.clone(),
            command,
            size,
            mode: Mode::SameForAll(func),
        })
    }

    fn parse_hash(
        scope: &AttrsScope,
        cmd: &str,
        size: usize,
        tokens: &[&str],
    ) -> Result<Self, EvoError> {
        if scope.is_empty() {
            return Err(EvoError::Parse(cmd_info(
                cmd,
                "a hash command needs a non-empty scope",
            )));
        }
        if tokens.len() != scope.len() {
            return Err(EvoError::Parse(
                cmd_info(
                    cmd,
                    "a hash command must drive every attribute of the scope exactly once",
                )
                .with_context("expected", scope.len().to_string()),
            ));
        }

        let mut cmds: Vec<AttrCmd> = Vec::with_capacity(tokens.len());
        for token in tokens {
            let Some((name, rule)) = token.split_once('_') else {
                return Err(EvoError::Parse(cmd_info(
                    cmd,
                    "each rule should look like 'attrName_[min|max|rand_seed|value_value]'",
                )));
            };
            let Some((position, _, range)) = scope.get_full(name) else {
                return Err(EvoError::Parse(
                    cmd_info(cmd, "the attribute does not belong to the scope")
                        .with_context("attribute", name),
                ));
            };
            if cmds.iter().any(|c| c.name == name) {
                return Err(EvoError::Parse(
                    cmd_info(cmd, "duplicate attribute in command")
                        .with_context("attribute", name),
                ));
            }
            let func = match rule {
                "min" => GenFunction::Min,
                "max" => GenFunction::Max,
                other => {
                    if let Some(seed) = other.strip_prefix("rand_") {
                        GenFunction::Rand(parse_seed(cmd, seed)?)
                    } else if let Some(literal) = other.strip_prefix("value_") {
                        let value = range.validate(literal);
                        if !value.is_valid() {
                            return Err(EvoError::Parse(
                                cmd_info(cmd, "the value literal is invalid")
                                    .with_context("attribute", name)
                                    .with_context("literal", literal),
                            ));
                        }
                        GenFunction::Value(value)
                    } else {
                        return Err(EvoError::Parse(
                            cmd_info(cmd, "unknown per-attribute function")
                                .with_context("attribute", name),
                        ));
                    }
                }
            };
            cmds.push(AttrCmd {
                position,
                name: name.to_string(),
                func,
            });
        }

        let mut command = format!("#{size}");
        for c in &cmds {
            command.push(';');
            command.push_str(&c.name);
            command.push('_');
            command.push_str(&c.func.command_token()?);
        }
        Ok(Self {
            scope: scope.clone(),
            command,
            size,
            mode: Mode::PerAttr(cmds),
        })
    }

    /// The normalized command string.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The number of records a plain [`create`](AttrsGenerator::create)
    /// produces.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The scope this generator draws from.
    pub fn scope(&self) -> &AttrsScope {
        &self.scope
    }

    /// Materializes the configured number of records.
    pub fn create(&self) -> SetOfAttributes {
        self.create_n(self.size)
    }

    /// Materializes `size` records (0 falls back to the configured size).
    pub fn create_n(&self, size: usize) -> SetOfAttributes {
        let size = if size == 0 { self.size } else { size };

        match &self.mode {
            Mode::SameForAll(func) => {
                let mut value = func.value_source();
                (0..size)
                    .map(|_| {
                        let mut attrs = Attributes::new();
                        for range in self.scope.values().map(Arc::as_ref) {
                            attrs.push(range.name(), value(range));
                        }
                        attrs
                    })
                    .collect()
            }
            Mode::PerAttr(cmds) => {
                // columns are filled rule by rule, then reassembled into
                // records laid out in scope order
                let width = self.scope.len();
                let mut names = vec![String::new(); width];
                let mut columns: Vec<Vec<Value>> = vec![Vec::new(); width];
                for c in cmds {
                    let range = self.scope[c.position].as_ref();
                    let mut value = c.func.value_source();
                    names[c.position] = c.name.clone();
                    columns[c.position] = (0..size).map(|_| value(range)).collect();
                }
                (0..size)
                    .map(|row| {
                        let mut attrs = Attributes::new();
                        for (name, column) in names.iter().zip(&columns) {
                            attrs.push(name.as_str(), column[row].clone());
                        }
                        attrs
                    })
                    .collect()
            }
        }
    }
}

fn check_size(cmd: &str, size: i64) -> Result<usize, EvoError> {
    if size < 1 {
        return Err(EvoError::Parse(cmd_info(
            cmd,
            "the size of the attributes set must be positive",
        )));
    }
    Ok(size as usize)
}

fn parse_seed(cmd: &str, seed: &str) -> Result<u64, EvoError> {
    match seed.parse::<u64>() {
        // reject non-canonical spellings such as '01' or '+1'
        Ok(value) if seed == value.to_string() => Ok(value),
        _ => Err(EvoError::Parse(
            cmd_info(cmd, "the generator seed should be a non-negative integer")
                .with_context("seed", seed),
        )),
    }
}

fn cmd_info(cmd: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new("gen.bad_command", message).with_context("command", cmd)
}
