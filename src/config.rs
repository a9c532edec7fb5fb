//! Model configuration text format.
//!
//! Flat text, one component per block:
//!
//! ```text
//! # comment
//! X0  32.0
//! Y0  32.0
//! FUNCTION Sersic
//! PA    10.0   0 180
//! ell   0.3    0 1
//! n     2.5
//! I_e   100.0
//! r_e   10.0
//! ```
//!
//! `X0`/`Y0` set the block center and stick until changed, so several
//! blocks can share a center. Parameter lines are
//! `<label> <value> [<lower> <upper>]` in each function's declared order;
//! the optional bounds are carried through for the external optimizer.
//!
//! The core never reads files on its own behalf; this module exists for
//! the CLI and tooling, and hands the core plain
//! [`ComponentDescriptor`] values.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::functions::{ComponentDescriptor, ComponentKind, ParamSpec};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: unknown function `{name}`")]
    UnknownFunction { line: usize, name: String },
    #[error("line {line}: expected parameter `{expected}` of {function}, found `{found}`")]
    UnexpectedLabel {
        line: usize,
        function: &'static str,
        expected: &'static str,
        found: String,
    },
    #[error("line {line}: {function} takes {expected} parameters, found another line")]
    ExtraParameter {
        line: usize,
        function: &'static str,
        expected: usize,
    },
    #[error("line {line}: could not parse `{token}` as a number")]
    BadNumber { line: usize, token: String },
    #[error("line {line}: malformed line `{text}`")]
    Malformed { line: usize, text: String },
    #[error("line {line}: bounds are inverted ({lower} > {upper})")]
    BadBounds { line: usize, lower: f64, upper: f64 },
    #[error("FUNCTION {function} starting at line {line} has {found} of {expected} parameters")]
    IncompleteBlock {
        line: usize,
        function: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: FUNCTION block before any X0/Y0 center")]
    MissingCenter { line: usize },
    #[error("the configuration defines no FUNCTION blocks")]
    Empty,
}

struct OpenBlock {
    kind: ComponentKind,
    start_line: usize,
    x0: f64,
    y0: f64,
    params: Vec<ParamSpec>,
}

impl OpenBlock {
    fn finish(self) -> Result<ComponentDescriptor, ConfigError> {
        if self.params.len() != self.kind.n_params() {
            return Err(ConfigError::IncompleteBlock {
                line: self.start_line,
                function: self.kind.short_name(),
                expected: self.kind.n_params(),
                found: self.params.len(),
            });
        }
        Ok(ComponentDescriptor {
            kind: self.kind,
            x0: self.x0,
            y0: self.y0,
            params: self.params,
            subsample: true,
        })
    }
}

fn parse_number(token: &str, line: usize) -> Result<f64, ConfigError> {
    token.parse().map_err(|_| ConfigError::BadNumber {
        line,
        token: token.to_string(),
    })
}

/// Parse a configuration from text.
pub fn parse_config(text: &str) -> Result<Vec<ComponentDescriptor>, ConfigError> {
    let mut descriptors = Vec::new();
    let mut center: Option<(f64, f64)> = None;
    let mut open: Option<OpenBlock> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let stripped = match raw_line.find('#') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        };
        let tokens: Vec<&str> = stripped.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        match tokens[0] {
            "X0" | "Y0" => {
                if tokens.len() != 2 {
                    return Err(ConfigError::Malformed {
                        line,
                        text: stripped.trim().to_string(),
                    });
                }
                if let Some(block) = open.take() {
                    descriptors.push(block.finish()?);
                }
                let value = parse_number(tokens[1], line)?;
                let (x0, y0) = center.unwrap_or((0.0, 0.0));
                center = Some(if tokens[0] == "X0" {
                    (value, y0)
                } else {
                    (x0, value)
                });
            }
            "FUNCTION" => {
                if tokens.len() != 2 {
                    return Err(ConfigError::Malformed {
                        line,
                        text: stripped.trim().to_string(),
                    });
                }
                if let Some(block) = open.take() {
                    descriptors.push(block.finish()?);
                }
                let kind = ComponentKind::from_name(tokens[1]).ok_or_else(|| {
                    ConfigError::UnknownFunction {
                        line,
                        name: tokens[1].to_string(),
                    }
                })?;
                let (x0, y0) = center.ok_or(ConfigError::MissingCenter { line })?;
                open = Some(OpenBlock {
                    kind,
                    start_line: line,
                    x0,
                    y0,
                    params: Vec::new(),
                });
            }
            label => {
                let block = open.as_mut().ok_or_else(|| ConfigError::Malformed {
                    line,
                    text: stripped.trim().to_string(),
                })?;
                if block.params.len() == block.kind.n_params() {
                    return Err(ConfigError::ExtraParameter {
                        line,
                        function: block.kind.short_name(),
                        expected: block.kind.n_params(),
                    });
                }
                let expected = block.kind.param_labels()[block.params.len()];
                if label != expected {
                    return Err(ConfigError::UnexpectedLabel {
                        line,
                        function: block.kind.short_name(),
                        expected,
                        found: label.to_string(),
                    });
                }
                let value = match tokens.get(1) {
                    Some(token) => parse_number(token, line)?,
                    None => {
                        return Err(ConfigError::Malformed {
                            line,
                            text: stripped.trim().to_string(),
                        })
                    }
                };
                let bounds = match tokens.len() {
                    2 => None,
                    4 => {
                        let lower = parse_number(tokens[2], line)?;
                        let upper = parse_number(tokens[3], line)?;
                        if lower > upper {
                            return Err(ConfigError::BadBounds { line, lower, upper });
                        }
                        Some((lower, upper))
                    }
                    _ => {
                        return Err(ConfigError::Malformed {
                            line,
                            text: stripped.trim().to_string(),
                        })
                    }
                };
                block.params.push(ParamSpec {
                    label: expected.to_string(),
                    value,
                    bounds,
                });
            }
        }
    }

    if let Some(block) = open.take() {
        descriptors.push(block.finish()?);
    }
    if descriptors.is_empty() {
        return Err(ConfigError::Empty);
    }
    Ok(descriptors)
}

/// Parse a configuration file from disk.
pub fn parse_config_file<P: AsRef<Path>>(path: P) -> Result<Vec<ComponentDescriptor>, ConfigError> {
    parse_config(&fs::read_to_string(path)?)
}
