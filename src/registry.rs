//! Codec lookup by configuration string.
//!
//! Training configs name their action tokenizer with a call-like string:
//!
//! ```text
//! action_tokenizer.bin(min_action_value=-1, max_action_value=1, action_vocab_size=128)
//! action_tokenizer.dct(action_dim=2, time_horizon=10, pretrained_path=None)
//! ```
//!
//! The prefix is optional and a bare name uses every default. Each name maps
//! to a factory in a fixed table; there is no runtime registration.

use std::path::PathBuf;

use fancy_regex::Regex;

use crate::{
    bin_codec::{BinCodec, BinCodecConfig, Bounds},
    codec::ActionCodec,
    dct_codec::{DctCodec, DctCodecConfig},
    error::RegistryError,
    types::CodecKind,
};

/// Name, then an optional parenthesized argument list.
const SPEC_PATTERN: &str =
    r"^\s*(?:action_tokenizer\.)?(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?:\((?P<args>.*)\))?\s*$";

const ARG_PATTERN: &str = r"^\s*(?P<key>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?P<value>.+?)\s*$";

type Factory = fn(&CodecSpec) -> Result<Box<dyn ActionCodec>, RegistryError>;

const FACTORIES: &[(CodecKind, Factory)] = &[(CodecKind::Bin, build_bin), (CodecKind::Dct, build_dct)];

/// A literal argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<f64>),
}

impl ArgValue {
    fn parse(arg: &str, raw: &str) -> Result<Self, RegistryError> {
        let bad = |reason: String| RegistryError::BadValue {
            arg: arg.to_string(),
            reason,
        };
        match raw {
            "None" => return Ok(Self::None),
            "True" | "true" => return Ok(Self::Bool(true)),
            "False" | "false" => return Ok(Self::Bool(false)),
            _ => {}
        }
        if let Some(quoted) = raw
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        {
            return Ok(Self::Str(quoted.to_string()));
        }
        if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<f64>()
                        .map_err(|_| bad(format!("list element {s:?} is not a number")))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Self::Int(i));
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Ok(Self::Float(f));
        }
        Err(bad(format!("cannot parse {raw:?}")))
    }
}

/// A parsed configuration string.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecSpec {
    pub name: String,
    pub args: Vec<(String, ArgValue)>,
}

impl CodecSpec {
    /// # Errors
    ///
    /// Returns [`RegistryError::Syntax`] for strings that are not of the form
    /// `[action_tokenizer.]name[(key=value, ...)]`, and
    /// [`RegistryError::BadValue`] for unparseable literals.
    pub fn parse(spec: &str) -> Result<Self, RegistryError> {
        let re = Regex::new(SPEC_PATTERN)?;
        let caps = re
            .captures(spec)?
            .ok_or_else(|| RegistryError::Syntax(spec.to_string()))?;
        let name = caps
            .name("name")
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| RegistryError::Syntax(spec.to_string()))?;

        let mut args = Vec::new();
        if let Some(raw_args) = caps.name("args") {
            let arg_re = Regex::new(ARG_PATTERN)?;
            for part in split_top_level(raw_args.as_str())? {
                if part.trim().is_empty() {
                    continue;
                }
                let arg_caps = arg_re
                    .captures(part)?
                    .ok_or_else(|| RegistryError::Syntax(spec.to_string()))?;
                let (Some(key), Some(value)) = (arg_caps.name("key"), arg_caps.name("value")) else {
                    return Err(RegistryError::Syntax(spec.to_string()));
                };
                let key = key.as_str().to_string();
                let value = ArgValue::parse(&key, value.as_str())?;
                args.push((key, value));
            }
        }
        Ok(Self { name, args })
    }

    fn get(&self, key: &str) -> Option<&ArgValue> {
        self.args.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn check_known(&self, codec: CodecKind, known: &[&str]) -> Result<(), RegistryError> {
        match self.args.iter().find(|(k, _)| !known.contains(&k.as_str())) {
            Some((k, _)) => Err(RegistryError::UnknownArgument {
                codec,
                arg: k.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Splits on commas that are not inside brackets or quotes.
fn split_top_level(s: &str) -> Result<Vec<&str>, RegistryError> {
    let mut parts = Vec::new();
    let (mut depth, mut quote, mut start) = (0usize, None, 0);
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| RegistryError::Syntax(s.to_string()))?;
            }
            (None, ',') if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return Err(RegistryError::Syntax(s.to_string()));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

fn bad_value(arg: &str, expected: &str, value: &ArgValue) -> RegistryError {
    RegistryError::BadValue {
        arg: arg.to_string(),
        reason: format!("expected {expected}, got {value:?}"),
    }
}

fn as_f64(arg: &str, value: &ArgValue) -> Result<f64, RegistryError> {
    match *value {
        ArgValue::Int(i) => Ok(i as f64),
        ArgValue::Float(f) => Ok(f),
        _ => Err(bad_value(arg, "a number", value)),
    }
}

fn as_i64(arg: &str, value: &ArgValue) -> Result<i64, RegistryError> {
    match *value {
        ArgValue::Int(i) => Ok(i),
        _ => Err(bad_value(arg, "an integer", value)),
    }
}

fn as_usize(arg: &str, value: &ArgValue) -> Result<usize, RegistryError> {
    match *value {
        ArgValue::Int(i) if i >= 0 => Ok(i as usize),
        _ => Err(bad_value(arg, "a non-negative integer", value)),
    }
}

fn as_opt_usize(arg: &str, value: &ArgValue) -> Result<Option<usize>, RegistryError> {
    match value {
        ArgValue::None => Ok(None),
        other => as_usize(arg, other).map(Some),
    }
}

fn as_bool(arg: &str, value: &ArgValue) -> Result<bool, RegistryError> {
    match *value {
        ArgValue::Bool(b) => Ok(b),
        _ => Err(bad_value(arg, "True or False", value)),
    }
}

fn as_opt_path(arg: &str, value: &ArgValue) -> Result<Option<PathBuf>, RegistryError> {
    match value {
        ArgValue::None => Ok(None),
        ArgValue::Str(s) => Ok(Some(PathBuf::from(s))),
        other => Err(bad_value(arg, "a quoted path or None", other)),
    }
}

fn as_bounds(arg: &str, value: &ArgValue) -> Result<Bounds, RegistryError> {
    match value {
        ArgValue::List(values) => Ok(Bounds::PerDim(values.clone())),
        other => as_f64(arg, other).map(Bounds::Scalar),
    }
}

/// Builds a [`BinCodecConfig`] from a parsed spec; both bounds are required.
pub fn bin_config(spec: &CodecSpec) -> Result<BinCodecConfig, RegistryError> {
    spec.check_known(
        CodecKind::Bin,
        &[
            "min_action_value",
            "max_action_value",
            "action_vocab_size",
            "vocab_size",
            "action_horizon",
            "action_dim",
        ],
    )?;
    let required = |arg: &'static str| {
        spec.get(arg).ok_or(RegistryError::MissingArgument {
            codec: CodecKind::Bin,
            arg,
        })
    };

    let mut config = BinCodecConfig {
        min_action_value: as_bounds("min_action_value", required("min_action_value")?)?,
        max_action_value: as_bounds("max_action_value", required("max_action_value")?)?,
        ..BinCodecConfig::default()
    };
    for key in ["vocab_size", "action_vocab_size"] {
        if let Some(v) = spec.get(key) {
            config.vocab_size = as_usize(key, v)?;
        }
    }
    if let Some(v) = spec.get("action_horizon") {
        config.action_horizon = as_usize("action_horizon", v)?;
    }
    if let Some(v) = spec.get("action_dim") {
        config.action_dim = as_usize("action_dim", v)?;
    }
    Ok(config)
}

/// Builds a [`DctCodecConfig`] from a parsed spec; every argument is optional.
pub fn dct_config(spec: &CodecSpec) -> Result<DctCodecConfig, RegistryError> {
    spec.check_known(
        CodecKind::Dct,
        &[
            "scale",
            "vocab_size",
            "min_token",
            "action_dim",
            "time_horizon",
            "save_path",
            "pretrained_path",
            "do_fit",
            "show_progress",
        ],
    )?;
    let mut config = DctCodecConfig::default();
    for (key, value) in &spec.args {
        match key.as_str() {
            "scale" => config.scale = as_f64(key, value)?,
            "vocab_size" => config.vocab_size = as_usize(key, value)?,
            "min_token" => config.min_token = as_i64(key, value)?,
            "action_dim" => config.action_dim = as_opt_usize(key, value)?,
            "time_horizon" => config.time_horizon = as_opt_usize(key, value)?,
            "save_path" => config.save_path = as_opt_path(key, value)?,
            "pretrained_path" => config.pretrained_path = as_opt_path(key, value)?,
            "do_fit" => config.do_fit = as_bool(key, value)?,
            "show_progress" => config.show_progress = as_bool(key, value)?,
            _ => {}
        }
    }
    Ok(config)
}

fn build_bin(spec: &CodecSpec) -> Result<Box<dyn ActionCodec>, RegistryError> {
    Ok(Box::new(BinCodec::new(bin_config(spec)?)?))
}

fn build_dct(spec: &CodecSpec) -> Result<Box<dyn ActionCodec>, RegistryError> {
    Ok(Box::new(DctCodec::new(dct_config(spec)?)?))
}

/// Names accepted by [`lookup`].
pub fn registered() -> impl Iterator<Item = &'static str> {
    FACTORIES.iter().map(|(kind, _)| kind.name())
}

/// Parses `spec` and builds the codec it names.
///
/// # Errors
///
/// Returns [`RegistryError::UnknownCodec`] for unregistered names, any
/// parse/argument error, or the codec's own construction error.
pub fn lookup(spec: &str) -> Result<Box<dyn ActionCodec>, RegistryError> {
    let parsed = CodecSpec::parse(spec)?;
    let (_, factory) = FACTORIES
        .iter()
        .find(|(kind, _)| kind.name() == parsed.name)
        .ok_or_else(|| RegistryError::UnknownCodec {
            name: parsed.name.clone(),
            known: registered().collect::<Vec<_>>().join(", "),
        })?;
    log::debug!("building action tokenizer {spec}");
    factory(&parsed)
}
