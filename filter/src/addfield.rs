//! Insert constant or computed fields into each CDXJ line's JSON object.

use cdxj_core::record::{self, ParseMode, Record};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{BufRead, Write};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("Malformed CDXJ line")]
    MalformedLine(#[from] record::Error),
    #[error("addfield requires exactly one of constants or a transform, got {0}")]
    Config(&'static str),
}

/// A statically registered named transform, selected by name from the
/// CLI rather than loaded from a user-supplied script.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transform {
    /// Overwrite the named fields with fixed values from a constants map.
    SetFields,
    /// Remove a single named field if present.
    StripField,
}

impl Transform {
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "set-fields" => Some(Self::SetFields),
            "strip-field" => Some(Self::StripField),
            _ => None,
        }
    }

    fn apply(self, object: &mut Map<String, Value>, args: &HashMap<String, String>) {
        match self {
            Self::SetFields => {
                for (key, value) in args {
                    object.insert(key.clone(), Value::String(value.clone()));
                }
            }
            Self::StripField => {
                if let Some(field) = args.get("field") {
                    object.remove(field);
                }
            }
        }
    }
}

/// Exactly one of `constants` or `transform` must be set; both or
/// neither is a configuration error caught before any I/O happens.
pub enum Mode {
    Constants(HashMap<String, String>),
    Transform { transform: Transform, args: HashMap<String, String> },
}

impl Mode {
    pub fn constants(map: HashMap<String, String>) -> Result<Self, Error> {
        if map.is_empty() {
            return Err(Error::Config("neither constants nor a transform"));
        }
        Ok(Self::Constants(map))
    }

    pub fn transform(transform: Transform, args: HashMap<String, String>) -> Self {
        Self::Transform { transform, args }
    }

    fn apply(&self, object: &mut Map<String, Value>) {
        match self {
            Self::Constants(map) => {
                for (key, value) in map {
                    object.insert(key.clone(), Value::String(value.clone()));
                }
            }
            Self::Transform { transform, args } => transform.apply(object, args),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub annotated: usize,
    pub skipped: usize,
}

/// Apply `mode` to every line of `input`, in either strict (malformed
/// lines abort) or lenient (malformed lines pass through unchanged and
/// are counted as skipped) mode.
pub fn run<R: BufRead, W: Write>(
    mode: &Mode,
    parse_mode: ParseMode,
    input: R,
    output: &mut W,
) -> Result<Stats, Error> {
    let mut stats = Stats::default();

    for line in input.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        match parse_mode {
            ParseMode::Strict => {
                let mut record = Record::parse(&line, ParseMode::Strict)?;
                let object = as_object_mut(&mut record.json);
                mode.apply(object);
                writeln!(output, "{}", record.to_line())?;
                stats.annotated += 1;
            }
            ParseMode::Lenient => match Record::parse(&line, ParseMode::Lenient) {
                Ok(mut record) => {
                    let object = as_object_mut(&mut record.json);
                    mode.apply(object);
                    writeln!(output, "{}", record.to_line())?;
                    stats.annotated += 1;
                }
                Err(_) => {
                    writeln!(output, "{}", line)?;
                    stats.skipped += 1;
                }
            },
        }
    }

    Ok(stats)
}

/// Coerce a non-object JSON payload into an empty object in place;
/// addfield's contract operates on an object regardless of what the
/// line originally carried.
fn as_object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut().expect("just coerced to object")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn constants_overwrite_existing_keys() {
        let mut constants = HashMap::new();
        constants.insert("collection".to_string(), "demo".to_string());
        let mode = Mode::constants(constants).unwrap();

        let input = r#"com,a)/ 20230101000000 {"collection":"old"}
"#;
        let mut output = Vec::new();
        let stats = run(&mode, ParseMode::Strict, Cursor::new(input), &mut output).unwrap();

        assert_eq!(stats.annotated, 1);
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains(r#""collection":"demo""#));
    }

    #[test]
    fn empty_constants_map_is_config_error() {
        assert!(matches!(Mode::constants(HashMap::new()), Err(Error::Config(_))));
    }

    #[test]
    fn strip_field_transform_removes_named_field() {
        let mut args = HashMap::new();
        args.insert("field".to_string(), "mime".to_string());
        let mode = Mode::transform(Transform::StripField, args);

        let input = r#"com,a)/ 20230101000000 {"mime":"text/html","status":200}
"#;
        let mut output = Vec::new();
        run(&mode, ParseMode::Strict, Cursor::new(input), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(!text.contains("mime"));
        assert!(text.contains("status"));
    }

    #[test]
    fn lenient_mode_passes_malformed_lines_through() {
        let mut constants = HashMap::new();
        constants.insert("x".to_string(), "1".to_string());
        let mode = Mode::constants(constants).unwrap();

        let input = "not-a-valid-line\n";
        let mut output = Vec::new();
        let stats = run(&mode, ParseMode::Lenient, Cursor::new(input), &mut output).unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(String::from_utf8(output).unwrap(), "not-a-valid-line\n");
    }

    #[test]
    fn strict_mode_rejects_malformed_lines() {
        let mut constants = HashMap::new();
        constants.insert("x".to_string(), "1".to_string());
        let mode = Mode::constants(constants).unwrap();

        let input = "not-a-valid-line\n";
        let mut output = Vec::new();
        let result = run(&mode, ParseMode::Strict, Cursor::new(input), &mut output);

        assert!(matches!(result, Err(Error::MalformedLine(_))));
    }

    #[test]
    fn idempotent_with_same_constants() {
        let mut constants = HashMap::new();
        constants.insert("collection".to_string(), "demo".to_string());
        let mode = Mode::constants(constants).unwrap();

        let input = r#"com,a)/ 20230101000000 {"s":200}
"#;
        let mut once = Vec::new();
        run(&mode, ParseMode::Strict, Cursor::new(input), &mut once).unwrap();

        let mut twice = Vec::new();
        run(&mode, ParseMode::Strict, Cursor::new(once.clone()), &mut twice).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn missing_json_payload_starts_from_empty_object() {
        let mut constants = HashMap::new();
        constants.insert("x".to_string(), "1".to_string());
        let mode = Mode::constants(constants).unwrap();

        let input = "com,a)/ 20230101000000\n";
        let mut output = Vec::new();
        run(&mode, ParseMode::Lenient, Cursor::new(input), &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "com,a)/ 20230101000000 {\"x\":\"1\"}\n"
        );
    }
}
