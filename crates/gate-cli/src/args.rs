//! Turn `--field value` pairs into action params.

use gate_core::{FieldKind, GateError, InputSchema, Params};
use serde_json::Value;

/// Parse the arguments that follow an action name.
///
/// Accepted forms are `--name value`, `--name=value`, and a bare `--flag` for
/// boolean inputs. Values stay strings; the dispatcher coerces them against
/// the schema. A repeated flag keeps its last value.
pub fn parse_action_args(schema: &InputSchema, args: &[String]) -> Result<Params, GateError> {
    let mut params = Params::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        let Some(flag) = arg.strip_prefix("--").filter(|f| !f.is_empty()) else {
            return Err(malformed(format!("unexpected argument '{arg}'")));
        };
        let (name, inline) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (flag, None),
        };
        let Some(field) = schema.get(name) else {
            return Err(malformed(format!("unknown flag --{name}")));
        };

        let value = match (inline, field.kind) {
            (Some(v), _) => Value::String(v.to_owned()),
            (None, FieldKind::Boolean) => match iter.peek().map(|s| s.as_str()) {
                Some(v @ ("true" | "false")) => {
                    let _ = iter.next();
                    Value::String(v.to_owned())
                }
                _ => Value::Bool(true),
            },
            (None, _) => match iter.next_if(|next| !next.starts_with("--")) {
                Some(v) => Value::String(v.clone()),
                None => return Err(malformed(format!("flag --{name} requires a value"))),
            },
        };
        let _ = params.insert(field.name.clone(), value);
    }

    Ok(params)
}

fn malformed(message: String) -> GateError {
    GateError::MalformedRequest { message }
}
