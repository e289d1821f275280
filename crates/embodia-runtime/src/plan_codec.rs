//! Decoding backend replies into typed [`ActionPlan`]s.
//!
//! The backend answers with JSON of the shape
//!
//! ```json
//! { "response": "Sure, returning to zero.", "function": ["move_to_zero()", "llm_led('blue')"] }
//! ```
//!
//! Each `function` entry is either a call expression string or a typed object
//! `{ "name": ..., "arguments": [...] }`.  Call strings go through a
//! literal-only parser: a bare identifier followed by a parenthesised list of
//! integer, float, string or boolean literals.  Nothing in the reply is ever
//! evaluated, and anything the parser does not recognise is a
//! [`AgentError::MalformedPlan`].

use embodia_types::{ActionCall, ActionPlan, AgentError, ArgValue};
use schemars::JsonSchema;
use serde::Deserialize;

/// Output contract sent to the backend with every request.
pub const PLAN_FORMAT_CONTRACT: &str = "\
## Output format
Reply with exactly one JSON object and nothing else:
{\"response\": \"<what you say to the user>\", \"function\": [\"action_name(arg, ...)\", ...]}
- `response` is required.
- `function` lists the actions to run, in order; use [] when no action is needed.
- Arguments must be literals: integers, decimals, quoted strings, true or false.";

/// The plan exactly as it appears on the wire.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RawPlan {
    /// Natural-language reply spoken to the user.
    pub response: String,
    /// Ordered actions to execute.
    #[serde(default)]
    pub function: Vec<RawCall>,
}

/// One entry of the wire `function` list.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawCall {
    /// `"move_to_coords(120, -40)"`
    Expr(String),
    /// `{"name": "move_to_coords", "arguments": [120, -40]}`
    Typed {
        name: String,
        #[serde(default)]
        arguments: Vec<ArgValue>,
    },
}

/// Decode a backend reply into an [`ActionPlan`].
///
/// Markdown code fences around the JSON are tolerated.
pub fn decode_plan(reply: &str) -> Result<ActionPlan, AgentError> {
    let raw: RawPlan = serde_json::from_str(strip_fences(reply))
        .map_err(|e| AgentError::MalformedPlan(format!("reply is not a plan object: {e}")))?;
    let actions = raw
        .function
        .into_iter()
        .map(|entry| match entry {
            RawCall::Expr(expr) => parse_call(&expr),
            RawCall::Typed { name, arguments } if is_identifier(&name) => {
                Ok(ActionCall::new(name, arguments))
            }
            RawCall::Typed { name, .. } => {
                Err(AgentError::MalformedPlan(format!("invalid action name {name:?}")))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ActionPlan {
        response: raw.response,
        actions,
    })
}

fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─────────────────────────────────────────────────────────────────────────────
// Literal-only call parser
// ─────────────────────────────────────────────────────────────────────────────

/// Parse `name(lit, lit, ...)` into an [`ActionCall`].
pub fn parse_call(expr: &str) -> Result<ActionCall, AgentError> {
    let mut p = CallParser {
        src: expr,
        chars: expr.char_indices().peekable(),
    };
    p.skip_ws();
    let name = p.identifier()?;
    p.skip_ws();
    p.expect('(')?;
    let mut arguments = Vec::new();
    loop {
        p.skip_ws();
        if p.eat(')') {
            break;
        }
        arguments.push(p.literal()?);
        p.skip_ws();
        if p.eat(',') {
            continue;
        }
        p.expect(')')?;
        break;
    }
    p.skip_ws();
    // A trailing semicolon is a common model habit.
    p.eat(';');
    p.skip_ws();
    if let Some((at, c)) = p.chars.next() {
        return Err(p.error(format!("unexpected {c:?} at byte {at}")));
    }
    Ok(ActionCall::new(name, arguments))
}

struct CallParser<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl CallParser<'_> {
    fn error(&self, what: impl std::fmt::Display) -> AgentError {
        AgentError::MalformedPlan(format!("cannot parse call {:?}: {what}", self.src))
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, want: char) -> bool {
        self.chars.next_if(|(_, c)| *c == want).is_some()
    }

    fn expect(&mut self, want: char) -> Result<(), AgentError> {
        if self.eat(want) {
            Ok(())
        } else {
            let found = self.chars.peek().map_or("end of input".to_string(), |(_, c)| format!("{c:?}"));
            Err(self.error(format!("expected {want:?}, found {found}")))
        }
    }

    fn identifier(&mut self) -> Result<String, AgentError> {
        let mut name = String::new();
        while let Some((_, c)) = self
            .chars
            .next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        {
            name.push(c);
        }
        if is_identifier(&name) {
            Ok(name)
        } else {
            Err(self.error("missing action name"))
        }
    }

    fn literal(&mut self) -> Result<ArgValue, AgentError> {
        match self.chars.peek().map(|(_, c)| *c) {
            Some(q @ ('"' | '\'')) => {
                self.chars.next();
                self.string(q).map(ArgValue::Str)
            }
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let word = self.identifier()?;
                match word.as_str() {
                    "true" | "True" => Ok(ArgValue::Bool(true)),
                    "false" | "False" => Ok(ArgValue::Bool(false)),
                    _ => Err(self.error(format!("{word} is not a literal"))),
                }
            }
            Some(c) => Err(self.error(format!("unexpected {c:?} in argument list"))),
            None => Err(self.error("unterminated argument list")),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, AgentError> {
        let mut out = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                c if c == quote => return Ok(out),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string literal"))
    }

    fn number(&mut self) -> Result<ArgValue, AgentError> {
        let mut text = String::new();
        while let Some((_, c)) = self
            .chars
            .next_if(|(_, c)| c.is_ascii_alphanumeric() || matches!(*c, '-' | '+' | '.'))
        {
            text.push(c);
        }
        let is_float = text.contains(['.', 'e', 'E']);
        let parsed = if is_float {
            text.parse::<f64>().ok().filter(|x| x.is_finite()).map(ArgValue::Float)
        } else {
            text.parse::<i64>().ok().map(ArgValue::Int)
        };
        parsed.ok_or_else(|| self.error(format!("{text:?} is not a number")))
    }
}
