use std::num::ParseFloatError;

use thiserror::Error;

use crate::{Command, SpeedError, SpeedMultiplier};

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
    #[error("invalid float '{value}' for {context}: {source}")]
    InvalidFloat {
        value: String,
        context: &'static str,
        source: ParseFloatError,
    },
    #[error(transparent)]
    Speed(#[from] SpeedError),
}

pub fn parse_command_line(input: &str) -> Result<Command, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    let command = match verb.as_str() {
        "start" | "play" | "resume" => Command::Start,
        "pause" | "stop" => Command::Pause,
        "reset" => Command::Reset,
        "step" | "next" => Command::Step,
        "speed" => {
            let value_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("speed multiplier"))?;
            let digits = value_str.trim_end_matches(|c: char| c.eq_ignore_ascii_case(&'x'));
            let value = parse_f64(digits, "speed multiplier")?;
            Command::SetSpeed(SpeedMultiplier::new(value)?)
        }
        other => return Err(CommandParseError::UnknownCommand(other.to_string())),
    };

    if let Some(extra) = parts.next() {
        return Err(CommandParseError::UnexpectedArgument(extra.to_string()));
    }
    Ok(command)
}

fn parse_f64(value: &str, context: &'static str) -> Result<f64, CommandParseError> {
    value
        .parse::<f64>()
        .map_err(|source| CommandParseError::InvalidFloat {
            value: value.to_string(),
            context,
            source,
        })
}
