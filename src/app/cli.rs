use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::time::Duration;
use thiserror::Error;

/// Long flags accepted with a single leading dash, e.g. `-role-arn`.
const LONG_FLAGS: &[&str] = &[
    "role-arn",
    "role-session-name",
    "duration",
    "external-id",
    "serial-number",
    "token-code",
    "source-identity",
    "verbose",
    "help",
    "version",
];

/// Long flags that consume the following argument when given without `=`.
const VALUE_FLAGS: &[&str] = &[
    "role-arn",
    "role-session-name",
    "duration",
    "external-id",
    "serial-number",
    "token-code",
    "source-identity",
];

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(override_usage = "aws-assume-role -role-arn [ROLE ARN] -- [COMMANDS...]")]
pub struct CliArgs {
    /// Role ARN to assume (required)
    #[clap(long, allow_hyphen_values = true)]
    pub role_arn: Option<String>,

    /// Role session name (defaults to the current unix time in nanoseconds)
    #[clap(long, allow_hyphen_values = true)]
    pub role_session_name: Option<String>,

    /// Role session duration, e.g. 900s, 15m or 1h
    #[clap(long, default_value = "900s", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// External ID required by the role's trust policy
    #[clap(long, allow_hyphen_values = true)]
    pub external_id: Option<String>,

    /// Serial number or ARN of the MFA device
    #[clap(long, allow_hyphen_values = true)]
    pub serial_number: Option<String>,

    /// Token code provided by the MFA device
    #[clap(long, allow_hyphen_values = true)]
    pub token_code: Option<String>,

    /// Source identity to record for the role session
    #[clap(long, allow_hyphen_values = true)]
    pub source_identity: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Command to run with the assumed role credentials
    #[clap(trailing_var_arg = true, value_name = "COMMANDS")]
    pub command: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("role-arn is required")]
    MissingRoleArn,

    #[error("duration {} does not fit in a 32-bit number of seconds", humantime::format_duration(*.0))]
    DurationOutOfRange(Duration),
}

/// Settings for a single run, fixed once parsed.
#[derive(Debug, Clone)]
pub struct Config {
    pub role_arn: String,
    pub role_session_name: String,
    pub duration: Duration,
    pub external_id: Option<String>,
    pub serial_number: Option<String>,
    pub token_code: Option<String>,
    pub source_identity: Option<String>,
    pub command: Vec<String>,
}

impl Config {
    /// Whole seconds to request, or `None` for a zero duration so the service default applies.
    pub fn duration_seconds(&self) -> Option<i32> {
        match self.duration.as_secs() {
            0 => None,
            secs => i32::try_from(secs).ok(),
        }
    }
}

impl TryFrom<CliArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let role_arn = non_empty(args.role_arn).ok_or(ConfigError::MissingRoleArn)?;

        if i32::try_from(args.duration.as_secs()).is_err() {
            return Err(ConfigError::DurationOutOfRange(args.duration));
        }

        Ok(Config {
            role_arn,
            role_session_name: non_empty(args.role_session_name)
                .unwrap_or_else(default_session_name),
            duration: args.duration,
            external_id: non_empty(args.external_id),
            serial_number: non_empty(args.serial_number),
            token_code: non_empty(args.token_code),
            source_identity: non_empty(args.source_identity),
            command: args.command,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn default_session_name() -> String {
    let now = chrono::Utc::now();
    match now.timestamp_nanos_opt() {
        Some(nanos) => nanos.to_string(),
        None => now.timestamp().to_string(),
    }
}

/// Rewrites Go-style single-dash long flags (`-role-arn`) to `--role-arn`.
///
/// Only arguments ahead of the command are touched: rewriting stops at `--`
/// or at the first positional argument, so the child's own flags pass through.
pub fn normalize_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut out: Vec<OsString> = args.next().into_iter().collect();

    while let Some(arg) = args.next() {
        let Some(text) = arg.to_str() else {
            out.push(arg);
            break;
        };

        if text == "--" || !text.starts_with('-') || text == "-" {
            out.push(arg);
            break;
        }

        let (flag, inline_value) = match text.trim_start_matches('-').split_once('=') {
            Some((flag, _)) => (flag, true),
            None => (text.trim_start_matches('-'), false),
        };
        let takes_value = VALUE_FLAGS.contains(&flag) && !inline_value;

        if !text.starts_with("--") && LONG_FLAGS.contains(&flag) {
            out.push(format!("-{text}").into());
        } else {
            out.push(arg);
        }

        if takes_value {
            if let Some(value) = args.next() {
                out.push(value);
            }
        }
    }

    out.extend(args);
    out
}

pub fn parse_args() -> CliArgs {
    CliArgs::parse_from(normalize_args(std::env::args_os()))
}
