use std::{convert::Infallible, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path of the socket mpv was started with (`--input-ipc-server`).
    #[arg(long, global = true, default_value = "/tmp/mpv_rpc")]
    pub socket: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the current value of a property.
    Get(GetArgs),
    /// Set a property.
    Set(SetArgs),
    /// Send a raw command and print its result.
    Call(CallArgs),
    /// Print events as JSON lines until interrupted.
    Events(EventsArgs),
    /// Pause playback, read it back, then resume it later while printing events.
    Demo(DemoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GetArgs {
    /// Property name, e.g. `pause` or `volume`.
    pub property: String,
}

#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    /// Property name, e.g. `pause` or `volume`.
    pub property: String,

    /// New value. Parsed as JSON, falling back to a plain string.
    #[arg(allow_hyphen_values = true, value_parser = parse_argument)]
    pub value: Value,
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
    /// Command name followed by its arguments. Each one is parsed as JSON,
    /// falling back to a plain string.
    #[arg(
        required = true,
        num_args = 1..,
        allow_hyphen_values = true,
        value_parser = parse_argument
    )]
    pub arguments: Vec<Value>,
}

#[derive(Args, Debug, Clone)]
pub struct EventsArgs {
    /// Stop listening after this many seconds.
    #[arg(long)]
    pub for_secs: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Seconds to wait before resuming playback.
    #[arg(long, default_value_t = 3)]
    pub resume_after: u64,

    /// Seconds to print events for before unsubscribing.
    #[arg(long, default_value_t = 5)]
    pub listen_for: u64,
}

/// Reads a command-line argument as JSON so `true`, `50` or `[1,2]` keep
/// their types, and treats anything else as a string.
pub fn parse_argument(raw: &str) -> Result<Value, Infallible> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn arguments_keep_their_json_types() {
        assert_eq!(parse_argument("true"), Ok(json!(true)));
        assert_eq!(parse_argument("42.5"), Ok(json!(42.5)));
        assert_eq!(parse_argument("[1,\"a\"]"), Ok(json!([1, "a"])));
        assert_eq!(parse_argument("loadfile"), Ok(json!("loadfile")));
        assert_eq!(parse_argument("/tmp/video.mkv"), Ok(json!("/tmp/video.mkv")));
    }

    #[test]
    fn call_collects_every_argument() {
        let cli = Cli::try_parse_from(["mpv-ipc", "call", "set_property", "volume", "50"])
            .expect("valid arguments");
        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.arguments, [json!("set_property"), json!("volume"), json!(50)]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.socket, PathBuf::from("/tmp/mpv_rpc"));
    }

    #[test]
    fn socket_can_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["mpv-ipc", "get", "pause", "--socket", "/run/mpv.sock"])
            .expect("valid arguments");
        assert_eq!(cli.socket, PathBuf::from("/run/mpv.sock"));
        assert!(matches!(cli.command, Command::Get(GetArgs { ref property }) if property == "pause"));
    }
}
