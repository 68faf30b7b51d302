use crate::bridge::Bridge;
use crate::codec::{self, ByteBuffer};
use crate::engine::{ScriptedEngine, Status};
use crate::frontend::BridgeConfig;
use crate::logging;
use crate::managed::{identity_caller, LocalRuntime};
use std::path::PathBuf;
use std::sync::Arc;

const USAGE: &str = "Usage: prolog-bridge [OPTIONS] <command>\n\n\
    Commands:\n  \
    roundtrip [--bytes N] [--seed S]  Echo random bytes through the callback\n  \
    decode <byte>...                  Managed bytes to engine integers\n  \
    encode <int>...                   Engine integers to managed bytes\n\n\
    Options:\n  \
    --config PATH  Configuration file (default: discover .prolog-bridge.toml)\n  \
    --debug        Trace every boundary step\n  \
    --no-color     Disable colored output";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Roundtrip { bytes: usize, seed: u64 },
    Decode(Vec<i8>),
    Encode(Vec<i64>),
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub command: Command,
    pub config_path: Option<PathBuf>,
    pub debug: bool,
    pub color: bool,
}

pub struct Cli {
    config: CliConfig,
}

impl Cli {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<i32, String> {
        match &self.config.command {
            Command::Roundtrip { bytes, seed } => self.roundtrip(*bytes, *seed),
            Command::Decode(bytes) => {
                let values: Vec<String> = bytes
                    .iter()
                    .map(|&b| codec::normalize(b).to_string())
                    .collect();
                println!("{}", values.join(" "));
                Ok(0)
            }
            Command::Encode(values) => {
                let bytes = values
                    .iter()
                    .map(|&v| codec::denormalize(v).map(|b| b.to_string()))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| e.to_string())?;
                println!("{}", bytes.join(" "));
                Ok(0)
            }
        }
    }

    fn bridge_config(&self) -> Result<BridgeConfig, String> {
        let mut config = match &self.config.config_path {
            Some(path) => BridgeConfig::load(path).map_err(|e| e.to_string())?,
            None => BridgeConfig::discover(),
        };
        config.apply_env().map_err(|e| e.to_string())?;
        if self.config.debug {
            config.debug.enabled = true;
        }
        Ok(config)
    }

    fn roundtrip(&self, len: usize, seed: u64) -> Result<i32, String> {
        let config = self.bridge_config()?;
        let log_config = config.log_config().map_err(|e| e.to_string())?;
        logging::init_with_config(log_config);

        let engine = ScriptedEngine::from_config(&config.engine);
        engine
            .predicates()
            .define_relay("echo", &config.callback.predicate);
        let path = config
            .engine
            .path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scripted".to_string());
        let args = config.engine.args.clone();

        let mut bridge = Bridge::new(engine, Arc::new(LocalRuntime::new()), config);
        bridge
            .init_engine_with_args(&path, &args)
            .map_err(|e| e.to_string())?;

        let request = random_bytes(len, seed);
        let outcome = bridge
            .invoke_query(identity_caller(), &request, 2, "echo")
            .map_err(|e| e.to_string())?;
        let closed = bridge.shutdown();

        let code = self.report_roundtrip(&request, outcome.reply, outcome.status);
        if !closed.is_success() {
            self.print_error(&format!("engine did not close cleanly, status {}", closed));
        }
        Ok(exit_code(code, closed))
    }

    fn report_roundtrip(
        &self,
        request: &ByteBuffer,
        reply: Option<ByteBuffer>,
        status: Status,
    ) -> i32 {
        let sent = blake3::hash(&request.to_unsigned());
        println!("sent     {} bytes  {}", request.len(), sent.to_hex());
        let Some(reply) = reply else {
            self.print_error(&format!("no reply, engine status {}", status));
            return 1;
        };
        let received = blake3::hash(&reply.to_unsigned());
        println!("received {} bytes  {}", reply.len(), received.to_hex());

        if sent == received {
            self.print_success("round trip preserved every byte");
            0
        } else {
            self.print_error("round trip corrupted the buffer");
            1
        }
    }

    fn print_error(&self, msg: &str) {
        if self.config.color {
            eprintln!("\x1b[31m{}\x1b[0m", msg);
        } else {
            eprintln!("{}", msg);
        }
    }

    fn print_success(&self, msg: &str) {
        if self.config.color {
            println!("\x1b[32m{}\x1b[0m", msg);
        } else {
            println!("{}", msg);
        }
    }
}

/// An unclean engine shutdown fails an otherwise successful run
fn exit_code(code: i32, closed: Status) -> i32 {
    if code == 0 && !closed.is_success() {
        1
    } else {
        code
    }
}

/// Deterministic bytes covering the full signed range
pub fn random_bytes(len: usize, seed: u64) -> ByteBuffer {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    let mut raw = vec![0u8; len];
    hasher.finalize_xof().fill(&mut raw);
    ByteBuffer::from_unsigned(&raw)
}

pub fn parse_args(args: &[String]) -> Result<CliConfig, String> {
    let mut config_path = None;
    let mut debug = false;
    let mut color = true;
    let mut positional = Vec::new();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config requires an argument")?;
                config_path = Some(PathBuf::from(path));
            }
            "--debug" => debug = true,
            "--no-color" => color = false,
            "--help" | "-h" => return Err(USAGE.to_string()),
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    let Some((name, rest)) = positional.split_first() else {
        return Err(USAGE.to_string());
    };
    let command = match name.as_str() {
        "roundtrip" => parse_roundtrip(rest)?,
        "decode" => Command::Decode(parse_values(rest, "byte")?),
        "encode" => Command::Encode(parse_values(rest, "integer")?),
        other => return Err(format!("Unknown command: {}\n\n{}", other, USAGE)),
    };

    Ok(CliConfig {
        command,
        config_path,
        debug,
        color,
    })
}

fn parse_roundtrip(args: &[String]) -> Result<Command, String> {
    let mut bytes = 1000;
    let mut seed = 0;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--bytes" => {
                i += 1;
                bytes = args
                    .get(i)
                    .ok_or("--bytes requires an argument")?
                    .parse()
                    .map_err(|_| "Invalid value for --bytes".to_string())?;
            }
            "--seed" => {
                i += 1;
                seed = args
                    .get(i)
                    .ok_or("--seed requires an argument")?
                    .parse()
                    .map_err(|_| "Invalid value for --seed".to_string())?;
            }
            arg => return Err(format!("Unknown option: {}", arg)),
        }
        i += 1;
    }

    Ok(Command::Roundtrip { bytes, seed })
}

fn parse_values<T: std::str::FromStr>(args: &[String], what: &str) -> Result<Vec<T>, String> {
    if args.is_empty() {
        return Err(format!("expected at least one {}", what));
    }
    args.iter()
        .map(|arg| {
            arg.parse()
                .map_err(|_| format!("Invalid {}: {}", what, arg))
        })
        .collect()
}

/// Entry point for CLI binary
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = parse_args(&args)?;
    let cli = Cli::new(config);
    let code = cli.run()?;
    std::process::exit(code);
}
