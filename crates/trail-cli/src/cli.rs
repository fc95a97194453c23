use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "trail", about = "Trail: a replicated append-only hash-chained log", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a node until Ctrl-C
    Serve(ServeArgs),
    /// Print the canonical genesis record
    Genesis,
    /// Check a saved chain (JSON array of records)
    Verify(VerifyArgs),
    /// Print the records of a saved chain
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// HTTP listen address
    #[arg(long)]
    pub http: Option<SocketAddr>,
    /// Peer listen address
    #[arg(long)]
    pub p2p: Option<SocketAddr>,
    /// Seed peer to dial at startup (host:port or tcp://host:port)
    #[arg(long)]
    pub peer: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct InspectArgs {
    pub file: PathBuf,
    /// Show at most this many records
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "trail", "serve", "--http", "127.0.0.1:3002", "--p2p", "0.0.0.0:6002", "--peer", "tcp://10.0.0.1:6001",
        ])
        .unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.http, Some("127.0.0.1:3002".parse().unwrap()));
            assert_eq!(args.p2p.map(|a| a.port()), Some(6002));
            assert_eq!(args.peer.as_deref(), Some("tcp://10.0.0.1:6001"));
            assert!(args.config.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_serve_rejects_bad_address() {
        assert!(Cli::try_parse_from(["trail", "serve", "--http", "localhost"]).is_err());
    }

    #[test]
    fn parse_genesis() {
        let cli = Cli::try_parse_from(["trail", "genesis"]).unwrap();
        assert!(matches!(cli.command, Command::Genesis));
    }

    #[test]
    fn parse_verify() {
        let cli = Cli::try_parse_from(["trail", "verify", "chain.json"]).unwrap();
        if let Command::Verify(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("chain.json"));
        } else {
            panic!("wrong command");
        }
        assert!(Cli::try_parse_from(["trail", "verify"]).is_err());
    }

    #[test]
    fn parse_inspect_limit() {
        let cli = Cli::try_parse_from(["trail", "inspect", "chain.json", "-n", "5"]).unwrap();
        if let Command::Inspect(args) = cli.command {
            assert_eq!(args.limit, Some(5));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["trail", "--verbose", "genesis"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["trail", "genesis", "--format", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
