//! Main CLI parser and top-level argument handling.

use clap::{Args, Parser, Subcommand};

use lmgate_core::config::{
    DEFAULT_HOST, DEFAULT_MAX_CONCURRENT, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_MS,
};

/// Command-line interface for the lmgate gateway.
#[derive(Parser)]
#[command(name = "lmgate")]
#[command(about = "Expose a chat-model provider as a local OpenAI-compatible gateway")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway until interrupted
    Serve(ServeArgs),
    /// Query the health endpoint of a running gateway
    Status(StatusArgs),
}

/// Arguments for `lmgate serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Host to bind the gateway to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind the gateway to (0 picks a free port)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of concurrently processed requests
    #[arg(long = "max-concurrent", default_value_t = DEFAULT_MAX_CONCURRENT)]
    pub max_concurrent: usize,

    /// Per-request deadline in milliseconds
    #[arg(long = "request-timeout-ms", default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    /// Base URL of the OpenAI-compatible upstream provider
    #[arg(
        long = "upstream-url",
        env = "LMGATE_UPSTREAM_URL",
        default_value = "http://127.0.0.1:8080/v1"
    )]
    pub upstream_url: String,

    /// Bearer token for the upstream provider
    #[arg(long = "api-key", env = "LMGATE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

/// Arguments for `lmgate status`.
#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// Host of the running gateway
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port of the running gateway
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults_match_the_core_config() {
        let cli = Cli::parse_from(["lmgate", "serve"]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.host, DEFAULT_HOST);
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.max_concurrent, DEFAULT_MAX_CONCURRENT);
    }

    #[test]
    fn serve_flags_override_defaults() {
        let cli = Cli::parse_from([
            "lmgate",
            "serve",
            "--port",
            "0",
            "--max-concurrent",
            "2",
            "--upstream-url",
            "http://10.0.0.5:4000/v1",
        ]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.port, 0);
        assert_eq!(args.max_concurrent, 2);
        assert_eq!(args.upstream_url, "http://10.0.0.5:4000/v1");
    }

    #[test]
    fn global_verbose_flag_parses_anywhere() {
        let cli = Cli::parse_from(["lmgate", "status", "--verbose"]);
        assert!(cli.verbose);
    }
}
