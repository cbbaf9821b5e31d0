use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use taxon_gateway::app::App;
use taxon_gateway::config::ConfigLoader;
use taxon_gateway::entrez::EntrezHttpClient;
use taxon_gateway::error::ApiError;
use taxon_gateway::gbif::GbifHttpClient;
use taxon_gateway::server;
use taxon_gateway::wiki::WikiHttpClient;

#[derive(Parser)]
#[command(name = "taxon-gateway")]
#[command(about = "Species-identification aggregator over GBIF, Wikipedia and NCBI Entrez")]
#[command(version, author)]
struct Cli {
    /// Path to a JSON config file (default: ./taxon-gateway.json if present)
    #[arg(long)]
    config: Option<String>,

    /// Bind host, overriding the config file
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overriding the config file
    #[arg(long)]
    port: Option<u16>,

    /// Entrez contact email, overriding config and NCBI_CONTACT_EMAIL
    #[arg(long)]
    contact_email: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(api) = report.downcast_ref::<ApiError>() {
            return ExitCode::from(map_exit_code(api));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ApiError) -> u8 {
    match error {
        ApiError::ConfigRead(_) | ApiError::ConfigParse(_) | ApiError::ConfigValue(_) => 2,
        ApiError::Server(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(email) = cli.contact_email {
        config.contact_email = email;
    }

    let entrez = EntrezHttpClient::new(&config).into_diagnostic()?;
    let wiki = WikiHttpClient::new(&config).into_diagnostic()?;
    let gbif = GbifHttpClient::new(&config).into_diagnostic()?;
    let app = Arc::new(App::new(entrez, wiki, gbif));

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| ApiError::ConfigValue(format!("invalid bind host {:?}", config.host)))
        .into_diagnostic()?;
    let addr = SocketAddr::new(host, config.port);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|err| ApiError::Server(err.to_string()))
        .into_diagnostic()?;
    runtime
        .block_on(server::serve(app, addr))
        .into_diagnostic()?;
    Ok(())
}
