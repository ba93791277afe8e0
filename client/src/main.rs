//! `evlink-client` command-line entry point.
//!
//! Signs in with the configured account, then issues one authenticated
//! request (or CSV export) and prints the `{data, error}` envelope.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cap_std::{ambient_authority, fs::Dir};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use ortho_config::OrthoConfig;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use evlink_client::domain::{
    AuthenticatedFetch, DashboardApi, LinkCodeReconciler, Method, NormalizedResult,
    RequestDescriptor, SafeFetch, SessionStore,
};
use evlink_client::outbound::http::ReqwestTransport;
use evlink_client::outbound::identity::GoTrueIdentityProvider;
use evlink_client::outbound::link_code::FileLinkCodeStore;
use evlink_client::settings::{ClientConfig, ClientSettings};

const SIGN_IN_WAIT: Duration = Duration::from_secs(5);

/// `evlink-client` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "evlink-client",
    about = "Call the EVLink backend with automatic session recovery",
    version
)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Send one authenticated JSON request.
    Request {
        /// HTTP method (GET, POST, PUT, PATCH or DELETE).
        #[arg(value_parser = parse_method)]
        method: Method,
        /// Backend-relative path, for example `/api/user/subscription-status`.
        path: String,
        /// JSON request body.
        #[arg(long, value_name = "json", value_parser = parse_json_body)]
        body: Option<Value>,
    },
    /// Download charging sessions as CSV.
    ExportCsv {
        /// Restrict the export to one vehicle.
        #[arg(long = "vehicle-id", value_name = "id")]
        vehicle_id: Option<String>,
        /// Output file; defaults to the server-suggested filename.
        #[arg(long, value_name = "path")]
        output: Option<PathBuf>,
    },
    /// Validate and store a linking code for the next sign-in.
    CaptureCode {
        /// Linking code received with an invitation.
        code: String,
    },
}

#[derive(Debug, Serialize)]
struct ExportSummary {
    filename: String,
    path: PathBuf,
    bytes: usize,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .with_writer(std::io::stderr)
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let args = CliArgs::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: CliArgs) -> Result<()> {
    let settings = ClientSettings::load_from_iter([OsString::from("evlink-client")])
        .map_err(|error| eyre!("load settings: {error}"))?;
    let config = settings.validate().wrap_err("invalid settings")?;

    let transport = ReqwestTransport::new(config.base_url.clone(), config.request_timeout)
        .wrap_err("build backend transport")?;
    let safe_fetch = SafeFetch::new(Arc::new(transport));
    let link_codes = FileLinkCodeStore::open(&config.link_code_dir).wrap_err_with(|| {
        format!(
            "open link code directory '{}'",
            config.link_code_dir.display()
        )
    })?;
    let reconciler = LinkCodeReconciler::new(Arc::new(link_codes), safe_fetch.clone());

    if let Command::CaptureCode { code } = &args.command {
        let outcome = reconciler.capture(code).await;
        return print_envelope(&outcome);
    }

    let provider = Arc::new(connect_provider(&config)?);
    let store = SessionStore::builder(provider.clone())
        .with_link_code_reconciler(reconciler)
        .start()
        .await;
    let outcome = sign_in(&store, &provider, &settings).await;
    let outcome = match outcome {
        Ok(()) => {
            let api = DashboardApi::new(AuthenticatedFetch::new(safe_fetch, store.clone()));
            run_command(&api, args.command).await
        }
        Err(error) => Err(error),
    };

    if let Err(error) = store.sign_out().await {
        warn!(%error, "sign-out failed");
    }
    store.shutdown().await;
    outcome
}

fn connect_provider(config: &ClientConfig) -> Result<GoTrueIdentityProvider> {
    GoTrueIdentityProvider::new(
        config.identity_url.clone(),
        config.identity_anon_key.clone(),
        config.request_timeout,
    )
    .wrap_err("build identity provider client")
}

async fn sign_in(
    store: &SessionStore,
    provider: &GoTrueIdentityProvider,
    settings: &ClientSettings,
) -> Result<()> {
    let credentials = settings
        .sign_in_credentials()
        .wrap_err("sign-in credentials")?;
    let observed = Arc::new(Notify::new());
    let subscription = {
        let observed = Arc::clone(&observed);
        store.subscribe(move |transition| {
            if transition.session.is_authenticated() {
                observed.notify_one();
            }
        })
    };

    provider
        .sign_in_with_password(&credentials)
        .await
        .wrap_err("sign in")?;
    let waited = tokio::time::timeout(SIGN_IN_WAIT, observed.notified()).await;
    subscription.unsubscribe();
    waited.map_err(|_| eyre!("session store did not observe the sign-in"))?;
    info!("signed in");
    Ok(())
}

async fn run_command(api: &DashboardApi, command: Command) -> Result<()> {
    match command {
        Command::Request { method, path, body } => {
            let mut request = RequestDescriptor::new(method, path);
            if let Some(body) = body {
                request = request.with_body(body.to_string());
            }
            print_envelope(&api.request(&request).await)
        }
        Command::ExportCsv { vehicle_id, output } => {
            let outcome = api.export_charging_sessions(vehicle_id.as_deref()).await;
            let summary = match outcome.into_result() {
                Ok(Some(export)) => {
                    let path = output.unwrap_or_else(|| PathBuf::from(&export.filename));
                    write_output(&path, &export.bytes)?;
                    NormalizedResult::data_of(ExportSummary {
                        filename: export.filename,
                        path,
                        bytes: export.bytes.len(),
                    })
                }
                Ok(None) => NormalizedResult::empty(),
                Err(error) => NormalizedResult::failure(error),
            };
            print_envelope(&summary)
        }
        Command::CaptureCode { .. } => Ok(()),
    }
}

fn print_envelope<T: Serialize>(outcome: &NormalizedResult<T>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(outcome).wrap_err("render result")?;
    println!("{rendered}");
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("output path must name a file: {}", path.display()))?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority())
        .wrap_err_with(|| format!("open output directory '{}'", parent.display()))?;
    directory
        .write(Path::new(file_name), bytes)
        .wrap_err_with(|| format!("write '{}'", path.display()))
}

fn parse_method(raw: &str) -> Result<Method, String> {
    raw.parse::<Method>().map_err(|error| error.to_string())
}

fn parse_json_body(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|error| format!("body is not valid JSON: {error}"))
}
